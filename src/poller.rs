// =============================================================================
// poller.rs - ONE SOURCE, ONE PASS
// =============================================================================
//
// A single poll of a single listing source walks the same path every time:
//
//   FETCH_LISTING -> LOCATE_SCRIPT -> DECODE -> EXTRACT_ALL
//     -> for each record: DEDUP_CHECK -> DISPATCH -> RECORD_SEEN
//
// What can go wrong and what we do about it:
// - the listing fetch fails: log it, return all-zero stats. The scheduler
//   will be back in thirty seconds anyway.
// - the page has no data script: return all-zero stats. Not an error.
// - a record is already known: count it as a duplicate and move on.
// - dispatch fails: count it as failed and do NOT remember it, so it gets
//   another shot on the next poll while it is still on the listing page.
// - dispatch works: count it as sent, then remember it.
//
// Detail enrichment, when switched on, is strictly best effort. A detail
// page that will not load or will not parse just means a thinner message.
//
// Records are handled one at a time, in page order. No fan-out.
// =============================================================================

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::decoder::decode_escapes;
use crate::dedup::DedupStore;
use crate::extractor::{extract_detail, extract_listing, ExtractionPolicy};
use crate::fetcher::{FetchError, PageFetcher};
use crate::locator::{locate_script, ScriptSignature};
use crate::models::{CycleStats, DetailRecord, EnrichedRecord, ListingRecord, SourceConfig};
use crate::publisher::Dispatcher;

#[derive(Debug, Error)]
pub enum DetailError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no detail script found at {url}")]
    ScriptNotFound { url: String },
}

/// Drives one source through fetch, extract, dedup and dispatch.
pub struct SourcePoller<F, D> {
    fetcher: F,
    dispatcher: D,
    policy: ExtractionPolicy,
}

impl<F, D> SourcePoller<F, D>
where
    F: PageFetcher,
    D: Dispatcher,
{
    pub fn new(fetcher: F, dispatcher: D, policy: ExtractionPolicy) -> Self {
        Self {
            fetcher,
            dispatcher,
            policy,
        }
    }

    /// Poll `source` once. Never fails; whatever went wrong is in the logs
    /// and in the returned counters.
    pub async fn poll(&self, source: &SourceConfig, store: &mut DedupStore) -> CycleStats {
        let mut stats = CycleStats::default();

        let records = match self.fetch_records(source).await {
            Some(records) => records,
            None => return stats,
        };
        stats.total = records.len() as u64;

        for record in &records {
            if store.exists(&record.id) {
                stats.duplicate += 1;
                debug!(source = %source.name, id = %record.id, "Already dispatched, skipping");
                continue;
            }
            stats.new += 1;

            let detail = self.enrichment_for(record).await;
            let enriched = EnrichedRecord::merge(record, detail.as_ref());

            match self.dispatcher.dispatch(&enriched, &source.notify_target).await {
                Ok(()) => {
                    stats.sent += 1;
                    store.add(&record.id);
                    info!(source = %source.name, record = %enriched, "New record dispatched");
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        source = %source.name,
                        id = %record.id,
                        error = %e,
                        "Dispatch failed, record stays eligible for the next poll"
                    );
                }
            }
        }

        debug_assert!(stats.is_balanced(), "unbalanced stats: {stats}");
        stats
    }

    /// FETCH_LISTING through EXTRACT_ALL. `None` means "abort this source for
    /// this cycle"; the reason has already been logged.
    async fn fetch_records(&self, source: &SourceConfig) -> Option<Vec<ListingRecord>> {
        let html = match self.fetcher.fetch(&source.listing_url).await {
            Ok(html) => html,
            Err(e) => {
                error!(source = %source.name, error = %e, "Listing fetch failed");
                return None;
            }
        };

        let Some(script) = locate_script(&html, ScriptSignature::LISTING) else {
            info!(source = %source.name, "No listing data script on the page");
            return None;
        };

        let decoded = decode_escapes(&script);
        let records = extract_listing(&decoded, &self.policy);
        debug!(source = %source.name, count = records.len(), "Listing records extracted");
        Some(records)
    }

    async fn enrichment_for(&self, record: &ListingRecord) -> Option<DetailRecord> {
        if !self.policy.enrich_from_detail {
            return None;
        }
        let url = record.url.as_deref()?;

        match self.fetch_detail(url).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!(id = %record.id, error = %e, "Detail enrichment failed, dispatching listing fields only");
                None
            }
        }
    }

    /// Fetch and extract one detail page.
    pub async fn fetch_detail(&self, url: &str) -> Result<DetailRecord, DetailError> {
        let html = self.fetcher.fetch(url).await?;
        let script = locate_script(&html, ScriptSignature::DETAIL).ok_or_else(|| {
            DetailError::ScriptNotFound {
                url: url.to_string(),
            }
        })?;
        Ok(extract_detail(&decode_escapes(&script)))
    }
}
