// =============================================================================
// models.rs - THE SACRED DATA STRUCTURES OF PROCUREMENT
// =============================================================================
//
// Everything the engine passes around lives here. A listing page gives us a
// ListingRecord, a detail page (if we bother asking) gives us a DetailRecord,
// and the two get folded into an EnrichedRecord right before we shout about
// it. Nothing in here is mutated after it is built. Records are facts, and
// facts do not change just because a webhook was rude to us.
// =============================================================================

use serde::Deserialize;
use std::fmt;
use std::ops::AddAssign;

/// One item scraped off a listing page.
///
/// Every field except `ranking` is free text lifted straight out of the page
/// script. We do not parse `posted_at` into a calendar type because the site
/// writes things like "2 hours ago" and we are not in the business of
/// arguing with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingRecord {
    /// Source-assigned identifier. Doubles as the dedup key.
    /// Empty when the page forgot to give us one.
    pub id: String,

    /// Absolute URL of the detail page, `None` when the record carried no url.
    pub url: Option<String>,

    /// Quality tier. 0 means "unranked", which is a perfectly valid tier.
    pub ranking: u8,

    pub posted_at: String,
    pub origin: String,
    pub quantity: String,
    pub description: String,
    pub subject: String,
}

/// Optional enrichment pulled from a record's own detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailRecord {
    pub quantity: Option<u64>,
    pub subject: Option<String>,
    /// Whitespace-normalized with escape sequences resolved.
    pub description: Option<String>,
}

/// The value handed to the dispatcher: a listing record with whatever the
/// detail page managed to add on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRecord {
    pub id: String,
    pub url: Option<String>,
    pub ranking: u8,
    pub posted_at: String,
    pub origin: String,
    pub quantity: String,
    pub description: String,
    pub subject: String,
}

impl EnrichedRecord {
    /// Fold a detail record over a listing record. Detail fields win only
    /// when they are present; a detail page that came back empty-handed
    /// changes nothing.
    pub fn merge(listing: &ListingRecord, detail: Option<&DetailRecord>) -> Self {
        let quantity = detail
            .and_then(|d| d.quantity)
            .map(|q| q.to_string())
            .unwrap_or_else(|| listing.quantity.clone());
        let subject = detail
            .and_then(|d| d.subject.clone())
            .unwrap_or_else(|| listing.subject.clone());
        let description = detail
            .and_then(|d| d.description.clone())
            .unwrap_or_else(|| listing.description.clone());

        Self {
            id: listing.id.clone(),
            url: listing.url.clone(),
            ranking: listing.ranking,
            posted_at: listing.posted_at.clone(),
            origin: listing.origin.clone(),
            quantity,
            description,
            subject,
        }
    }
}

impl fmt::Display for EnrichedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (level {}, qty {}, from {})",
            self.id,
            self.subject,
            self.ranking,
            if self.quantity.is_empty() { "?" } else { self.quantity.as_str() },
            if self.origin.is_empty() { "?" } else { self.origin.as_str() },
        )
    }
}

/// A listing page we poll and the webhook its finds go to.
/// Loaded once at startup and never touched again.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub listing_url: String,
    /// Opaque to the core. The dispatcher knows what to do with it.
    pub notify_target: String,
}

/// Per-source, per-cycle counters. Purely diagnostic, never persisted.
///
/// `total == duplicate + new` and `new == sent + failed` hold for every
/// value the poller produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub total: u64,
    pub duplicate: u64,
    pub new: u64,
    pub sent: u64,
    pub failed: u64,
}

impl CycleStats {
    pub fn is_balanced(&self) -> bool {
        self.total == self.duplicate + self.new && self.new == self.sent + self.failed
    }
}

impl AddAssign for CycleStats {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.duplicate += rhs.duplicate;
        self.new += rhs.new;
        self.sent += rhs.sent;
        self.failed += rhs.failed;
    }
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} duplicate={} new={} sent={} failed={}",
            self.total, self.duplicate, self.new, self.sent, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> ListingRecord {
        ListingRecord {
            id: "42".into(),
            url: Some("https://example.com/rfq/42".into()),
            ranking: 2,
            posted_at: "2 hours ago".into(),
            origin: "Germany".into(),
            quantity: "500 Pieces".into(),
            description: "short blurb".into(),
            subject: "Kraft paper bags".into(),
        }
    }

    #[test]
    fn test_merge_without_detail_keeps_listing_fields() {
        let base = listing();
        let merged = EnrichedRecord::merge(&base, None);
        assert_eq!(merged.quantity, "500 Pieces");
        assert_eq!(merged.subject, "Kraft paper bags");
        assert_eq!(merged.description, "short blurb");
        assert_eq!(merged.ranking, 2);
    }

    #[test]
    fn test_merge_detail_overrides_only_present_fields() {
        let base = listing();
        let detail = DetailRecord {
            quantity: Some(10_000),
            subject: None,
            description: Some("the long version".into()),
        };
        let merged = EnrichedRecord::merge(&base, Some(&detail));
        assert_eq!(merged.quantity, "10000");
        assert_eq!(merged.subject, "Kraft paper bags");
        assert_eq!(merged.description, "the long version");
        assert_eq!(merged.id, base.id);
        assert_eq!(merged.url, base.url);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut total = CycleStats::default();
        total += CycleStats { total: 3, duplicate: 1, new: 2, sent: 2, failed: 0 };
        total += CycleStats { total: 2, duplicate: 0, new: 2, sent: 1, failed: 1 };
        assert_eq!(total, CycleStats { total: 5, duplicate: 1, new: 4, sent: 3, failed: 1 });
        assert!(total.is_balanced());
    }
}
