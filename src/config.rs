// =============================================================================
// config.rs - THE (SMALLER) CONFIGURATION CATHEDRAL
// =============================================================================
//
// Every knob the engine has, in one struct, loaded once at startup and then
// frozen. Values come from RFQ_SENTINEL_* environment variables (a .env file
// is honoured if there is one), with defaults that work out of the box.
//
// The list of sources lives in its own JSON file, webhook keys and all:
//
//   [
//     { "name": "paper-bags",
//       "listing_url": "https://sourcing.example.com/rfq/rfq_search_list.htm?categoryIds=1",
//       "notify_target": "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=..." }
//   ]
//
// Numbers that fail to parse fall back to their defaults. A missing or
// broken sources file is fatal: there is nothing to poll without it.
// =============================================================================

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::extractor::{ExtractionPolicy, ListingFields, RankingSource};
use crate::models::SourceConfig;
use crate::scheduler::SchedulerSettings;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read sources file {path}: {source}")]
    SourcesUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sources file {path} is not a valid source list: {source}")]
    SourcesMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no sources configured")]
    NoSources,

    #[error("source #{index} has an empty name")]
    UnnamedSource { index: usize },

    #[error("source {name:?} has an invalid listing url {url:?}: {source}")]
    BadListingUrl {
        name: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unknown ranking source {0:?} (expected \"tags\" or \"numeric\")")]
    UnknownRanking(String),

    #[error("unknown listing field {0:?} (expected origin, quantity, description or subject)")]
    UnknownListingField(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Polled in this order, every cycle.
    pub sources: Vec<SourceConfig>,

    /// Where the seen-id list is persisted. Default: processed_ids.json
    pub dedup_store_path: PathBuf,

    /// How many ids we remember. Default: 90
    pub dedup_capacity: usize,

    /// Sleep between cycles. Default: 30 seconds
    pub poll_interval: Duration,

    /// Pause between sources within a cycle. Default: 2 seconds
    pub source_pause: Duration,

    /// Per-request timeout for fetches and webhooks. Default: 10 seconds
    pub request_timeout: Duration,

    pub user_agent: String,

    /// Stop after this many cycles. Unset means never.
    pub max_cycles: Option<u64>,

    pub extraction: ExtractionPolicy,
}

impl Config {
    /// Load from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using `lookup` in place of the environment.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let sources_path = PathBuf::from(var("RFQ_SENTINEL_SOURCES_FILE", "sources.json"));
        let sources = load_sources(&sources_path)?;

        let extraction = ExtractionPolicy {
            ranking: parse_ranking(&var("RFQ_SENTINEL_RANKING", "tags"))?,
            listing_fields: parse_listing_fields(&var(
                "RFQ_SENTINEL_LISTING_FIELDS",
                "origin,quantity,description,subject",
            ))?,
            enrich_from_detail: parse_flag(&var("RFQ_SENTINEL_DETAIL_ENRICHMENT", "false")),
        };

        Ok(Config {
            sources,
            dedup_store_path: PathBuf::from(var("RFQ_SENTINEL_DEDUP_STORE", "processed_ids.json")),
            dedup_capacity: var("RFQ_SENTINEL_DEDUP_CAPACITY", "90")
                .parse()
                .ok()
                .filter(|&n: &usize| n > 0)
                .unwrap_or(90),
            poll_interval: Duration::from_secs(
                var("RFQ_SENTINEL_POLL_SECS", "30").parse().unwrap_or(30),
            ),
            source_pause: Duration::from_secs(
                var("RFQ_SENTINEL_SOURCE_PAUSE_SECS", "2").parse().unwrap_or(2),
            ),
            request_timeout: Duration::from_secs(
                var("RFQ_SENTINEL_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            ),
            user_agent: var("RFQ_SENTINEL_USER_AGENT", DEFAULT_USER_AGENT),
            max_cycles: lookup("RFQ_SENTINEL_MAX_CYCLES").and_then(|v| v.parse().ok()),
            extraction,
        })
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: self.poll_interval,
            source_pause: self.source_pause,
            max_cycles: self.max_cycles,
        }
    }
}

fn load_sources(path: &Path) -> Result<Vec<SourceConfig>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::SourcesUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let sources: Vec<SourceConfig> =
        serde_json::from_str(&raw).map_err(|source| ConfigError::SourcesMalformed {
            path: path.to_path_buf(),
            source,
        })?;
    validate_sources(&sources)?;
    Ok(sources)
}

fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::NoSources);
    }
    for (index, source) in sources.iter().enumerate() {
        if source.name.trim().is_empty() {
            return Err(ConfigError::UnnamedSource { index });
        }
        url::Url::parse(&source.listing_url).map_err(|e| ConfigError::BadListingUrl {
            name: source.name.clone(),
            url: source.listing_url.clone(),
            source: e,
        })?;
    }
    Ok(())
}

fn parse_ranking(value: &str) -> Result<RankingSource, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "tags" | "tag" => Ok(RankingSource::TagLookup),
        "numeric" | "number" => Ok(RankingSource::NumericField),
        other => Err(ConfigError::UnknownRanking(other.to_string())),
    }
}

fn parse_listing_fields(value: &str) -> Result<ListingFields, ConfigError> {
    let mut fields = ListingFields::none();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match name.to_ascii_lowercase().as_str() {
            "origin" | "country" => fields.origin = true,
            "quantity" => fields.quantity = true,
            "description" => fields.description = true,
            "subject" => fields.subject = true,
            other => return Err(ConfigError::UnknownListingField(other.to_string())),
        }
    }
    Ok(fields)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
