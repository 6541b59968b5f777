// =============================================================================
// extractor.rs - THE FIELD SURGEON
// =============================================================================
//
// The page data is not JSON. It is JavaScript that looks like JSON from a
// distance: unquoted keys, single-quoted values, `parseInt("3")` sprinkled in
// for flavour, and `|| []` fallbacks on arrays. No parser we could pull off
// the shelf would accept it, so we do not parse it. We cut fields out of it,
// one pattern per field.
//
// Every field is extracted on its own. A field that does not match resolves
// to its default and the rest of the record carries on without it. A record
// with every field missing is still a record: it gets counted, it gets
// dispatched, and it just never makes it into the dedup store (no id, no
// memory).
//
// Two policies live here:
// - listing pages: many records, one per `data.push({...});` call
// - detail pages: at most one record with the long-form fields
// =============================================================================

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{DetailRecord, ListingRecord};

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> =
            Lazy::new(|| Regex::new($re).expect(concat!("invalid pattern ", stringify!($name))));
    };
}

pattern!(PUSH_RE, r#"(?s)window\.PAGE_DATA\["index"\]\.data\.push\((\{.*?\})\);"#);
pattern!(ID_RE, r#"\bid:\s*"([^"]+)""#);
pattern!(URL_RE, r#"\burl:\s*"([^"]+)""#);
pattern!(TAGS_RE, r#"(?s)\btags:\s*(\[.*?\])\s*\|\|"#);
pattern!(LEVEL_TAG_RE, r#"\{"tagName":"([^"]+)","type":"rfq_level""#);
pattern!(STAR_LEVEL_RE, r#"\brfqStarLevel:\s*parseInt\("(\d+)""#);
pattern!(OPEN_TIME_RE, r#"\bopenTimeStr:\s*"([^"]+)""#);
pattern!(COUNTRY_RE, r#"\bcountry:\s*"([^"]*)""#);
pattern!(LISTING_QUANTITY_RE, r#"\bquantity:\s*'([^']*)'"#);
pattern!(DESCRIPTION_RE, r#"\bdescription:\s*"([^"]*)""#);
pattern!(SUBJECT_RE, r#"\bsubject:\s*"([^"]*)""#);

pattern!(DETAIL_QUANTITY_RE, r#"\bquantity:\s*"?(\d+)"?"#);
pattern!(DETAIL_SUBJECT_RE, r#"\bsubject:\s*"([^"]+)""#);
pattern!(DETAIL_DESCRIPTION_RE, r#"(?s)\benDescription:\s*"((?:[^"\\]|\\.)*)""#);
pattern!(WHITESPACE_RE, r"\s+");

/// Tag name to star level. Gold is 1, silver 2, bronze 3. Yes, lower is
/// better. No, we did not design it.
const LEVEL_TAGS: &[(&str, u8)] = &[
    ("RFQ_MKT_ST_39408", 1),
    ("RFQ_MKT_ST_28102", 2),
    ("RFQ_MKT_ST_28101", 3),
];

/// Where a record's ranking comes from. Older page builds shipped a direct
/// `rfqStarLevel: parseInt("N")`; current ones only carry level tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankingSource {
    #[default]
    TagLookup,
    NumericField,
}

/// Which optional fields are read off the listing page itself. Anything
/// switched off stays empty unless a detail page fills it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingFields {
    pub origin: bool,
    pub quantity: bool,
    pub description: bool,
    pub subject: bool,
}

impl Default for ListingFields {
    fn default() -> Self {
        Self {
            origin: true,
            quantity: true,
            description: true,
            subject: true,
        }
    }
}

impl ListingFields {
    pub fn none() -> Self {
        Self {
            origin: false,
            quantity: false,
            description: false,
            subject: false,
        }
    }
}

/// How much we pull out of a listing, and whether we go knocking on each
/// record's detail page for the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractionPolicy {
    pub ranking: RankingSource,
    pub listing_fields: ListingFields,
    pub enrich_from_detail: bool,
}

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn capture_owned(re: &Regex, text: &str) -> String {
    capture(re, text).unwrap_or_default().to_string()
}

fn optional_field(enabled: bool, re: &Regex, block: &str) -> String {
    if enabled {
        capture_owned(re, block)
    } else {
        String::new()
    }
}

/// `//host/x` gets `https:`, a bare `host/x` gets `https://`, anything
/// already starting with `http` is left alone.
pub fn normalize_url(raw: &str) -> String {
    if raw.starts_with("//") {
        format!("https:{raw}")
    } else if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

/// Ranking from the first `rfq_level` tag inside the `tags: [...] ||` array.
/// No array, no tag, or a tag we have never heard of: 0.
pub fn ranking_from_tags(block: &str) -> u8 {
    capture(&TAGS_RE, block)
        .and_then(|tags| capture(&LEVEL_TAG_RE, tags))
        .and_then(|name| {
            LEVEL_TAGS
                .iter()
                .find(|(tag, _)| *tag == name)
                .map(|(_, level)| *level)
        })
        .unwrap_or(0)
}

fn ranking_from_number(block: &str) -> u8 {
    capture(&STAR_LEVEL_RE, block)
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn extract_listing_record(block: &str, policy: &ExtractionPolicy) -> ListingRecord {
    let fields = policy.listing_fields;
    let ranking = match policy.ranking {
        RankingSource::TagLookup => ranking_from_tags(block),
        RankingSource::NumericField => ranking_from_number(block),
    };
    ListingRecord {
        id: capture_owned(&ID_RE, block),
        url: capture(&URL_RE, block).map(normalize_url),
        ranking,
        posted_at: capture_owned(&OPEN_TIME_RE, block),
        origin: optional_field(fields.origin, &COUNTRY_RE, block),
        quantity: optional_field(fields.quantity, &LISTING_QUANTITY_RE, block),
        description: optional_field(fields.description, &DESCRIPTION_RE, block),
        subject: optional_field(fields.subject, &SUBJECT_RE, block),
    }
}

/// Pull every pushed record out of a decoded listing script, in page order.
pub fn extract_listing(script: &str, policy: &ExtractionPolicy) -> Vec<ListingRecord> {
    PUSH_RE
        .captures_iter(script)
        .filter_map(|caps| caps.get(1))
        .map(|block| extract_listing_record(block.as_str(), policy))
        .collect()
}

/// Squash the JS string escapes in a long description into plain prose.
pub fn normalize_description(raw: &str) -> String {
    let flattened = raw
        .replace(r"\r\n", " ")
        .replace(r"\n", " ")
        .replace(r"\r", " ")
        .replace(r"\t", " ")
        .replace(r#"\""#, "\"")
        .replace(r"\'", "'")
        .replace(r"\\", "\\");
    WHITESPACE_RE.replace_all(&flattened, " ").trim().to_string()
}

/// The detail page policy. Missing fields are `None`, never an error.
pub fn extract_detail(script: &str) -> DetailRecord {
    DetailRecord {
        quantity: capture(&DETAIL_QUANTITY_RE, script).and_then(|q| q.parse().ok()),
        subject: capture(&DETAIL_SUBJECT_RE, script).map(str::to_string),
        description: capture(&DETAIL_DESCRIPTION_RE, script).map(normalize_description),
    }
}
