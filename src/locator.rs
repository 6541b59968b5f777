// =============================================================================
// locator.rs - THE SCRIPT HOUND
// =============================================================================
//
// A listing page carries a few dozen <script> blocks: analytics, A/B test
// flags, a tracking pixel that loads another tracking pixel. Exactly one of
// them holds the data we want, and we recognise it by two marker substrings
// that both have to be present.
//
// Not finding it is NOT an error. Pages get redesigned, CDNs serve
// maintenance pages, and the right response to all of that is "nothing new
// this cycle", not a stack trace.
// =============================================================================

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("`script` is a valid selector"));

/// The pair of markers that identifies the script block we are after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSignature {
    pub primary: &'static str,
    pub secondary: &'static str,
}

impl ScriptSignature {
    /// Listing pages: the page data blob that carries the `uuid` bootstrap.
    pub const LISTING: ScriptSignature = ScriptSignature {
        primary: "PAGE_DATA",
        secondary: "uuid",
    };

    /// Detail pages: same blob, keyed by the viewer's `userType`.
    pub const DETAIL: ScriptSignature = ScriptSignature {
        primary: "PAGE_DATA",
        secondary: "userType",
    };

    /// Both markers present? memchr does the looking, because it is there.
    pub fn matches(&self, content: &str) -> bool {
        let bytes = content.as_bytes();
        memchr::memmem::find(bytes, self.primary.as_bytes()).is_some()
            && memchr::memmem::find(bytes, self.secondary.as_bytes()).is_some()
    }
}

/// Return the text of the first `<script>` in document order whose content
/// matches `signature`. Stops at the first hit.
///
/// `None` is the normal "this page has nothing for us" outcome.
pub fn locate_script(html: &str, signature: ScriptSignature) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&SCRIPT_SELECTOR)
        .map(|element| element.text().collect::<String>())
        .find(|content| signature.matches(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <script>window.analytics = { uuid: "nope" };</script>
        <script src="/bundle.js"></script>
        <script>window.PAGE_DATA = {}; window.PAGE_DATA.uuid = "first";</script>
        <script>window.PAGE_DATA = {}; window.PAGE_DATA.uuid = "second";</script>
        <script>window.PAGE_DATA = { userType: "buyer" };</script>
    </head><body></body></html>"#;

    #[test]
    fn test_first_matching_script_wins() {
        let found = locate_script(PAGE, ScriptSignature::LISTING).unwrap();
        assert!(found.contains("\"first\""));
        assert!(!found.contains("\"second\""));
    }

    #[test]
    fn test_both_markers_are_required() {
        // the analytics block has `uuid` but no PAGE_DATA
        let found = locate_script(PAGE, ScriptSignature::LISTING).unwrap();
        assert!(!found.contains("analytics"));
    }

    #[test]
    fn test_detail_signature_picks_its_own_block() {
        let found = locate_script(PAGE, ScriptSignature::DETAIL).unwrap();
        assert!(found.contains("userType"));
    }

    #[test]
    fn test_missing_script_is_none() {
        let html = "<html><body><script>var x = 1;</script></body></html>";
        assert!(locate_script(html, ScriptSignature::LISTING).is_none());
        assert!(locate_script("", ScriptSignature::LISTING).is_none());
    }
}
