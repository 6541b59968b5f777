// =============================================================================
// decoder.rs - THE ESCAPE ARTIST
// =============================================================================
//
// The listing pages ship their data as JavaScript string literals, and the
// site's template engine escapes anything it finds remotely suspicious:
// `\x3C`, `\u4E2D`, `\x22`. Our field patterns want to match `subject:"..."`
// and not `subject:\x22...\x22`, so before anyone runs a regex over a script
// body it comes through here first.
//
// Rules of the house:
// - `\xHH` and `\uHHHH` are both decoded. At any position `\x` is tried
//   first.
// - One pass, left to right. Whatever we produce is never looked at again,
//   so `\x5cu0041` becomes the six characters `\u0041`, not `A`.
// - A UTF-16 surrogate pair written as two `\u` escapes becomes one char.
//   A lone surrogate is not a char in Rust, so it stays as written.
// - Wrong digit counts simply do not match and pass through untouched.
// =============================================================================

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static ESCAPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\\x([0-9A-Fa-f]{2})|\\u([Dd][89ABab][0-9A-Fa-f]{2})\\u([Dd][C-Fc-f][0-9A-Fa-f]{2})|\\u([0-9A-Fa-f]{4})",
    )
    .expect("escape pattern is valid")
});

/// Replace every `\xHH` and `\uHHHH` sequence with the character it names.
///
/// Pure and total: text without escapes comes back unchanged (and without
/// an allocation).
pub fn decode_escapes(raw: &str) -> Cow<'_, str> {
    ESCAPE_RE.replace_all(raw, |caps: &Captures<'_>| decode_one(caps))
}

fn decode_one(caps: &Captures<'_>) -> String {
    let whole = &caps[0];

    if let Some(hex) = caps.get(1) {
        return hex_char(hex.as_str()).map(String::from).unwrap_or_else(|| whole.to_string());
    }

    if let (Some(high), Some(low)) = (caps.get(2), caps.get(3)) {
        let high = u16::from_str_radix(high.as_str(), 16).ok();
        let low = u16::from_str_radix(low.as_str(), 16).ok();
        if let (Some(high), Some(low)) = (high, low) {
            if let Some(Ok(c)) = char::decode_utf16([high, low]).next() {
                return c.to_string();
            }
        }
        return whole.to_string();
    }

    caps.get(4)
        .and_then(|hex| hex_char(hex.as_str()))
        .map(String::from)
        .unwrap_or_else(|| whole.to_string())
}

fn hex_char(hex: &str) -> Option<char> {
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_and_unicode_escapes_decode() {
        assert_eq!(decode_escapes(r"\x41\u0042"), "AB");
    }

    #[test]
    fn test_plain_text_is_identity() {
        let text = r#"window.PAGE_DATA["index"].data.push({id:"1"});"#;
        assert!(matches!(decode_escapes(text), Cow::Borrowed(_)));
        assert_eq!(decode_escapes(text), text);
    }

    #[test]
    fn test_quotes_and_cjk_come_through() {
        assert_eq!(decode_escapes(r"subject:\x22\u7EB8\u888B\x22"), "subject:\"纸袋\"");
    }

    #[test]
    fn test_decoded_backslash_is_not_decoded_again() {
        assert_eq!(decode_escapes(r"\x5cu0041"), r"\u0041");
        assert_eq!(decode_escapes(r"\x5cx41"), r"\x41");
    }

    #[test]
    fn test_malformed_sequences_pass_through() {
        assert_eq!(decode_escapes(r"\x4"), r"\x4");
        assert_eq!(decode_escapes(r"\u12G4 \xZZ"), r"\u12G4 \xZZ");
    }

    #[test]
    fn test_surrogate_pairs_combine() {
        assert_eq!(decode_escapes(r"\uD83D\uDE9A"), "🚚");
    }

    #[test]
    fn test_lone_surrogate_left_alone() {
        assert_eq!(decode_escapes(r"a\uD83Db"), r"a\uD83Db");
    }
}
