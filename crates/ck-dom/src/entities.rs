//! HTML entity decoding.
//!
//! Rendered markdown escapes `&`, `<` and `>`, and authors occasionally
//! write named entities directly. Equation sources and YAML metadata need
//! the decoded text, so this module maps the entities the content dialect
//! actually uses back to Unicode.

use std::sync::LazyLock;

use regex::Regex;

static ENTITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#x?[0-9a-fA-F]+|[a-zA-Z]+);").expect("invalid entity regex"));

/// Decode HTML entities (named and numeric) to Unicode characters.
///
/// Unknown entities are left verbatim.
pub fn decode(text: &str) -> String {
    if !text.contains('&') {
        return text.to_owned();
    }
    ENTITY_PATTERN
        .replace_all(text, |caps: &regex::Captures| {
            decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}

/// Decode a single entity body (the part between `&` and `;`).
///
/// Returns `None` for unrecognized names.
pub(crate) fn decode_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            num.parse().ok()?
        };
        return char::from_u32(code).map(String::from);
    }

    let ch = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{00a0}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "hellip" => "\u{2026}",
        "le" => "\u{2264}",
        "ge" => "\u{2265}",
        "ne" => "\u{2260}",
        "plusmn" => "\u{00b1}",
        "times" => "\u{00d7}",
        "divide" => "\u{00f7}",
        "middot" => "\u{00b7}",
        "deg" => "\u{00b0}",
        "pi" => "\u{03c0}",
        "copy" => "\u{00a9}",
        "laquo" => "\u{00ab}",
        "raquo" => "\u{00bb}",
        _ => return None,
    };
    Some(ch.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_standard_entities() {
        assert_eq!(decode("a &amp; b"), "a & b");
        assert_eq!(decode("&lt;tag&gt;"), "<tag>");
        assert_eq!(decode("&quot;hi&quot;"), "\"hi\"");
    }

    #[test]
    fn test_decode_numeric() {
        assert_eq!(decode("&#65;"), "A");
        assert_eq!(decode("&#x41;"), "A");
        assert_eq!(decode("&#x2264;"), "\u{2264}");
    }

    #[test]
    fn test_unknown_entity_kept() {
        assert_eq!(decode("&bogus;"), "&bogus;");
    }

    #[test]
    fn test_no_entities_passthrough() {
        assert_eq!(decode("plain text"), "plain text");
    }
}
