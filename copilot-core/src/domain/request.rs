//! Request text identity
//!
//! Two natural-language requests describe the same pipeline when their
//! identity text is equal. The identity text is the request with invisible
//! characters removed, whitespace collapsed and case folded.

use sha2::{Digest, Sha256};

/// Bidirectional control characters (LRE, RLE, LRO, RLO, LRI, RLI, FSI, PDI)
const BIDI_CHARS: [char; 8] = [
    '\u{202A}', '\u{202B}', '\u{202D}', '\u{202E}', '\u{2066}', '\u{2067}', '\u{2068}', '\u{2069}',
];

/// Zero-width characters (ZWSP, ZWNJ, ZWJ, WJ, BOM)
const ZERO_WIDTH: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// Strip bidi controls, zero-width characters and other control characters.
///
/// Newlines and tabs survive so the cleaned text stays readable.
pub fn clean(raw: &str) -> String {
    raw.chars()
        .filter(|c| !BIDI_CHARS.contains(c) && !ZERO_WIDTH.contains(c))
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Normalize request text into its identity form.
pub fn normalize(raw: &str) -> String {
    clean(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lowercase hex SHA-256 digest of already-normalized text
pub fn identity_hash(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace_and_case() {
        assert_eq!(
            normalize("  Load   data/sales.csv\n\tINTO a Sales table "),
            "load data/sales.csv into a sales table"
        );
    }

    #[test]
    fn test_normalize_drops_invisible_characters() {
        let sneaky = "load\u{200B} data\u{202E}/sales.csv\u{0007}";
        assert_eq!(normalize(sneaky), "load data/sales.csv");
    }

    #[test]
    fn test_identity_hash_is_stable() {
        let a = identity_hash(&normalize("Load data/sales.csv into a sales table"));
        let b = identity_hash(&normalize("load   DATA/sales.csv into a sales table"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, identity_hash(&normalize("load data/orders.csv")));
    }

    #[test]
    fn test_clean_keeps_newlines() {
        assert_eq!(clean("a\nb\tc\u{0000}"), "a\nb\tc");
    }
}
