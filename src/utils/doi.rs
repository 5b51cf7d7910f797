//! DOI extraction, cleaning and validation.
//!
//! Identifiers scraped from search result pages arrive in many shapes:
//! wrapped in resolver URLs, followed by query strings, HTML-escaped, or with
//! a stray numeric path fragment glued onto the end. Everything here is pure
//! string work; nothing touches the network.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Canonical DOI shape, anchored: `10.` + 4-9 digit registrant + `/` + non-whitespace suffix.
static DOI_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)^10\.\d{4,9}/\S+$").expect("valid DOI regex"));

/// Same shape, unanchored, for locating a DOI inside arbitrary text.
static DOI_SEARCH_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)10\.\d{4,9}/\S+").expect("valid DOI regex"));

/// Resolver prefixes, checked in this order. Only the first match is stripped.
const RESOLVER_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
    "DOI:",
];

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', ')'];

/// A validated, cleaned DOI.
///
/// Only constructed through [`Doi::parse`], so holding one means the value
/// passed [`is_valid_doi`] after cleaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Doi(String);

impl Doi {
    /// Normalize arbitrary input into a DOI, if one can be found.
    pub fn parse(raw: &str) -> Option<Self> {
        normalize_doi(raw).map(Doi)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The DOI with every path segment percent-encoded and slashes kept,
    /// suitable for appending to a resolver or mirror base URL.
    pub fn url_path(&self) -> String {
        self.0
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Doi {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Find the first DOI-shaped substring in `text` and return it cleaned.
pub fn extract_doi(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }

    let found = DOI_SEARCH_PATTERN.find(text)?;
    clean_doi(found.as_str())
}

/// Strip resolver prefixes, query strings, entities, trailing punctuation and
/// short numeric path fragments from a DOI candidate.
///
/// The numeric-fragment rule only fires for a secondary path segment of 6 to
/// 8 digits (`10.1108/REPS-12-2024-0104/1307371`). Longer all-digit suffixes
/// such as `10.1177/2041905820911746`, and a suffix directly after the
/// registrant, are real DOI content and are kept.
pub fn clean_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim();

    for prefix in RESOLVER_PREFIXES {
        let matches = doi
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            doi = &doi[prefix.len()..];
            break;
        }
    }

    let doi = doi.split(['&', '?']).next().unwrap_or_default();
    let doi = doi.replace("&amp;", "&");
    let mut doi = doi.trim_end_matches(TRAILING_PUNCTUATION).to_string();

    if let Some((head, tail)) = doi.rsplit_once('/') {
        let numeric = !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit());
        // Only a segment after a second `/` is an artifact: `10.1108/1307371`
        // keeps its suffix even though a length-only rule would strip it.
        if numeric && head.contains('/') && (6..=8).contains(&tail.len()) {
            doi = head.to_string();
        }
    }

    if doi.is_empty() {
        None
    } else {
        Some(doi)
    }
}

/// Whether `candidate` (surrounding whitespace aside) is exactly a DOI.
pub fn is_valid_doi(candidate: &str) -> bool {
    let candidate = candidate.trim();
    !candidate.is_empty() && DOI_PATTERN.is_match(candidate)
}

/// Extract (unless the input already starts with `10.`), clean and validate.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let located = if raw.trim().starts_with("10.") {
        None
    } else {
        extract_doi(raw)
    };

    let cleaned = clean_doi(located.as_deref().unwrap_or(raw))?;

    if is_valid_doi(&cleaned) {
        Some(cleaned)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_known_inputs() {
        let cases = [
            ("10.1234/example", Some("10.1234/example")),
            ("https://doi.org/10.1234/example", Some("10.1234/example")),
            ("10.1234/example&type=pdf", Some("10.1234/example")),
            ("10.1108/REPS-12-2024-0104/1307371", Some("10.1108/REPS-12-2024-0104")),
            ("10.1177/2041905820911746", Some("10.1177/2041905820911746")),
            ("10.1201/9781003594185-8&type=chapterpdf", Some("10.1201/9781003594185-8")),
            (
                "10.4324/9781032646930-13/world2vec-vec2politics",
                Some("10.4324/9781032646930-13/world2vec-vec2politics"),
            ),
            ("not-a-doi", None),
            ("", None),
            ("10.1080/23738871.2020.1797136", Some("10.1080/23738871.2020.1797136")),
        ];

        for (input, expected) in cases {
            assert_eq!(normalize_doi(input).as_deref(), expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_normalize_wrapped_with_query() {
        assert_eq!(
            normalize_doi("https://dx.doi.org/10.1038/nature14539?download=true").as_deref(),
            Some("10.1038/nature14539")
        );
        assert_eq!(
            normalize_doi("see https://doi.org/10.1145/3292500.3330701&utm=x for details").as_deref(),
            Some("10.1145/3292500.3330701")
        );
    }

    #[test]
    fn test_clean_numeric_fragment_lengths() {
        assert_eq!(clean_doi("10.1234/abc/12345").as_deref(), Some("10.1234/abc/12345"));
        assert_eq!(clean_doi("10.1234/abc/123456").as_deref(), Some("10.1234/abc"));
        assert_eq!(clean_doi("10.1234/abc/12345678").as_deref(), Some("10.1234/abc"));
        assert_eq!(clean_doi("10.1234/abc/123456789").as_deref(), Some("10.1234/abc/123456789"));
        assert_eq!(clean_doi("10.1234/1234567").as_deref(), Some("10.1234/1234567"));
        assert_eq!(clean_doi("10.1108/1307371").as_deref(), Some("10.1108/1307371"));
    }

    #[test]
    fn test_clean_prefix_case_insensitive_and_single() {
        assert_eq!(clean_doi("HTTPS://DOI.ORG/10.1234/x").as_deref(), Some("10.1234/x"));
        // only one prefix is removed
        assert_eq!(
            clean_doi("doi:https://doi.org/10.1234/x").as_deref(),
            Some("https://doi.org/10.1234/x")
        );
    }

    #[test]
    fn test_clean_trailing_punctuation() {
        assert_eq!(clean_doi("10.1234/abc).").as_deref(), Some("10.1234/abc"));
        assert_eq!(clean_doi("10.1234/abc;:,").as_deref(), Some("10.1234/abc"));
        assert_eq!(clean_doi("  ").as_deref(), None);
        assert_eq!(clean_doi("?x=1").as_deref(), None);
    }

    #[test]
    fn test_validate() {
        assert!(is_valid_doi("10.1234/x"));
        assert!(is_valid_doi("  10.123456789/x  "));
        assert!(is_valid_doi("10.1234/ABC"));
        assert!(!is_valid_doi("11.1234/x"));
        assert!(!is_valid_doi("10.123/x"));
        assert!(!is_valid_doi("10.1234567890/x"));
        assert!(!is_valid_doi("10.1234/"));
        assert!(!is_valid_doi("10.1234/a b"));
        assert!(!is_valid_doi("doi:10.1234/x"));
    }

    #[test]
    fn test_extract() {
        assert_eq!(extract_doi("DOI: 10.1234/example").as_deref(), Some("10.1234/example"));
        assert_eq!(extract_doi("nothing here"), None);
        assert_eq!(extract_doi(""), None);
    }

    #[test]
    fn test_doi_url_path_keeps_slashes() {
        let doi = Doi::parse("10.1002/(SICI)1097-4571").unwrap();
        assert_eq!(doi.url_path(), "10.1002/%28SICI%291097-4571");

        let doi = Doi::parse("10.4324/9781032646930-13/world2vec").unwrap();
        assert_eq!(doi.url_path(), "10.4324/9781032646930-13/world2vec");
    }
}
