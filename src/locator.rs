//! Locator normalization
//!
//! Locators arrive from the listing service in whatever shape the uploader
//! produced: double-encoded, with raw spaces, or missing a scheme. This module
//! turns them into one canonical `Url` so that fetches and content-cache keys
//! agree on what "the same document" means.
//!
//! ```text
//! input ──► fully decode (if '%') ──► re-encode (allow-list) ──► Url::parse
//!                                                                   │ fail
//!                                                                   ▼
//!                                     scheme / host / path / query reassembly
//! ```

use std::path::PathBuf;

use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::error::{ResolveError, Result};

/// Characters left as-is when re-encoding: RFC 3986 unreserved plus the
/// delimiters a URL needs to keep its structure.
const SAFE_PUNCTUATION: &str = "-._~:/?#[]@!$&'()*+,;=";

/// Schemes a normalized locator may carry
const ALLOWED_SCHEMES: [&str; 3] = ["https", "http", "file"];

/// Canonicalize a possibly malformed locator.
///
/// Idempotent: feeding the result back in yields the same URL.
pub fn normalize(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ResolveError::normalization(input, "empty locator"));
    }

    let decoded = if trimmed.contains('%') {
        fully_decode(trimmed)
    } else {
        trimmed.to_string()
    };

    let encoded = encode_allowed(&decoded);
    if let Ok(url) = Url::parse(&encoded) {
        if is_usable(&url) {
            return Ok(url);
        }
    }

    reassemble(&decoded).ok_or_else(|| {
        ResolveError::normalization(input, "could not construct a URL from its parts")
    })
}

/// Content-cache key for a normalized locator (SHA-256, hex)
pub fn content_key(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// Interpret a locator as a local path, if it names one.
///
/// `file://` URLs and scheme-less strings qualify; whether the file exists is
/// for the caller to check.
pub fn literal_path(locator: &str) -> Option<PathBuf> {
    let trimmed = locator.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("file://"))
    {
        return Url::parse(trimmed).ok()?.to_file_path().ok();
    }
    if trimmed.contains("://") {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

/// Percent-decode until nothing changes
fn fully_decode(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = String::from_utf8_lossy(&urlencoding::decode_binary(current.as_bytes()))
            .into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

fn encode_allowed(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut buf = [0u8; 4];
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || SAFE_PUNCTUATION.contains(ch) {
            out.push(ch);
        } else {
            out.push_str(&urlencoding::encode(ch.encode_utf8(&mut buf)));
        }
    }
    out
}

fn is_usable(url: &Url) -> bool {
    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return false;
    }
    url.scheme() == "file" || url.host_str().is_some_and(|h| !h.is_empty())
}

/// Last resort: split the locator by hand and rebuild it piecewise
fn reassemble(decoded: &str) -> Option<Url> {
    let (scheme, rest) = match decoded.split_once("://") {
        Some((scheme, rest)) if ALLOWED_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) => {
            (scheme.to_ascii_lowercase(), rest)
        }
        Some(_) => return None,
        None => ("https".to_string(), decoded),
    };

    let rest = rest.split('#').next().unwrap_or_default();
    let (authority_and_path, query) = match rest.split_once('?') {
        Some((head, query)) => (head, Some(query)),
        None => (rest, None),
    };
    let (host, path) = match authority_and_path.split_once('/') {
        Some((host, path)) => (host.trim(), format!("/{}", path)),
        None => (authority_and_path.trim(), "/".to_string()),
    };
    if host.is_empty() {
        return None;
    }

    let mut url = Url::parse(&format!("{}://{}", scheme, host)).ok()?;
    url.set_path(&encode_allowed(&path));
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.set_query(Some(&encode_allowed(query)));
    }
    is_usable(&url).then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn norm(input: &str) -> String {
        normalize(input).unwrap().to_string()
    }

    #[test]
    fn test_decodes_then_reencodes_space() {
        assert_eq!(norm("https://x/y%20z.pdf"), "https://x/y%20z.pdf");
        assert_eq!(norm("https://x/y z.pdf"), "https://x/y%20z.pdf");
    }

    #[test]
    fn test_double_encoded() {
        assert_eq!(norm("https://x/y%2520z.pdf"), "https://x/y%20z.pdf");
        assert_eq!(
            norm("https://cdn.example.com/notes/%25E5%25BE%25AE%25E7%25A9%258D.pdf"),
            "https://cdn.example.com/notes/%E5%BE%AE%E7%A9%8D.pdf"
        );
    }

    #[test]
    fn test_literal_percent_survives() {
        assert_eq!(norm("https://x/100%.pdf"), "https://x/100%25.pdf");
    }

    #[test]
    fn test_signed_query_kept() {
        let url = normalize("https://bucket.example.com/a.pdf?token=abc&expires=123").unwrap();
        assert_eq!(url.query(), Some("token=abc&expires=123"));
    }

    #[test]
    fn test_missing_scheme_is_reassembled() {
        assert_eq!(norm("example.com/notes/week 1.pdf"), "https://example.com/notes/week%201.pdf");
        assert_eq!(norm("localhost:8080/a.pdf"), "https://localhost:8080/a.pdf");
    }

    #[test]
    fn test_failures() {
        assert!(normalize("").is_err());
        assert!(normalize("   ").is_err());
        assert!(normalize("/only/a/path.pdf").is_err());
        assert!(normalize("ftp://example.com/a.pdf").is_err());
        assert!(matches!(
            normalize("hello world"),
            Err(ResolveError::Normalization { .. })
        ));
    }

    #[test]
    fn test_idempotent_fixed_cases() {
        let cases = [
            "https://x/y%20z.pdf",
            "https://x/y z.pdf",
            "https://x/y%2520z.pdf",
            "https://x/100%.pdf",
            "HTTPS://Example.COM/A B/c.pdf?q=a b&x=%27",
            "example.com/notes/week 1.pdf",
            "https://x/über notes.pdf",
            "https://x/a.pdf#page=2",
            "file:///tmp/scan%201.pdf",
        ];
        for case in cases {
            let once = norm(case);
            assert_eq!(norm(&once), once, "not idempotent for {:?}", case);
        }
    }

    #[test]
    fn test_content_key_is_stable_hex() {
        let a = normalize("https://x/y%20z.pdf").unwrap();
        let b = normalize("https://x/y z.pdf").unwrap();
        assert_eq!(content_key(&a), content_key(&b));
        assert_eq!(content_key(&a).len(), 64);
        assert!(content_key(&a).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_literal_path() {
        assert_eq!(literal_path("/data/scans/doc1.pdf"), Some(PathBuf::from("/data/scans/doc1.pdf")));
        assert_eq!(literal_path("file:///data/scan%201.pdf"), Some(PathBuf::from("/data/scan 1.pdf")));
        assert_eq!(literal_path("https://x/a.pdf"), None);
        assert_eq!(literal_path(""), None);
    }

    proptest! {
        #[test]
        fn prop_normalize_idempotent(
            host in "[a-z]{1,10}\\.(com|org|edu)",
            segments in prop::collection::vec("[a-zA-Z0-9 _%é-]{1,12}", 0..4),
            query in prop::option::of("[a-z]{1,5}=[a-zA-Z0-9 %]{0,8}"),
        ) {
            let mut input = format!("https://{}/{}", host, segments.join("/"));
            if let Some(q) = query {
                input.push('?');
                input.push_str(&q);
            }
            if let Ok(once) = normalize(&input) {
                let twice = normalize(once.as_str()).unwrap();
                prop_assert_eq!(once, twice);
            }
        }
    }
}
