// src/dedup/url.rs
//! URL canonicalization for exact-match deduplication.
//!
//! Two links to the same article usually differ only by noise: campaign
//! parameters (`utm_*`, `fbclid`, ...), a `#fragment`, a trailing slash or the
//! case of the host. `normalize_url` strips that noise so equal resources
//! compare equal, and `get_url_hash` turns the canonical form into a stable key.
//!
//! Fail-open: empty input yields `""`, unparsable input is returned unchanged.

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use url::Url;

/// Query keys that only carry attribution data.
pub const DEFAULT_TRACKING_KEYS: &[&str] = &[
    "fbclid",
    "gclid",
    "dclid",
    "gclsrc",
    "msclkid",
    "yclid",
    "twclid",
    "igshid",
    "mc_cid",
    "mc_eid",
    "_ga",
    "_gl",
    "ref",
    "ref_src",
    "ref_url",
    "cmpid",
    "ocid",
    "ito",
    "s_cid",
    "smid",
    "at_medium",
    "at_campaign",
    "at_custom1",
    "at_custom2",
];

/// Key prefixes of tracking families (`utm_source`, `ns_campaign`, ...).
pub const DEFAULT_TRACKING_PREFIXES: &[&str] = &["utm_", "ns_", "pk_", "hsa_"];

static DEFAULT_CANONICALIZER: Lazy<UrlCanonicalizer> = Lazy::new(UrlCanonicalizer::default);

/// Canonicalizer with a configurable tracking-parameter set.
#[derive(Debug, Clone)]
pub struct UrlCanonicalizer {
    keys: Vec<String>,
    prefixes: Vec<String>,
}

impl Default for UrlCanonicalizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_TRACKING_KEYS.iter().map(|s| s.to_string()),
            DEFAULT_TRACKING_PREFIXES.iter().map(|s| s.to_string()),
        )
    }
}

impl UrlCanonicalizer {
    /// Keys and prefixes are matched case-insensitively.
    pub fn new<K, P>(keys: K, prefixes: P) -> Self
    where
        K: IntoIterator<Item = String>,
        P: IntoIterator<Item = String>,
    {
        let clean = |v: String| {
            let t = v.trim().to_ascii_lowercase();
            (!t.is_empty()).then_some(t)
        };
        Self {
            keys: keys.into_iter().filter_map(clean).collect(),
            prefixes: prefixes.into_iter().filter_map(clean).collect(),
        }
    }

    pub fn is_tracking_key(&self, key: &str) -> bool {
        let k = key.to_ascii_lowercase();
        self.keys.iter().any(|t| *t == k) || self.prefixes.iter().any(|p| k.starts_with(p.as_str()))
    }

    /// Canonical form of `url`; see module docs for the rules.
    pub fn normalize<'a>(&self, url: impl Into<Option<&'a str>>) -> String {
        let Some(raw) = url.into() else {
            return String::new();
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let Ok(mut parsed) = Url::parse(trimmed) else {
            return raw.to_string();
        };

        parsed.set_fragment(None);

        if let Some(host) = parsed.host_str() {
            let lower = host.to_ascii_lowercase();
            if lower != host {
                // Special schemes are already lower-cased by the parser.
                let _ = parsed.set_host(Some(&lower));
            }
        }

        let path = parsed.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            parsed.set_path(&path[..path.len() - 1]);
        }

        if parsed.query().is_some() {
            let kept: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| !self.is_tracking_key(k))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            if kept.is_empty() {
                parsed.set_query(None);
            } else {
                parsed.query_pairs_mut().clear().extend_pairs(kept.iter());
            }
        }

        parsed.to_string()
    }

    /// SHA-256 (hex) of the canonical form.
    pub fn hash<'a>(&self, url: impl Into<Option<&'a str>>) -> String {
        sha256_hex(&self.normalize(url))
    }
}

/// Canonicalize with the built-in tracking set.
pub fn normalize_url<'a>(url: impl Into<Option<&'a str>>) -> String {
    DEFAULT_CANONICALIZER.normalize(url)
}

/// Stable hash of the canonical form, using the built-in tracking set.
pub fn get_url_hash<'a>(url: impl Into<Option<&'a str>>) -> String {
    DEFAULT_CANONICALIZER.hash(url)
}

pub(crate) fn sha256_hex(s: &str) -> String {
    use std::fmt::Write as _;
    let digest = Sha256::digest(s.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Short anonymized id for log lines (never log raw titles).
pub(crate) fn short_id(s: &str) -> String {
    sha256_hex(s)[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_none_yield_empty() {
        assert_eq!(normalize_url(""), "");
        assert_eq!(normalize_url("   "), "");
        assert_eq!(normalize_url(None), "");
    }

    #[test]
    fn unparsable_is_returned_unchanged() {
        assert_eq!(normalize_url("not a url"), "not a url");
        assert_eq!(normalize_url("example.com/a/"), "example.com/a/");
    }

    #[test]
    fn strips_fragment_slash_and_tracking() {
        let out = normalize_url("https://Example.COM/calcio/juve/?utm_source=tw&id=7&fbclid=abc#top");
        assert_eq!(out, "https://example.com/calcio/juve?id=7");
    }

    #[test]
    fn keeps_non_tracking_params_in_order() {
        let out = normalize_url("https://example.com/a?b=2&utm_medium=x&a=1");
        assert_eq!(out, "https://example.com/a?b=2&a=1");
    }

    #[test]
    fn tracking_keys_match_case_insensitively() {
        let c = UrlCanonicalizer::default();
        assert!(c.is_tracking_key("UTM_Campaign"));
        assert!(c.is_tracking_key("FBCLID"));
        assert!(!c.is_tracking_key("page"));
    }

    #[test]
    fn root_path_is_stable() {
        assert_eq!(
            normalize_url("https://example.com"),
            normalize_url("https://example.com/")
        );
    }

    #[test]
    fn custom_set_replaces_defaults() {
        let c = UrlCanonicalizer::new(vec!["session".to_string()], Vec::<String>::new());
        assert_eq!(
            c.normalize("https://x.test/p?session=1&utm_source=a"),
            "https://x.test/p?utm_source=a"
        );
    }

    #[test]
    fn hash_is_hex_sha256() {
        let h = get_url_hash("https://example.com/a");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(h, get_url_hash("https://EXAMPLE.com/a/#x"));
    }
}
