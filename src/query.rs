// src/query.rs
//! Outbound search-query shaping for providers with a restrictive grammar.
//!
//! The social search provider rejects negative terms and long requests, so:
//! - `build_query` drops `-term` exclusions for a known vocabulary, collapses
//!   whitespace and percent-encodes each word (literal spaces survive);
//! - `build_batched_query` ORs several queries into one request, falling back
//!   to the first valid query when the result would be too long;
//! - `parse_batched_response` pulls one display string per result row.
//!
//! An exclusion is only recognized between whitespace (or the ends of the query)
//! AND when the term is in the vocabulary, so `pre-season`, `Milan - Inter` and
//! `-basket-ball` survive.

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;

pub const MIN_QUERY_CHARS: usize = 2;
pub const DEFAULT_MAX_BATCHED_LEN: usize = 500;
pub const OR_SEPARATOR: &str = " OR ";

/// Topics our sports queries historically excluded with `-term`.
pub const DEFAULT_EXCLUDED_TERMS: &[&str] = &[
    "basketball",
    "basket",
    "womens",
    "women",
    "femminile",
    "volleyball",
    "volley",
    "futsal",
    "primavera",
    "youth",
    "u19",
    "u21",
    "esports",
];

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static DEFAULT_SANITIZER: Lazy<QuerySanitizer> = Lazy::new(QuerySanitizer::default);

/// `[query]` config section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct QueryConfig {
    #[serde(default = "default_excluded_terms")]
    pub excluded_terms: Vec<String>,
    #[serde(default = "default_max_batched_len")]
    pub max_batched_len: usize,
}

fn default_excluded_terms() -> Vec<String> {
    DEFAULT_EXCLUDED_TERMS.iter().map(|s| s.to_string()).collect()
}
fn default_max_batched_len() -> usize {
    DEFAULT_MAX_BATCHED_LEN
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            excluded_terms: default_excluded_terms(),
            max_batched_len: default_max_batched_len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuerySanitizer {
    exclusion: Option<Regex>,
    max_batched_len: usize,
}

impl Default for QuerySanitizer {
    fn default() -> Self {
        Self::new(&QueryConfig::default())
    }
}

impl QuerySanitizer {
    pub fn new(cfg: &QueryConfig) -> Self {
        let mut terms: Vec<String> = cfg
            .excluded_terms
            .iter()
            .map(|t| t.trim().trim_start_matches('-').to_lowercase())
            .filter(|t| !t.is_empty())
            .map(|t| regex::escape(&t))
            .collect();
        // Longest first, so "basketball" is tried before "basket".
        terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        terms.dedup();

        let exclusion = if terms.is_empty() {
            None
        } else {
            // The term must end at whitespace or end of input: `-basket-ball` is not `-basket`.
            let pattern = format!(r"(?i)(^|\s)-(?:{})(\s|$)", terms.join("|"));
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(target: "query", error = %e, "exclusion regex rejected; exclusions kept verbatim");
                    None
                }
            }
        };

        Self {
            exclusion,
            max_batched_len: cfg.max_batched_len.max(MIN_QUERY_CHARS),
        }
    }

    /// Sanitized, transport-safe query; `""` when the query is too short.
    pub fn build_query(&self, query: &str) -> String {
        let trimmed = query.trim();
        if trimmed.chars().count() < MIN_QUERY_CHARS {
            counter!("query_rejected_total").increment(1);
            return String::new();
        }

        let stripped = match &self.exclusion {
            Some(re) => strip_exclusions(re, trimmed),
            None => trimmed.to_string(),
        };
        let collapsed = RE_WS.replace_all(stripped.trim(), " ");
        if collapsed.chars().count() < MIN_QUERY_CHARS {
            counter!("query_rejected_total").increment(1);
            return String::new();
        }

        collapsed
            .split(' ')
            .map(|word| urlencoding::encode(word).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Valid queries joined by `OR`; first valid query if the join is too long.
    pub fn build_batched_query<S: AsRef<str>>(&self, queries: &[S]) -> String {
        let built: Vec<String> = queries
            .iter()
            .map(|q| self.build_query(q.as_ref()))
            .filter(|q| !q.is_empty())
            .collect();

        let Some(first) = built.first() else {
            return String::new();
        };
        let joined = built.join(OR_SEPARATOR);
        if joined.chars().count() > self.max_batched_len {
            tracing::debug!(
                target: "query",
                len = joined.len(),
                max = self.max_batched_len,
                dropped = built.len() - 1,
                "batched query too long; using first query only"
            );
            return first.clone();
        }
        joined
    }
}

// Matches consume their trailing space, so back-to-back exclusions need another pass.
fn strip_exclusions(re: &Regex, query: &str) -> String {
    let mut out = query.to_string();
    loop {
        let next = match re.replace_all(&out, "$1$2") {
            Cow::Owned(s) => s,
            Cow::Borrowed(_) => break,
        };
        out = next;
    }
    out
}

/// `QuerySanitizer::build_query` with the built-in vocabulary.
pub fn build_query(query: &str) -> String {
    DEFAULT_SANITIZER.build_query(query)
}

/// `QuerySanitizer::build_batched_query` with the built-in vocabulary and 500-char cap.
pub fn build_batched_query<S: AsRef<str>>(queries: &[S]) -> String {
    DEFAULT_SANITIZER.build_batched_query(queries)
}

/// One display string per row of `response.data`, in order (`""` when a row has no title).
pub fn parse_batched_response(response: &Value) -> Vec<String> {
    let Some(rows) = response.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            row.get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}
