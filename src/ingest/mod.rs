// src/ingest/mod.rs
pub mod types;

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use once_cell::sync::OnceCell;

use crate::contracts::registry::{INGESTION_TO_ANALYSIS, PROVIDER_SEARCH_RESPONSE};
use crate::contracts::ContractRegistry;
use crate::dedup::{DedupLedger, LedgerStore};
use crate::ingest::types::{DedupOutcome, NewsItem, SearchProvider, SourceProvider};
use crate::query::{parse_batched_response, QuerySanitizer};

/// Cap for snippets after normalization.
pub const MAX_SNIPPET_CHARS: usize = 1500;

/// Normalize text: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("whitespace regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    out
}

/// Normalized copy of an item; blank snippets become `None`, long ones are capped.
pub fn normalize_item(item: &NewsItem) -> NewsItem {
    let snippet = item
        .snippet
        .as_deref()
        .map(normalize_text)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.chars().count() > MAX_SNIPPET_CHARS {
                s.chars().take(MAX_SNIPPET_CHARS).collect()
            } else {
                s
            }
        });
    NewsItem {
        url: item.url.trim().to_string(),
        title: normalize_text(&item.title),
        snippet,
        source: item.source.trim().to_string(),
        observed_at: item.observed_at,
    }
}

/// Result of one ingest pass.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IngestReport {
    /// Every item that passed the contract, in arrival order, with its verdict.
    pub outcomes: Vec<DedupOutcome>,
    /// Items dropped for breaking the ingestion → analysis contract.
    pub rejected: usize,
    pub provider_errors: usize,
}

impl IngestReport {
    /// Novel items, ready for analysis.
    pub fn kept(&self) -> impl Iterator<Item = &NewsItem> + '_ {
        self.outcomes.iter().filter(|o| !o.duplicate).map(|o| &o.item)
    }

    pub fn duplicates(&self) -> usize {
        self.outcomes.iter().filter(|o| o.duplicate).count()
    }
}

/// Normalize, contract-check and deduplicate a batch against the shared ledger.
/// Returns outcomes for accepted items plus the number rejected by the contract.
pub fn dedup_batch<S: LedgerStore>(
    ledger: &DedupLedger<S>,
    registry: &ContractRegistry,
    items: Vec<NewsItem>,
    check_content: bool,
) -> (Vec<DedupOutcome>, usize) {
    let mut outcomes = Vec::with_capacity(items.len());
    let mut rejected = 0usize;

    for raw in items {
        let item = normalize_item(&raw);
        let payload = match serde_json::to_value(&item) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "item not serializable");
                rejected += 1;
                continue;
            }
        };
        let context = format!("ingest:{}", item.source);
        if let Err(violation) = registry.assert_valid(INGESTION_TO_ANALYSIS, &payload, &context) {
            tracing::warn!(target: "ingest", %violation, "item skipped");
            rejected += 1;
            continue;
        }

        let verdict = ledger.check_and_mark(&item, check_content);
        outcomes.push(DedupOutcome {
            item,
            duplicate: verdict.duplicate,
            reason: verdict.reason,
        });
    }

    (outcomes, rejected)
}

/// Run ingest once over the given providers. Provider failures are logged and counted.
pub async fn run_once<S: LedgerStore>(
    providers: &[Box<dyn SourceProvider>],
    ledger: &DedupLedger<S>,
    registry: &ContractRegistry,
    check_content: bool,
) -> IngestReport {
    crate::metrics::describe_once();

    let mut raw = Vec::new();
    let mut provider_errors = 0usize;
    for p in providers {
        match p.fetch_latest().await {
            Ok(mut v) => raw.append(&mut v),
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, provider = p.name(), "provider error");
                counter!("ingest_provider_errors_total").increment(1);
                provider_errors += 1;
            }
        }
    }

    let (outcomes, rejected) = dedup_batch(ledger, registry, raw, check_content);
    let report = IngestReport {
        outcomes,
        rejected,
        provider_errors,
    };

    // Telemetry
    let kept = report.kept().count();
    let duplicates = report.duplicates();
    counter!("ingest_kept_total").increment(kept as u64);
    counter!("ingest_duplicate_total").increment(duplicates as u64);
    counter!("ingest_rejected_total").increment(rejected as u64);
    gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

    tracing::info!(
        target: "ingest",
        kept,
        duplicates,
        rejected,
        provider_errors,
        "ingest pass finished"
    );

    report
}

/// Batch `queries` into one provider request and return one title per result row.
/// An empty batch (every query invalid) skips the provider call.
pub async fn search_batched<P: SearchProvider + ?Sized>(
    provider: &P,
    sanitizer: &QuerySanitizer,
    registry: &ContractRegistry,
    queries: &[String],
) -> Result<Vec<String>> {
    let query = sanitizer.build_batched_query(queries);
    if query.is_empty() {
        tracing::debug!(target: "ingest", provider = provider.name(), "no valid queries; skipping search");
        return Ok(Vec::new());
    }

    let response = provider
        .search(&query)
        .await
        .with_context(|| format!("search via {}", provider.name()))?;

    registry.assert_valid(
        PROVIDER_SEARCH_RESPONSE,
        &response,
        &format!("search:{}", provider.name()),
    )?;

    Ok(parse_batched_response(&response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(url: &str, title: &str) -> NewsItem {
        NewsItem {
            url: url.into(),
            title: title.into(),
            snippet: None,
            source: "test".into(),
            observed_at: chrono::Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn normalize_text_collapses_ws_and_tags() {
        let s = "  <b>Juve</b>&nbsp;&nbsp; win \u{201C}derby\u{201D}  ";
        assert_eq!(normalize_text(s), "Juve win \"derby\"");
    }

    #[test]
    fn normalize_item_drops_blank_snippet() {
        let mut it = item(" https://a.test/x ", " <p>T</p> ");
        it.snippet = Some("   ".into());
        let n = normalize_item(&it);
        assert_eq!(n.url, "https://a.test/x");
        assert_eq!(n.title, "T");
        assert_eq!(n.snippet, None);
    }

    #[test]
    fn normalize_item_caps_snippet() {
        let mut it = item("https://a.test/x", "T");
        it.snippet = Some("x".repeat(2_000));
        let n = normalize_item(&it);
        assert_eq!(n.snippet.map(|s| s.chars().count()), Some(MAX_SNIPPET_CHARS));
    }

    #[test]
    fn batch_dedups_within_itself_and_rejects_bad_items() {
        let ledger = DedupLedger::default();
        let reg = ContractRegistry::with_pipeline_contracts();
        let items = vec![
            item("https://a.test/x?utm_source=fb", "Roma appoint new coach"),
            item("https://a.test/x", "Roma appoint new coach"),
            item("not-a-url", "Something"),
            item("https://b.test/y", "   "),
        ];
        let (outcomes, rejected) = dedup_batch(&ledger, &reg, items, true);
        assert_eq!(rejected, 2);
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].duplicate);
        assert!(outcomes[1].duplicate);
        assert_eq!(outcomes[1].reason.as_str(), "duplicate_url");
    }
}
