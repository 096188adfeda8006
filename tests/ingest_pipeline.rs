// tests/ingest_pipeline.rs
//
// End-to-end ingest pass with in-process providers:
// fetch → normalize → contract check → dedup against the shared ledger.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Mutex;

use sports_news_dedup::contracts::ContractRegistry;
use sports_news_dedup::dedup::{DedupLedger, DedupReason};
use sports_news_dedup::ingest::types::{SearchProvider, SourceProvider};
use sports_news_dedup::ingest::{run_once, search_batched};
use sports_news_dedup::query::QuerySanitizer;
use sports_news_dedup::NewsItem;

fn item(source: &str, url: &str, title: &str) -> NewsItem {
    NewsItem {
        url: url.into(),
        title: title.into(),
        snippet: None,
        source: source.into(),
        observed_at: Utc.with_ymd_and_hms(2025, 9, 6, 10, 0, 0).unwrap(),
    }
}

struct StaticFeed {
    name: &'static str,
    items: Vec<NewsItem>,
}

#[async_trait]
impl SourceProvider for StaticFeed {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        Ok(self.items.clone())
    }
    fn name(&self) -> &'static str {
        self.name
    }
}

struct BrokenFeed;

#[async_trait]
impl SourceProvider for BrokenFeed {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        Err(anyhow!("upstream 503"))
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn pass_keeps_novel_items_and_drops_reposts() {
    let providers: Vec<Box<dyn SourceProvider>> = vec![
        Box::new(StaticFeed {
            name: "gazzetta",
            items: vec![
                item(
                    "gazzetta",
                    "https://www.gazzetta.it/calcio/milan-modric?utm_source=tw",
                    "Milan, Modric signs one-year deal",
                ),
                item(
                    "gazzetta",
                    "https://www.gazzetta.it/calcio/roma-coach",
                    "<b>Roma</b> appoint Gasperini as head coach",
                ),
            ],
        }),
        Box::new(BrokenFeed),
        Box::new(StaticFeed {
            name: "x",
            items: vec![
                // same article, different tracking tags
                item(
                    "x:@FabrizioRomano",
                    "https://WWW.gazzetta.it/calcio/milan-modric#comments",
                    "Modric to Milan",
                ),
                // same story, other outlet
                item(
                    "x:@DiMarzio",
                    "https://gianlucadimarzio.com/roma-gasperini",
                    "Gasperini appointed Roma head coach",
                ),
                // contract breach: no usable link
                item("x:@nobody", "ftp://files.test/leak", "Leak"),
            ],
        }),
    ];

    let ledger = DedupLedger::default();
    let registry = ContractRegistry::with_pipeline_contracts();

    let report = run_once(&providers, &ledger, &registry, true).await;

    assert_eq!(report.provider_errors, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.duplicates(), 2);

    let kept: Vec<&str> = report.kept().map(|i| i.title.as_str()).collect();
    assert_eq!(
        kept,
        vec![
            "Milan, Modric signs one-year deal",
            "Roma appoint Gasperini as head coach"
        ]
    );
    assert_eq!(report.outcomes[2].reason, DedupReason::DuplicateUrl);
    assert_eq!(report.outcomes[3].reason, DedupReason::DuplicateContent);

    // second pass over the same feeds admits nothing new
    let again = run_once(&providers, &ledger, &registry, true).await;
    assert_eq!(again.kept().count(), 0);
    assert_eq!(ledger.get_stats().unique_urls, 2);
}

#[tokio::test]
async fn url_only_pass_keeps_rephrased_stories() {
    let providers: Vec<Box<dyn SourceProvider>> = vec![Box::new(StaticFeed {
        name: "mixed",
        items: vec![
            item("a", "https://a.test/1", "Roma appoint Gasperini as head coach"),
            item("b", "https://b.test/2", "Gasperini appointed Roma head coach"),
        ],
    })];
    let ledger = DedupLedger::default();
    let registry = ContractRegistry::with_pipeline_contracts();

    let report = run_once(&providers, &ledger, &registry, false).await;
    assert_eq!(report.kept().count(), 2);
}

/// Records every query it receives and answers with a fixed payload.
struct RecordingSearch {
    seen: Mutex<Vec<String>>,
    response: Value,
}

#[async_trait]
impl SearchProvider for RecordingSearch {
    async fn search(&self, query: &str) -> Result<Value> {
        self.seen.lock().unwrap().push(query.to_string());
        Ok(self.response.clone())
    }
    fn name(&self) -> &'static str {
        "recording"
    }
}

#[tokio::test]
async fn batched_search_sends_one_query_and_maps_rows() {
    let provider = RecordingSearch {
        seen: Mutex::new(Vec::new()),
        response: json!({ "data": [ { "title": "Juve win" }, { "id": 7 }, { "title": "Inter draw" } ] }),
    };
    let sanitizer = QuerySanitizer::default();
    let registry = ContractRegistry::with_pipeline_contracts();
    let queries = vec![
        "Juventus -basketball".to_string(),
        "x".to_string(),
        "Inter Milan".to_string(),
    ];

    let titles = search_batched(&provider, &sanitizer, &registry, &queries)
        .await
        .unwrap();

    assert_eq!(titles, vec!["Juve win", "", "Inter draw"]);
    let seen = provider.seen.lock().unwrap();
    assert_eq!(*seen, vec!["Juventus OR Inter Milan".to_string()]);
}

#[tokio::test]
async fn batched_search_skips_provider_when_nothing_is_valid() {
    let provider = RecordingSearch {
        seen: Mutex::new(Vec::new()),
        response: json!({ "data": [] }),
    };
    let titles = search_batched(
        &provider,
        &QuerySanitizer::default(),
        &ContractRegistry::with_pipeline_contracts(),
        &["a".to_string(), " ".to_string()],
    )
    .await
    .unwrap();
    assert!(titles.is_empty());
    assert!(provider.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_search_response_is_a_contract_violation() {
    let provider = RecordingSearch {
        seen: Mutex::new(Vec::new()),
        response: json!({ "results": [] }),
    };
    let err = search_batched(
        &provider,
        &QuerySanitizer::default(),
        &ContractRegistry::with_pipeline_contracts(),
        &["Napoli".to_string()],
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("provider_search_response"), "{err}");
}
