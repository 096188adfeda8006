// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::dedup::DedupReason;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: Option<String>,
    pub source: String, // e.g., "gazzetta", "x:@FabrizioRomano"
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

/// A `NewsItem` with its dedup verdict.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
pub struct DedupOutcome {
    pub item: NewsItem,
    pub duplicate: bool,
    pub reason: DedupReason,
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>>;
    fn name(&self) -> &'static str;
}

/// Provider whose query grammar is shaped by `crate::query`.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns the raw response, expected as `{ "data": [ { "title": ... }, ... ] }`.
    async fn search(&self, query: &str) -> Result<serde_json::Value>;
    fn name(&self) -> &'static str;
}
