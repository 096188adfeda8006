// src/lib.rs
// Public library surface for integration tests (and reuse by ingestion workers).

pub mod api;
pub mod config;
pub mod contracts;
pub mod dedup;
pub mod ingest;
pub mod metrics;
pub mod query;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::contracts::{assert_valid, validate, Contract, ContractRegistry, ContractViolation, ValidationReport};
pub use crate::dedup::{are_similar, get_url_hash, normalize_url, DedupLedger, DedupReason, LedgerStats};
pub use crate::ingest::types::{DedupOutcome, NewsItem};
pub use crate::query::{build_batched_query, build_query, parse_batched_response};
