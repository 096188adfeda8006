use std::sync::Arc;

use serde_json::Value;
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::config::DedupConfig;
use crate::contracts::{ContractRegistry, ContractSummary, ValidationReport};
use crate::dedup::{DedupLedger, DedupVerdict, LedgerStats};
use crate::ingest::{self, types::DedupOutcome, types::NewsItem};
use crate::query::QuerySanitizer;

#[derive(Clone)]
pub struct AppState {
    ledger: Arc<DedupLedger>,
    registry: Arc<ContractRegistry>,
    sanitizer: Arc<QuerySanitizer>,
    check_content: bool,
}

impl AppState {
    pub fn from_config(cfg: &DedupConfig) -> Self {
        Self {
            ledger: Arc::new(DedupLedger::from_config(cfg)),
            registry: Arc::new(ContractRegistry::with_pipeline_contracts()),
            sanitizer: Arc::new(cfg.query_sanitizer()),
            check_content: cfg.ingest.check_content,
        }
    }

    /// Shared ledger handle, for ingestion workers running beside the HTTP surface.
    pub fn ledger(&self) -> Arc<DedupLedger> {
        self.ledger.clone()
    }

    pub fn registry(&self) -> Arc<ContractRegistry> {
        self.registry.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/dedup/check", post(dedup_check))
        .route("/dedup/mark", post(dedup_mark))
        .route("/dedup/batch", post(dedup_batch))
        .route("/dedup/stats", get(dedup_stats))
        .route("/admin/dedup/clear", post(admin_dedup_clear))
        .route("/query/build", post(query_build))
        .route("/query/batch", post(query_batch))
        .route("/contracts", get(list_contracts))
        .route("/contracts/{id}/validate", post(validate_contract))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct CheckReq {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    check_content: bool,
}

async fn dedup_check(State(state): State<AppState>, Json(body): Json<CheckReq>) -> Json<DedupVerdict> {
    let (_, reason) = state
        .ledger
        .is_duplicate(body.url.as_deref(), body.title.as_deref(), body.check_content);
    Json(reason.into())
}

#[derive(serde::Deserialize)]
struct MarkReq {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

async fn dedup_mark(State(state): State<AppState>, Json(body): Json<MarkReq>) -> Json<LedgerStats> {
    state.ledger.mark_seen(body.url.as_deref(), body.title.as_deref());
    Json(state.ledger.get_stats())
}

#[derive(serde::Deserialize)]
struct BatchParams {
    #[serde(default)]
    check_content: Option<bool>,
}

#[derive(serde::Serialize)]
struct BatchResp {
    outcomes: Vec<DedupOutcome>,
    rejected: usize,
}

async fn dedup_batch(
    State(state): State<AppState>,
    Query(params): Query<BatchParams>,
    Json(items): Json<Vec<NewsItem>>,
) -> Json<BatchResp> {
    let check_content = params.check_content.unwrap_or(state.check_content);
    let (outcomes, rejected) = ingest::dedup_batch(&*state.ledger, &state.registry, items, check_content);
    tracing::debug!(target: "api", outcomes = outcomes.len(), rejected, "dedup batch");
    Json(BatchResp { outcomes, rejected })
}

async fn dedup_stats(State(state): State<AppState>) -> Json<LedgerStats> {
    Json(state.ledger.get_stats())
}

async fn admin_dedup_clear(State(state): State<AppState>) -> Json<LedgerStats> {
    state.ledger.clear();
    Json(state.ledger.get_stats())
}

#[derive(serde::Deserialize)]
struct QueryReq {
    query: String,
}

#[derive(serde::Deserialize)]
struct BatchQueryReq {
    queries: Vec<String>,
}

#[derive(serde::Serialize)]
struct QueryResp {
    query: String,
}

async fn query_build(State(state): State<AppState>, Json(body): Json<QueryReq>) -> Json<QueryResp> {
    Json(QueryResp {
        query: state.sanitizer.build_query(&body.query),
    })
}

async fn query_batch(State(state): State<AppState>, Json(body): Json<BatchQueryReq>) -> Json<QueryResp> {
    Json(QueryResp {
        query: state.sanitizer.build_batched_query(&body.queries),
    })
}

async fn list_contracts(State(state): State<AppState>) -> Json<Vec<ContractSummary>> {
    Json(state.registry.contracts().map(|c| c.summary()).collect())
}

async fn validate_contract(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<ValidationReport>, (StatusCode, String)> {
    state
        .registry
        .validate(&id, &payload)
        .map(Json)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))
}
