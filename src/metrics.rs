use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_once() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("dedup_checks_total", "Duplicate checks performed by the ledger.");
        describe_counter!(
            "dedup_duplicates_total",
            "Items found to be duplicates, labelled by reason."
        );
        describe_counter!("dedup_marked_total", "New canonical URLs recorded.");
        describe_gauge!("dedup_ledger_urls", "Canonical URLs currently held by the ledger.");
        describe_counter!(
            "contract_violations_total",
            "Payloads rejected by a pipeline contract, labelled by contract."
        );
        describe_counter!("ingest_kept_total", "Novel items handed to analysis.");
        describe_counter!("ingest_duplicate_total", "Items dropped as duplicates.");
        describe_counter!("ingest_rejected_total", "Items dropped for breaking the ingestion contract.");
        describe_counter!("ingest_provider_errors_total", "Provider fetch errors.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
        describe_counter!("query_rejected_total", "Outbound queries rejected as too short.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Fails if a recorder is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        describe_once();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
