//! Dedup Service: Binary Entrypoint
//! Boots the Axum HTTP server, wiring the shared ledger, contract registry and metrics.

use shuttle_axum::ShuttleAxum;
use sports_news_dedup::{api, config::DedupConfig, metrics::Metrics};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs when DEDUP_DEV_LOG=1.
/// Uses RUST_LOG when set, otherwise `dedup=info,warn`.
fn enable_dev_tracing() {
    let dev_flag = std::env::var("DEDUP_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");
    if !dev_flag {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dedup=info,warn"));

    // The runtime may already own the global subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    // Recorder first, so series descriptions land on it.
    let metrics = Metrics::init().map_err(shuttle_runtime::Error::Custom)?;

    let cfg = DedupConfig::load_default().map_err(shuttle_runtime::Error::Custom)?;
    tracing::info!(
        target: "dedup",
        max_urls = cfg.ledger.max_urls,
        max_fingerprints = cfg.ledger.max_fingerprints,
        window_secs = cfg.ledger.fingerprint_window_secs,
        threshold = cfg.similarity.threshold,
        "dedup config loaded"
    );

    let state = api::AppState::from_config(&cfg);
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
