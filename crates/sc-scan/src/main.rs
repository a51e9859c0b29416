//! OBD-II scan tool: scans a vehicle through an ELM327 adapter, or replays
//! a recorded adapter session, and prints decoded readings as JSON lines.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use sc_scan::config::{DEFAULT_CONFIG_PATH, ScanConfig};
use sc_scan::runner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = ScanConfig::from_file(&config_path)?;

    // stdout carries the readings; logs go to stderr.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if config.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        device = %config.device,
        replay = config.is_replay(),
        "sc-scan starting"
    );

    // ── Catalog & session ───────────────────────────────────────
    let catalog = Arc::new(runner::load_catalog(&config)?);
    let session = runner::open_session(&config).await?;

    // ── Scan ────────────────────────────────────────────────────
    tokio::select! {
        result = runner::run(&config, session, catalog, std::io::stdout().lock()) => {
            let events = result?;
            tracing::info!(events, "sc-scan finished");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
