//! Channel probe daemon.
//!
//! Seeds channels from the config file, then tests every enabled channel
//! against its upstream `/v1/models` on startup and on a fixed interval,
//! storing status, latency and the discovered model list.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use channel_probe::config::{Config, LogFormat};
use channel_probe::discovery::poller;
use channel_probe::{ChannelStore, ChannelTester, OpenAIModelsProbe};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    info!("📡 Channel probe v{}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data dir {}", config.data_dir.display()))?;

    // ── Channel Store ───────────────────────────────────────────────
    let store = Arc::new(ChannelStore::open(&config.db_path).context("Failed to open channel store")?);
    let seeded = config.seed_store(&store).context("Failed to seed channels from config")?;
    let total = store.list_channels()?.len();
    info!(db = %config.db_path.display(), seeded, total, "📦 Channel store ready");

    // ── Probe ───────────────────────────────────────────────────────
    let probe = OpenAIModelsProbe::with_timeout(config.request_timeout())
        .context("Failed to build HTTP client")?;
    let tester = ChannelTester::with_probe(Arc::new(probe));

    if config.run_once {
        let report = poller::run_full_scan(&store, &tester).await?;
        info!(healthy = report.healthy, failed = report.failed, "Single scan finished");
        return Ok(());
    }

    // ── Poller ──────────────────────────────────────────────────────
    let poller_store = Arc::clone(&store);
    let interval = config.scan_interval_hours;
    let handle = tokio::spawn(async move {
        poller::run_poller(poller_store, tester, interval).await;
    });

    info!(interval_hours = interval, "Channel probe running — Ctrl-C to stop");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
        res = handle => res.context("Poller task ended unexpectedly")?,
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "channel_probe=info".into());
    match format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}
