//! Scheduled channel scan — tests every enabled channel and writes the
//! outcome back to the store.
//!
//! Runs on startup and then every `interval_hours`. Channels are handled
//! one after another; a store failure on one channel is logged and the
//! scan moves on.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{self, Duration};
use tracing::{error, info, warn, Instrument};

use super::{ChannelTester, Credential, TestSummary};
use crate::store::{Channel, ChannelStore, ChannelTestUpdate};

/// Totals for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub channels: usize,
    pub healthy: usize,
    pub failed: usize,
    /// Channels whose tokens could not be read.
    pub load_errors: usize,
    pub persist_errors: usize,
    pub duration_ms: u64,
}

/// Run the scan loop in the background.
pub async fn run_poller(store: Arc<ChannelStore>, tester: ChannelTester, interval_hours: u64) {
    info!("📡 Channel poller starting — initial scan...");
    if let Err(e) = run_full_scan(&store, &tester).await {
        error!("Initial scan failed: {:#}", e);
    }

    let mut interval = time::interval(scan_period(interval_hours));
    interval.tick().await; // first tick fires immediately

    loop {
        interval.tick().await;
        info!("📡 Running scheduled channel scan...");
        if let Err(e) = run_full_scan(&store, &tester).await {
            error!("Scheduled scan failed: {:#}", e);
        }
    }
}

/// Tick period for the scan loop, at least one hour.
fn scan_period(interval_hours: u64) -> Duration {
    Duration::from_secs(interval_hours.max(1).saturating_mul(3600))
}

/// Test every enabled channel once.
pub async fn run_full_scan(store: &ChannelStore, tester: &ChannelTester) -> Result<ScanReport> {
    let scan_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("scan", %scan_id);
    scan(store, tester).instrument(span).await
}

async fn scan(store: &ChannelStore, tester: &ChannelTester) -> Result<ScanReport> {
    let channels = store.list_enabled_channels()?;
    let started = Instant::now();
    info!(channels = channels.len(), "Scanning channels");

    let mut report = ScanReport { channels: channels.len(), ..Default::default() };

    for channel in &channels {
        let update = match test_channel(store, tester, channel).await {
            Ok(u) => u,
            Err(e) => {
                error!(channel_id = %channel.id, "Failed to load tokens: {:#}", e);
                report.load_errors += 1;
                continue;
            }
        };

        if update.ok {
            report.healthy += 1;
        } else {
            report.failed += 1;
        }

        match store.update_channel_test_result(&channel.id, &update) {
            Ok(true) => {}
            Ok(false) => warn!(channel_id = %channel.id, "Channel vanished before its result was stored"),
            Err(e) => {
                error!(channel_id = %channel.id, "Failed to store test result: {:#}", e);
                report.persist_errors += 1;
            }
        }
    }

    report.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        total = report.channels,
        healthy = report.healthy,
        failed = report.failed,
        load_errors = report.load_errors,
        persist_errors = report.persist_errors,
        duration_ms = report.duration_ms,
        "📡 Channel scan complete"
    );
    Ok(report)
}

/// Test one channel and return what should be written back.
///
/// Token rows win; a channel without any falls back to its legacy key;
/// a channel with neither gets the empty summary.
pub async fn test_channel(
    store: &ChannelStore,
    tester: &ChannelTester,
    channel: &Channel,
) -> Result<ChannelTestUpdate> {
    let tokens = store.list_tokens(&channel.id)?;

    if tokens.is_empty() {
        if let Some(key) = channel.api_key.as_deref().filter(|k| !k.is_empty()) {
            let update = match tester.test_single(&channel.base_url, key).await {
                Ok(result) => ChannelTestUpdate::from(&result),
                Err(e) => {
                    warn!(channel_id = %channel.id, "Probe failed: {}", e);
                    ChannelTestUpdate { ok: false, elapsed_ms: e.elapsed_ms(), ..Default::default() }
                }
            };
            info!(channel_id = %channel.id, ok = update.ok, elapsed_ms = update.elapsed_ms, "Channel tested (single key)");
            return Ok(update);
        }

        warn!(channel_id = %channel.id, "Channel has no tokens — marking as error");
        return Ok(ChannelTestUpdate::from(&TestSummary::empty()));
    }

    let credentials: Vec<Credential> = tokens.iter().map(Credential::from).collect();
    let summary = tester.test_tokens(&channel.base_url, &credentials).await;
    info!(
        channel_id = %channel.id,
        ok = summary.ok,
        success = summary.success,
        failed = summary.failed,
        elapsed_ms = summary.elapsed_ms,
        models = summary.models.len(),
        "Channel tested"
    );
    Ok(ChannelTestUpdate::from(&summary))
}
