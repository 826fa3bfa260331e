use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use ledgerwatch_domain::{
    config::BootstrapConfig,
    source::{SnapshotSource, SourceError},
};

use crate::{
    pipeline::{LedgerMonitor, TickOutcome},
    rpc::NodeClient,
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),
}

impl From<reqwest::Error> for MonitorError {
    fn from(value: reqwest::Error) -> Self {
        Self::Source(SourceError::from_source(value))
    }
}

pub fn build_node_source(config: &BootstrapConfig) -> Result<NodeClient, MonitorError> {
    Ok(NodeClient::new(config.node_url(), config.http_timeout())?)
}

/// Drives `tick` on a fixed interval until `shutdown` fires. Ticks are awaited
/// inline, so they never overlap; late timer firings are skipped. A failed
/// tick is logged and the loop carries on at the next interval. The monitor
/// is handed back on shutdown so its state survives a restart.
pub async fn run_monitor<S>(
    mut monitor: LedgerMonitor<S>,
    poll_interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) -> LedgerMonitor<S>
where
    S: SnapshotSource,
{
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(?poll_interval, "ledger monitor started");

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => run_tick(&mut monitor).await,
        }
    }

    info!(
        height = monitor.state().last_observed_height,
        "ledger monitor stopped"
    );
    monitor
}

async fn run_tick<S>(monitor: &mut LedgerMonitor<S>)
where
    S: SnapshotSource,
{
    match monitor.tick().await {
        Ok(TickOutcome::Skipped) => {
            counter!("monitor_ticks_total", "result" => "skipped").increment(1);
        }
        Ok(TickOutcome::Reconciled { height, events }) => {
            counter!("monitor_ticks_total", "result" => "ok").increment(1);
            debug!(height, events, "tick reconciled");
        }
        Err(err) => {
            counter!("monitor_ticks_total", "result" => "error").increment(1);
            warn!(%err, "monitor tick failed, retrying next interval");
        }
    }
}
