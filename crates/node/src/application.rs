use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info};

use ledgerwatch_domain::config::{
    load_plugin_manifest, BootstrapConfig, ConfigError, MonitorSettings,
};
use ledgerwatch_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
use ledgerwatch_domain::source::LedgerFacade;
use ledgerwatch_monitor::{
    build_node_source, ExplorerClient, LedgerMonitor, LedgerProvider, MonitorError,
};
use ledgerwatch_plugins::{builtin_registry, PluginRouter, RouterError};

use crate::components::{MonitorComponent, RouterComponent};
use crate::supervisor::{log_notices, Supervisor};

/// Wires config, telemetry, the monitor and the plugin router together, then
/// runs until Ctrl-C.
pub async fn run() -> Result<(), BootstrapError> {
    let config = BootstrapConfig::load_from_env()?;
    let settings = MonitorSettings::load_from_env()?;

    let telemetry_config = TelemetryConfig::from_env("LEDGERWATCH");
    let telemetry = init_telemetry(&telemetry_config)?;

    let manifest = load_plugin_manifest(config.plugins_file())?;
    info!(
        plugins = manifest.len(),
        file = config.plugins_file(),
        "plugin manifest loaded"
    );

    let node = build_node_source(&config)?;
    let explorer = ExplorerClient::new(config.explorer_url(), config.http_timeout())
        .map_err(MonitorError::from)?;
    let ledger: Arc<dyn LedgerFacade> = Arc::new(LedgerProvider::new(node.clone(), explorer));

    let (notice_tx, notice_rx) = unbounded_channel();
    let (event_tx, event_rx) = unbounded_channel();

    let router = PluginRouter::new(&manifest, &builtin_registry(), ledger, notice_tx.clone())?;
    let monitor = LedgerMonitor::new(node, settings, event_tx);

    let mut supervisor = Supervisor::new(notice_tx)
        .with_component(RouterComponent::new(router, event_rx))
        .with_component(MonitorComponent::new(monitor));
    let notices = tokio::spawn(log_notices(notice_rx));

    supervisor.start().await;
    info!(
        node = config.node_url(),
        running = ?supervisor.running(),
        "ledgerwatch started"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    supervisor.stop().await;

    // dropping the supervisor and router releases every notice sender
    drop(supervisor);
    if let Ok(seen) = notices.await {
        info!(notices = seen, "ledgerwatch stopped");
    }
    debug!(metrics = %telemetry.render_metrics(), "final metrics snapshot");

    Ok(())
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
    #[error("plugin error: {0}")]
    Router(#[from] RouterError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
