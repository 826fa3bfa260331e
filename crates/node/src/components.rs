//! `Component` adapters for the monitor poll loop and the plugin router.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use ledgerwatch_domain::model::MonitorEvent;
use ledgerwatch_domain::source::SnapshotSource;
use ledgerwatch_domain::{Component, ComponentError};
use ledgerwatch_monitor::{run_monitor, LedgerMonitor};
use ledgerwatch_plugins::PluginRouter;

struct Running<T> {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<T>,
}

impl<T> Running<T> {
    async fn finish(self, name: &'static str) -> Result<T, ComponentError> {
        // a closed receiver means the task already ended on its own
        let _ = self.shutdown.send(());
        self.task.await.map_err(|err| ComponentError::Task {
            name,
            cause: err.to_string(),
        })
    }
}

pub struct MonitorComponent<S> {
    idle: Option<LedgerMonitor<S>>,
    poll_interval: Duration,
    running: Option<Running<LedgerMonitor<S>>>,
}

impl<S> MonitorComponent<S>
where
    S: SnapshotSource + 'static,
{
    pub fn new(monitor: LedgerMonitor<S>) -> Self {
        let poll_interval = monitor.settings().poll_interval;
        Self {
            idle: Some(monitor),
            poll_interval,
            running: None,
        }
    }
}

#[async_trait]
impl<S> Component for MonitorComponent<S>
where
    S: SnapshotSource + 'static,
{
    fn name(&self) -> &'static str {
        "monitor"
    }

    async fn start(&mut self) -> Result<(), ComponentError> {
        let monitor = match (self.running.is_some(), self.idle.take()) {
            (false, Some(monitor)) => monitor,
            (_, idle) => {
                self.idle = idle;
                return Err(ComponentError::AlreadyRunning { name: self.name() });
            }
        };
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_monitor(monitor, self.poll_interval, shutdown_rx));
        self.running = Some(Running { shutdown, task });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ComponentError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        let monitor = running.finish(self.name()).await?;
        self.idle = Some(monitor);
        Ok(())
    }
}

type RouterTask = (PluginRouter, UnboundedReceiver<MonitorEvent>);

/// Owns the router and the receiving end of the monitor's event channel.
/// Start runs `start_all` before routing; stop drains queued events, then
/// runs `stop_all`.
pub struct RouterComponent {
    idle: Option<RouterTask>,
    running: Option<Running<RouterTask>>,
}

impl RouterComponent {
    pub fn new(router: PluginRouter, events: UnboundedReceiver<MonitorEvent>) -> Self {
        Self {
            idle: Some((router, events)),
            running: None,
        }
    }
}

#[async_trait]
impl Component for RouterComponent {
    fn name(&self) -> &'static str {
        "router"
    }

    async fn start(&mut self) -> Result<(), ComponentError> {
        if self.running.is_some() {
            return Err(ComponentError::AlreadyRunning { name: self.name() });
        }
        let Some((mut router, mut events)) = self.idle.take() else {
            return Err(ComponentError::AlreadyRunning { name: self.name() });
        };

        router.start_all().await;
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            router.run(&mut events, shutdown_rx).await;
            (router, events)
        });
        self.running = Some(Running { shutdown, task });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ComponentError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        let (mut router, events) = running.finish(self.name()).await?;
        router.stop_all().await;
        info!(plugins = router.plugins().len(), "plugin router stopped");
        self.idle = Some((router, events));
        Ok(())
    }
}
