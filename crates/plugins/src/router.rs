//! Plugin lifecycle management and event fan-out.
//!
//! Every plugin call runs on its own task and the router waits for all of
//! them before returning, so one plugin failing or panicking only ever moves
//! that plugin to `Errored`.

use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, error, info, info_span, Instrument};

use ledgerwatch_domain::config::PluginEntry;
use ledgerwatch_domain::model::{ErrorNotice, MonitorEvent};
use ledgerwatch_domain::source::LedgerFacade;

use crate::plugin::{Plugin, PluginContext, PluginError, PluginResult};
use crate::registry::PluginRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PluginState {
    Stopped,
    Running,
    /// Terminal until the process restarts.
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
enum Operation {
    Start,
    Stop,
    Dispatch,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("unknown plugin id `{0}`")]
    UnknownPlugin(String),
}

#[derive(Clone)]
pub struct ManagedPlugin {
    id: String,
    plugin: Arc<dyn Plugin>,
    config: Arc<Value>,
    state: PluginState,
}

impl ManagedPlugin {
    pub fn new(id: impl Into<String>, plugin: Arc<dyn Plugin>, config: Value) -> Self {
        Self {
            id: id.into(),
            plugin,
            config: Arc::new(config),
            state: PluginState::Stopped,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    #[cfg(test)]
    pub(crate) fn with_state(mut self, state: PluginState) -> Self {
        self.state = state;
        self
    }
}

pub struct PluginRouter {
    plugins: Vec<ManagedPlugin>,
    errors: UnboundedSender<ErrorNotice>,
}

impl PluginRouter {
    /// Instantiates every enabled manifest entry through `registry`. Enabled
    /// entries with unknown ids are rejected; disabled ones are ignored.
    pub fn new(
        entries: &[PluginEntry],
        registry: &PluginRegistry,
        ledger: Arc<dyn LedgerFacade>,
        errors: UnboundedSender<ErrorNotice>,
    ) -> Result<Self, RouterError> {
        let mut plugins = Vec::new();
        for entry in entries.iter().filter(|entry| entry.enabled) {
            debug!(id = %entry.id, config = %entry.config, "creating plugin from manifest");
            let context = PluginContext {
                id: entry.id.clone(),
                config: entry.config.clone(),
                ledger: ledger.clone(),
            };
            let plugin = registry
                .build(context)
                .ok_or_else(|| RouterError::UnknownPlugin(entry.id.clone()))?;
            plugins.push(ManagedPlugin::new(entry.id.clone(), plugin, entry.config.clone()));
        }

        Ok(Self::from_managed(plugins, errors))
    }

    pub fn from_managed(plugins: Vec<ManagedPlugin>, errors: UnboundedSender<ErrorNotice>) -> Self {
        Self { plugins, errors }
    }

    pub fn plugins(&self) -> &[ManagedPlugin] {
        &self.plugins
    }

    pub fn state_of(&self, id: &str) -> Option<PluginState> {
        self.plugins
            .iter()
            .find(|managed| managed.id == id)
            .map(|managed| managed.state)
    }

    pub fn count_in(&self, state: PluginState) -> usize {
        self.plugins
            .iter()
            .filter(|managed| managed.state == state)
            .count()
    }

    /// Validates config and starts every stopped plugin concurrently.
    pub async fn start_all(&mut self) {
        debug!("starting plugins");
        self.fan_out(PluginState::Stopped, Operation::Start, |plugin, config| async move {
            plugin.validate_config(&config)?;
            plugin.on_start().await
        })
        .await;
        info!(
            running = self.count_in(PluginState::Running),
            errored = self.count_in(PluginState::Errored),
            "plugins started"
        );
    }

    /// Stops every running plugin concurrently.
    pub async fn stop_all(&mut self) {
        debug!("stopping plugins");
        self.fan_out(PluginState::Running, Operation::Stop, |plugin, _| async move {
            plugin.on_stop().await
        })
        .await;
    }

    /// Delivers one event to every running plugin and waits for all of them.
    pub async fn dispatch(&mut self, event: &MonitorEvent) {
        self.fan_out(PluginState::Running, Operation::Dispatch, |plugin, _| {
            let event = event.clone();
            async move { deliver(plugin.as_ref(), &event).await }
        })
        .await;
    }

    /// Dispatches events in arrival order until the channel closes or
    /// `shutdown` fires. Events already queued at shutdown are still
    /// delivered.
    pub async fn run(
        &mut self,
        events: &mut UnboundedReceiver<MonitorEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => self.dispatch(&event).await,
                    None => break,
                },
                _ = &mut shutdown => {
                    while let Ok(event) = events.try_recv() {
                        self.dispatch(&event).await;
                    }
                    break;
                }
            }
        }
        debug!("event routing finished");
    }

    async fn fan_out<F, Fut>(&mut self, eligible: PluginState, op: Operation, call: F)
    where
        F: Fn(Arc<dyn Plugin>, Arc<Value>) -> Fut,
        Fut: Future<Output = PluginResult> + Send + 'static,
    {
        let mut tasks = Vec::new();
        for (index, managed) in self.plugins.iter().enumerate() {
            if managed.state != eligible {
                continue;
            }
            let span = info_span!("plugin", id = %managed.id, op = op.as_ref());
            let task = call(managed.plugin.clone(), managed.config.clone()).instrument(span);
            tasks.push((index, tokio::spawn(task)));
        }

        for (index, task) in tasks {
            let result = task.await.unwrap_or_else(|err| Err(panic_error(err)));
            self.settle(index, op, result);
        }
    }

    fn settle(&mut self, index: usize, op: Operation, result: PluginResult) {
        let managed = &mut self.plugins[index];
        let next = match (&result, op) {
            (Err(_), _) => PluginState::Errored,
            (Ok(()), Operation::Start) => PluginState::Running,
            (Ok(()), Operation::Stop) => PluginState::Stopped,
            (Ok(()), Operation::Dispatch) => managed.state,
        };

        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!("plugin_callbacks_total", "op" => op.as_ref().to_string(), "result" => outcome)
            .increment(1);

        if next != managed.state {
            counter!("plugin_state_transitions_total", "state" => next.as_ref().to_string())
                .increment(1);
            info!(id = %managed.id, from = %managed.state, to = %next, "plugin state changed");
            managed.state = next;
        }

        if let Err(err) = result {
            error!(id = %managed.id, op = op.as_ref(), %err, "plugin failed");
            let notice = ErrorNotice::plugin(managed.id.clone(), &err);
            if self.errors.send(notice).is_err() {
                debug!("error notice receiver closed");
            }
        }
    }
}

async fn deliver(plugin: &dyn Plugin, event: &MonitorEvent) -> PluginResult {
    match event {
        MonitorEvent::PendingTx { tx, snapshot } => plugin.on_pending_tx(tx, snapshot).await,
        MonitorEvent::ConfirmedTx { tx, snapshot } => plugin.on_confirmed_tx(tx, snapshot).await,
        MonitorEvent::DroppedTx { tx, snapshot } => plugin.on_dropped_tx(tx, snapshot).await,
        MonitorEvent::NewBlock { block, snapshot } => plugin.on_new_block(block, snapshot).await,
    }
}

fn panic_error(err: JoinError) -> PluginError {
    if !err.is_panic() {
        return PluginError::Panicked("task cancelled".to_string());
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    PluginError::Panicked(message)
}
