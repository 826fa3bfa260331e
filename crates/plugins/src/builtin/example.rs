use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use ledgerwatch_domain::model::{Block, Snapshot, Transaction};

use crate::plugin::{Plugin, PluginContext, PluginDescriptor, PluginResult};
use crate::schema::{ConfigSchema, FieldKind};

pub const EXAMPLE_PLUGIN_ID: &str = "example_plugin";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleConfig {
    pub some_value: f64,
}

/// Logs every lifecycle event it sees. Meant as a starting point for new
/// plugins.
pub struct ExamplePlugin {
    context: PluginContext,
    observed: AtomicU64,
}

impl ExamplePlugin {
    pub fn new(context: PluginContext) -> Self {
        Self {
            context,
            observed: AtomicU64::new(0),
        }
    }

    pub fn factory(context: PluginContext) -> Arc<dyn Plugin> {
        Arc::new(Self::new(context))
    }

    pub fn observed(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }

    fn observe(&self) {
        self.observed.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl Plugin for ExamplePlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            name: "Example Plugin",
            description: "Showcases how to implement a ledgerwatch plugin by logging every event.",
            version: "0.1.0",
        }
    }

    fn config_schema(&self) -> Option<ConfigSchema> {
        Some(ConfigSchema::new().required("someValue", FieldKind::Number))
    }

    async fn on_start(&self) -> PluginResult {
        let config: ExampleConfig = self.context.typed_config()?;
        info!(some_value = config.some_value, "example plugin started");
        Ok(())
    }

    async fn on_stop(&self) -> PluginResult {
        info!(observed = self.observed(), "example plugin shutting down");
        Ok(())
    }

    async fn on_pending_tx(&self, tx: &Transaction, snapshot: &Snapshot) -> PluginResult {
        self.observe();
        info!(tx = %tx.id, height = snapshot.height, pool = snapshot.pending.len(), "pending tx");
        Ok(())
    }

    async fn on_confirmed_tx(&self, tx: &Transaction, snapshot: &Snapshot) -> PluginResult {
        self.observe();
        info!(tx = %tx.id, height = snapshot.height, "tx included in block");
        Ok(())
    }

    async fn on_dropped_tx(&self, tx: &Transaction, snapshot: &Snapshot) -> PluginResult {
        self.observe();
        warn!(
            tx = %tx.id,
            height = snapshot.height,
            "tx dropped from pool without being included in a block"
        );
        Ok(())
    }

    async fn on_new_block(&self, block: &Block, snapshot: &Snapshot) -> PluginResult {
        self.observe();
        info!(
            block = %block.id(),
            txs = block.transactions().len(),
            height = snapshot.height,
            "new block"
        );
        Ok(())
    }
}
