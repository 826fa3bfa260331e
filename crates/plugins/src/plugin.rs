use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use ledgerwatch_domain::model::{Block, Snapshot, Transaction};
use ledgerwatch_domain::source::{LedgerFacade, SourceError};

use crate::schema::{ConfigSchema, SchemaError};

pub type PluginResult = Result<(), PluginError>;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("invalid plugin configuration: {0}")]
    Config(#[from] SchemaError),
    #[error("ledger call failed: {0}")]
    Ledger(#[from] SourceError),
    #[error("{0}")]
    Runtime(String),
    #[error("plugin panicked: {0}")]
    Panicked(String),
}

impl PluginError {
    pub fn runtime(cause: impl std::fmt::Display) -> Self {
        Self::Runtime(cause.to_string())
    }
}

/// Human facing metadata about a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// Semantic version.
    pub version: &'static str,
}

/// Everything a factory gets to build a plugin instance.
#[derive(Clone)]
pub struct PluginContext {
    pub id: String,
    pub config: Value,
    pub ledger: Arc<dyn LedgerFacade>,
}

impl PluginContext {
    /// Deserializes the manifest `config` block into the plugin's settings.
    pub fn typed_config<T: DeserializeOwned>(&self) -> Result<T, PluginError> {
        serde_json::from_value(self.config.clone())
            .map_err(|err| PluginError::Config(SchemaError::Decode(err.to_string())))
    }
}

/// Unit of user logic driven by the router. Every callback defaults to a
/// no-op, so plugins only implement what they care about.
///
/// Callbacks take `&self` because the router may run them on separate tasks;
/// plugins with mutable state keep it behind their own locks.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> PluginDescriptor;

    fn config_schema(&self) -> Option<ConfigSchema> {
        None
    }

    fn validate_config(&self, config: &Value) -> Result<(), SchemaError> {
        match self.config_schema() {
            Some(schema) => schema.validate(config),
            None => Ok(()),
        }
    }

    async fn on_start(&self) -> PluginResult {
        Ok(())
    }

    async fn on_stop(&self) -> PluginResult {
        Ok(())
    }

    async fn on_pending_tx(&self, _tx: &Transaction, _snapshot: &Snapshot) -> PluginResult {
        Ok(())
    }

    async fn on_dropped_tx(&self, _tx: &Transaction, _snapshot: &Snapshot) -> PluginResult {
        Ok(())
    }

    async fn on_confirmed_tx(&self, _tx: &Transaction, _snapshot: &Snapshot) -> PluginResult {
        Ok(())
    }

    async fn on_new_block(&self, _block: &Block, _snapshot: &Snapshot) -> PluginResult {
        Ok(())
    }
}
