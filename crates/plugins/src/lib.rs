//! Plugin contract, configuration schemas and the router that owns plugin
//! lifecycles and fans monitor events out to running plugins.

pub mod builtin;
pub mod plugin;
pub mod registry;
pub mod router;
pub mod schema;

#[cfg(test)]
mod tests;

pub use builtin::builtin_registry;
pub use plugin::{Plugin, PluginContext, PluginDescriptor, PluginError, PluginResult};
pub use registry::{PluginFactory, PluginRegistry};
pub use router::{ManagedPlugin, PluginRouter, PluginState, RouterError};
pub use schema::{ConfigSchema, FieldKind, SchemaError};
