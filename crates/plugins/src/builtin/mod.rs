//! Plugins shipped with the binary.

mod example;

pub use example::{ExampleConfig, ExamplePlugin, EXAMPLE_PLUGIN_ID};

use crate::registry::PluginRegistry;

/// Registry holding every built-in plugin.
pub fn builtin_registry() -> PluginRegistry {
    PluginRegistry::new().register(EXAMPLE_PLUGIN_ID, ExamplePlugin::factory)
}
