use std::collections::HashMap;
use std::sync::Arc;

use crate::plugin::{Plugin, PluginContext};

pub type PluginFactory = Arc<dyn Fn(PluginContext) -> Arc<dyn Plugin> + Send + Sync>;

/// Maps manifest plugin ids to constructors. Passed explicitly to the router.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(PluginContext) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
        self
    }

    pub fn build(&self, context: PluginContext) -> Option<Arc<dyn Plugin>> {
        self.factories
            .get(&context.id)
            .map(|factory| factory(context))
    }
}
