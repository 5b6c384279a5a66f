use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use shared::{
    error::{PluginError, RegistryError},
    protocol::Command,
};

use crate::{bus::CommandBus, panels::PanelStore};

/// Verbs the dispatcher answers itself; no plugin may claim them.
pub const RESERVED_VERBS: [&str; 3] = ["q", "quit", "exit"];

/// What a handler can see while it runs.
pub struct PluginContext<'a> {
    pub command: &'a Command,
    pub registry: &'a PluginRegistry,
    pub panels: &'a PanelStore,
    /// For follow-up commands; results of those are not observed.
    pub bus: &'a CommandBus,
}

/// A named command handler.
///
/// `invoke` receives every token after the namespace and returns the lines
/// that become the plugin's panel content.
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn invoke(
        &self,
        ctx: &PluginContext<'_>,
        args: &[String],
    ) -> Result<Vec<String>, PluginError>;

    fn describe(&self) -> &str {
        ""
    }
}

#[async_trait]
impl<F> Plugin for F
where
    F: Fn(&[String]) -> Result<Vec<String>, PluginError> + Send + Sync + 'static,
{
    async fn invoke(
        &self,
        _ctx: &PluginContext<'_>,
        args: &[String],
    ) -> Result<Vec<String>, PluginError> {
        self(args)
    }
}

/// Pins a closure to the handler signature so it can be registered directly.
pub fn plugin_fn<F>(f: F) -> F
where
    F: Fn(&[String]) -> Result<Vec<String>, PluginError> + Send + Sync + 'static,
{
    f
}

/// Collects plugins during startup. Consumed by [`build`](Self::build).
#[derive(Default)]
pub struct PluginRegistryBuilder {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P>(&mut self, name: impl Into<String>, plugin: P) -> Result<(), RegistryError>
    where
        P: Plugin + 'static,
    {
        self.register_arc(name, Arc::new(plugin))
    }

    pub fn register_arc(
        &mut self,
        name: impl Into<String>,
        plugin: Arc<dyn Plugin>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty()
            || name.contains(char::is_whitespace)
            || RESERVED_VERBS.contains(&name.as_str())
        {
            return Err(RegistryError::InvalidName(name));
        }
        if self.plugins.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        tracing::debug!(plugin = %name, "registered plugin");
        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn build(self) -> PluginRegistry {
        PluginRegistry {
            plugins: Arc::new(self.plugins),
        }
    }
}

/// Frozen name → plugin map. Lookups take no locks.
#[derive(Clone)]
pub struct PluginRegistry {
    plugins: Arc<BTreeMap<String, Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::new()
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn describe(&self, name: &str) -> Option<&str> {
        self.plugins.get(name).map(|plugin| plugin.describe())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
