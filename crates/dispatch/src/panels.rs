use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use shared::protocol::PanelState;

use crate::registry::PluginRegistry;

/// Latest output per plugin.
///
/// Written only by the dispatcher; read by any number of renderers. Each
/// update swaps the whole line vector under the entry's lock, so a reader
/// sees either the previous invocation's lines or the new ones.
#[derive(Debug, Clone, Default)]
pub struct PanelStore {
    panels: Arc<DashMap<String, PanelState>>,
}

impl PanelStore {
    pub fn for_registry(registry: &PluginRegistry) -> Self {
        let store = Self::default();
        for name in registry.names() {
            store
                .panels
                .insert(name.to_string(), PanelState::new(name));
        }
        store
    }

    pub fn get(&self, plugin_name: &str) -> Option<PanelState> {
        self.panels.get(plugin_name).map(|entry| entry.value().clone())
    }

    pub(crate) fn update(&self, plugin_name: &str, lines: Vec<String>) -> bool {
        let Some(mut entry) = self.panels.get_mut(plugin_name) else {
            return false;
        };
        let panel = entry.value_mut();
        panel.rendered_lines = lines;
        panel.dirty = true;
        panel.updated_at = Utc::now();
        true
    }

    pub fn mark_clean(&self, plugin_name: &str) -> bool {
        match self.panels.get_mut(plugin_name) {
            Some(mut entry) => {
                entry.value_mut().dirty = false;
                true
            }
            None => false,
        }
    }

    /// Returns the panel if it is dirty and clears the flag in the same step,
    /// so an update landing between read and clear is never lost.
    pub fn take_dirty(&self, plugin_name: &str) -> Option<PanelState> {
        let mut entry = self.panels.get_mut(plugin_name)?;
        let panel = entry.value_mut();
        if !panel.dirty {
            return None;
        }
        let snapshot = panel.clone();
        panel.dirty = false;
        Some(snapshot)
    }

    /// [`take_dirty`](Self::take_dirty) over every panel, sorted by name.
    pub fn drain_dirty(&self) -> Vec<PanelState> {
        self.names()
            .iter()
            .filter_map(|name| self.take_dirty(name))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.panels.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn snapshot(&self) -> Vec<PanelState> {
        self.names()
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/panels_tests.rs"]
mod tests;
