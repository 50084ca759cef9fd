//! Plugin registry and addressed-event dispatch. Stateless beyond the name
//! → plugin mapping; batch ordering and post-processing are owned by the
//! runtime's dispatch loop, which calls in here per event.

use console_plugin::{ConsolePlugin, PluginCx, PluginEvent};
use dashmap::DashMap;
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

use crate::error::RuntimeError;

#[derive(Default)]
pub struct PluginRegistry {
    plugins: DashMap<String, Box<dyn ConsolePlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a plugin under its name and returns that name. An unusable
    /// registration (empty name) is logged and dropped, never an error; a
    /// duplicate name silently replaces the earlier instance.
    pub fn register(&self, plugin: Box<dyn ConsolePlugin>) -> Option<String> {
        let name = plugin.name();
        if name.trim().is_empty() {
            warn!("rejecting plugin registration without a name");
            return None;
        }
        if self.plugins.insert(name.clone(), plugin).is_some() {
            debug!(plugin = %name, "plugin re-registered, previous instance replaced");
        }
        Some(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Registered names in deterministic order, for the `init` re-announce.
    pub fn names_sorted(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Delivers one addressed event. Returns whether a handler ran: an
    /// unregistered target is a diagnostic, not a failure, so the rest of
    /// the batch proceeds. A handler error is logged with the offending
    /// event and propagated.
    pub fn dispatch(
        &self,
        event: &PluginEvent,
        cx: &mut PluginCx,
    ) -> Result<bool, RuntimeError> {
        let Some(mut entry) = self.plugins.get_mut(&event.plugin) else {
            warn!(
                plugin = %event.plugin,
                method = %event.method,
                "dropping event for unregistered plugin"
            );
            return Ok(false);
        };
        match entry.handle_event(event, cx) {
            Ok(()) => Ok(true),
            Err(err) => {
                error!(
                    plugin = %event.plugin,
                    event = ?event,
                    "plugin handler failed: {err}"
                );
                Err(RuntimeError::Plugin {
                    plugin: event.plugin.clone(),
                    source: err,
                })
            }
        }
    }

    /// Runs `post_process` once for every plugin touched by the batch.
    pub fn post_process(&self, touched: &BTreeSet<String>, cx: &mut PluginCx) {
        for name in touched {
            if let Some(mut entry) = self.plugins.get_mut(name) {
                entry.post_process(cx);
            }
        }
    }

    /// Empties the registry, invoking each plugin's shutdown hook exactly
    /// once. Removal-before-invoke makes a second call a no-op.
    pub fn shutdown_all(&self) {
        for name in self.names_sorted() {
            if let Some((_, mut plugin)) = self.plugins.remove(&name) {
                plugin.shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPlugin;
    use serde_json::Map;

    fn addressed(plugin: &str, method: &str) -> PluginEvent {
        PluginEvent {
            plugin: plugin.into(),
            method: method.into(),
            payload: Map::new(),
        }
    }

    #[test]
    fn nameless_plugin_is_rejected_without_panic() {
        let registry = PluginRegistry::new();
        let rejected = RecordingPlugin::new("");
        assert_eq!(registry.register(Box::new(rejected)), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn unregistered_target_is_dropped_not_fatal() {
        let registry = PluginRegistry::new();
        let mut cx = PluginCx::new();
        let handled = registry.dispatch(&addressed("Ghost", "poke"), &mut cx).unwrap();
        assert!(!handled);
    }

    #[test]
    fn handler_error_propagates_after_logging() {
        let registry = PluginRegistry::new();
        let plugin = RecordingPlugin::new("Crashy").fail_on("boom");
        registry.register(Box::new(plugin)).unwrap();

        let mut cx = PluginCx::new();
        let err = registry
            .dispatch(&addressed("Crashy", "boom"), &mut cx)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Plugin { plugin, .. } if plugin == "Crashy"));
    }

    #[test]
    fn duplicate_name_replaces_earlier_instance() {
        let registry = PluginRegistry::new();
        let first = RecordingPlugin::new("Logs");
        let first_seen = first.seen_methods();
        registry.register(Box::new(first)).unwrap();

        let second = RecordingPlugin::new("Logs");
        let second_seen = second.seen_methods();
        registry.register(Box::new(second)).unwrap();

        let mut cx = PluginCx::new();
        registry.dispatch(&addressed("Logs", "tail"), &mut cx).unwrap();
        assert!(first_seen.lock().unwrap().is_empty());
        assert_eq!(second_seen.lock().unwrap().as_slice(), ["tail"]);
    }

    #[test]
    fn shutdown_all_runs_hooks_exactly_once() {
        let registry = PluginRegistry::new();
        let plugin = RecordingPlugin::new("Logs");
        let shutdowns = plugin.shutdown_count();
        registry.register(Box::new(plugin)).unwrap();

        registry.shutdown_all();
        registry.shutdown_all();
        assert_eq!(shutdowns.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }
}
