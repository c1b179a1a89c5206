// formwork-core/src/runtime/plugins.rs
// ============================================================================
// Module: Formwork Plugins
// Description: Event hooks dispatched through registered plugins.
// Purpose: Let applications observe and rewrite render and record events.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Plugins receive named events with a JSON payload. Each plugin may pass the
//! payload on (possibly modified) or stop the chain. Plugins run in
//! registration order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Dispatched before a controller renders.
pub const EVENT_BEFORE_RENDER: &str = "onBeforeRender";
/// Dispatched after a record save cascade commits.
pub const EVENT_AFTER_RECORD_SAVE: &str = "onAfterRecordSave";
/// Dispatched after a record is deleted.
pub const EVENT_AFTER_RECORD_DELETE: &str = "onAfterRecordDelete";
/// Dispatched after tables are installed.
pub const EVENT_AFTER_INSTALL: &str = "onAfterInstall";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of a plugin handling an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Continue with the (possibly modified) payload.
    Continue(Value),
    /// Stop the chain with this payload.
    Stop(Value),
}

impl EventOutcome {
    /// Returns the payload.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Continue(value) | Self::Stop(value) => value,
        }
    }
}

/// Event hook.
pub trait Plugin: Send + Sync {
    /// Plugin name used in diagnostics.
    fn name(&self) -> &str;

    /// Handles an event.
    fn on_event(&self, event: &str, data: Value) -> EventOutcome;
}

// ============================================================================
// SECTION: Host
// ============================================================================

/// Ordered set of plugins.
#[derive(Clone, Default)]
pub struct PluginHost {
    /// Plugins in registration order.
    plugins: Vec<Arc<dyn Plugin>>,
}

impl fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.plugins.iter().map(|plugin| plugin.name()).collect();
        f.debug_struct("PluginHost").field("plugins", &names).finish()
    }
}

impl PluginHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Returns the number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true when no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Dispatches an event through the chain.
    #[must_use]
    pub fn dispatch(&self, event: &str, data: Value) -> EventOutcome {
        let mut current = data;
        for plugin in &self.plugins {
            match plugin.on_event(event, current) {
                EventOutcome::Continue(next) => current = next,
                EventOutcome::Stop(value) => return EventOutcome::Stop(value),
            }
        }
        EventOutcome::Continue(current)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Tagger(&'static str);

    impl Plugin for Tagger {
        fn name(&self) -> &str {
            self.0
        }

        fn on_event(&self, _event: &str, mut data: Value) -> EventOutcome {
            if let Some(tags) = data.get_mut("tags").and_then(Value::as_array_mut) {
                tags.push(json!(self.0));
            }
            EventOutcome::Continue(data)
        }
    }

    struct Stopper;

    impl Plugin for Stopper {
        fn name(&self) -> &str {
            "stopper"
        }

        fn on_event(&self, event: &str, data: Value) -> EventOutcome {
            if event == EVENT_BEFORE_RENDER { EventOutcome::Stop(data) } else { EventOutcome::Continue(data) }
        }
    }

    #[test]
    fn plugins_chain_in_order() {
        let mut host = PluginHost::new();
        host.register(Arc::new(Tagger("a")));
        host.register(Arc::new(Tagger("b")));
        let out = host.dispatch(EVENT_AFTER_INSTALL, json!({"tags": []}));
        assert_eq!(out, EventOutcome::Continue(json!({"tags": ["a", "b"]})));
    }

    #[test]
    fn stop_ends_the_chain() {
        let mut host = PluginHost::new();
        host.register(Arc::new(Tagger("a")));
        host.register(Arc::new(Stopper));
        host.register(Arc::new(Tagger("c")));
        let out = host.dispatch(EVENT_BEFORE_RENDER, json!({"tags": []}));
        assert_eq!(out, EventOutcome::Stop(json!({"tags": ["a"]})));
    }
}
