// formwork-core/src/runtime/settings.rs
// ============================================================================
// Module: Formwork Settings Service
// Description: Persisted runtime settings kept in sync with the in-memory tree.
// Purpose: Apply settings changes to the store and the live settings tree together.
// Dependencies: crate::core, crate::interfaces, crate::runtime::audit
// ============================================================================

//! ## Overview
//! The application holds one [`SettingsTree`] behind a lock, loaded from the
//! settings store at startup. [`SettingsService::save`] writes through: a
//! `null` value deletes the path and everything below it, any other value
//! replaces the subtree at that path, persisted as one row per leaf.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::RwLock;

use serde_json::Value;

use crate::core::SettingsTree;
use crate::core::settings::flatten;
use crate::interfaces::SettingsStore;
use crate::interfaces::StoreError;
use crate::runtime::audit::AuditEvent;
use crate::runtime::audit::AuditSink;

// ============================================================================
// SECTION: Service
// ============================================================================

/// Write-through settings access.
pub struct SettingsService<'a> {
    /// Persistent rows.
    store: &'a dyn SettingsStore,
    /// Live tree.
    tree: &'a RwLock<SettingsTree>,
    /// Audit sink.
    audit: &'a dyn AuditSink,
}

impl<'a> SettingsService<'a> {
    /// Creates a service.
    #[must_use]
    pub fn new(
        store: &'a dyn SettingsStore,
        tree: &'a RwLock<SettingsTree>,
        audit: &'a dyn AuditSink,
    ) -> Self {
        Self {
            store,
            tree,
            audit,
        }
    }

    /// Returns the value at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        self.tree.read().ok().and_then(|tree| tree.get(path).cloned())
    }

    /// Returns a copy of the whole tree.
    #[must_use]
    pub fn snapshot(&self) -> SettingsTree {
        self.tree.read().map(|tree| tree.clone()).unwrap_or_default()
    }

    /// Saves or deletes a value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store rejects the change or the lock
    /// is poisoned.
    pub fn save(&self, path: &str, value: &Value, user: Option<&str>) -> Result<(), StoreError> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Err(StoreError::Invalid("settings path must be non-empty".to_string()));
        }
        let mut tree =
            self.tree.write().map_err(|_| StoreError::Store("settings lock poisoned".to_string()))?;
        self.store.delete_settings_prefix(path)?;
        if value.is_null() {
            tree.remove(path);
        } else {
            self.store.upsert_settings(&flatten(path, value))?;
            tree.set(path, value.clone());
        }
        self.audit.record(&AuditEvent::settings_set(path, value.is_null(), user));
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::*;
    use crate::runtime::audit::MemoryAuditSink;
    use crate::runtime::store::InMemoryRecordStore;

    #[test]
    fn save_replaces_subtree_and_persists_leaves() {
        let store = InMemoryRecordStore::new();
        let tree = RwLock::new(SettingsTree::default());
        let audit = MemoryAuditSink::new();
        let service = SettingsService::new(&store, &tree, &audit);
        service.save("app/theme", &json!({"color": "red", "size": 2}), None).unwrap();
        service.save("app/theme", &json!({"color": "blue"}), Some("1")).unwrap();
        assert_eq!(service.get("app/theme"), Some(json!({"color": "blue"})));
        let rebuilt = SettingsTree::from_rows(store.load_settings().unwrap());
        assert_eq!(rebuilt.get("app/theme"), Some(&json!({"color": "blue"})));
        assert_eq!(audit.event_names(), vec!["settings_set", "settings_set"]);
    }

    #[test]
    fn null_deletes_by_prefix() {
        let store = InMemoryRecordStore::new();
        let tree = RwLock::new(SettingsTree::default());
        let audit = MemoryAuditSink::new();
        let service = SettingsService::new(&store, &tree, &audit);
        service.save("a/b", &json!(1), None).unwrap();
        service.save("a", &Value::Null, None).unwrap();
        assert_eq!(service.get("a"), None);
        assert!(store.load_settings().unwrap().is_empty());
        assert!(service.save("/", &json!(1), None).is_err());
    }
}
