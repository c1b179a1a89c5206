// formwork-core/src/core/settings.rs
// ============================================================================
// Module: Formwork Settings Tree
// Description: Nested runtime settings addressed by slash-separated paths.
// Purpose: Convert between the in-memory settings tree and flat stored rows.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Settings live in memory as one nested JSON object and are persisted as
//! flat `(path, json)` rows, one per leaf. [`SettingsTree::from_rows`]
//! rebuilds the tree; [`flatten`] turns a nested value back into rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Flat settings row: path and leaf value.
pub type SettingsRow = (String, Value);

/// Nested settings object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsTree {
    /// Root object.
    root: Map<String, Value>,
}

impl SettingsTree {
    /// Creates a tree from a root object.
    #[must_use]
    pub const fn new(root: Map<String, Value>) -> Self {
        Self {
            root,
        }
    }

    /// Builds a tree from flat rows. Later rows win.
    #[must_use]
    pub fn from_rows(rows: impl IntoIterator<Item = SettingsRow>) -> Self {
        let mut tree = Self::default();
        for (path, value) in rows {
            tree.set(&path, value);
        }
        tree
    }

    /// Returns the root object.
    #[must_use]
    pub const fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Returns the value at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = split_path(path);
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns the string at `path`.
    #[must_use]
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Sets the value at `path`, creating intermediate objects.
    ///
    /// Non-object intermediates are replaced by objects.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = split_path(path).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut current = &mut self.root;
        for segment in parents {
            let entry =
                current.entry((*segment).to_string()).or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(next) = entry else {
                return;
            };
            current = next;
        }
        current.insert((*last).to_string(), value);
    }

    /// Removes and returns the value at `path`.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments: Vec<&str> = split_path(path).collect();
        let (last, parents) = segments.split_last()?;
        let mut current = &mut self.root;
        for segment in parents {
            current = current.get_mut(*segment)?.as_object_mut()?;
        }
        current.remove(*last)
    }

    /// Consumes the tree and returns its root as a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }
}

// ============================================================================
// SECTION: Flattening
// ============================================================================

/// Flattens a nested value into leaf rows under `prefix`.
///
/// Empty objects produce no rows; arrays are leaves.
#[must_use]
pub fn flatten(prefix: &str, value: &Value) -> Vec<SettingsRow> {
    let mut rows = Vec::new();
    flatten_into(prefix.trim_matches('/'), value, &mut rows);
    rows
}

/// Recursive worker for [`flatten`].
fn flatten_into(prefix: &str, value: &Value, rows: &mut Vec<SettingsRow>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path =
                    if prefix.is_empty() { key.clone() } else { format!("{prefix}/{key}") };
                flatten_into(&path, child, rows);
            }
        }
        leaf => rows.push((prefix.to_string(), leaf.clone())),
    }
}

/// Returns true when `path` equals `prefix` or lies below it.
#[must_use]
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_matches('/');
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// Splits a path into non-empty segments.
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut tree = SettingsTree::default();
        tree.set("dashboard/preset", json!(2));
        tree.set("widgets/Crm/enabled", json!(true));
        assert_eq!(tree.get("dashboard/preset"), Some(&json!(2)));
        assert_eq!(tree.get("widgets/Crm"), Some(&json!({"enabled": true})));
    }

    #[test]
    fn set_replaces_scalar_intermediates() {
        let mut tree = SettingsTree::default();
        tree.set("a", json!(1));
        tree.set("a/b", json!(2));
        assert_eq!(tree.get("a/b"), Some(&json!(2)));
    }

    #[test]
    fn remove_returns_subtree() {
        let mut tree = SettingsTree::from_rows(vec![
            ("a/b".to_string(), json!(1)),
            ("a/c".to_string(), json!(2)),
        ]);
        assert_eq!(tree.remove("a/b"), Some(json!(1)));
        assert_eq!(tree.get("a"), Some(&json!({"c": 2})));
        assert_eq!(tree.remove("missing/path"), None);
    }

    #[test]
    fn flatten_emits_leaf_rows() {
        let rows = flatten("/app/", &json!({"name": "x", "nested": {"n": [1, 2]}, "empty": {}}));
        assert_eq!(
            rows,
            vec![
                ("app/name".to_string(), json!("x")),
                ("app/nested/n".to_string(), json!([1, 2])),
            ]
        );
    }

    #[test]
    fn prefix_matching_respects_segments() {
        assert!(path_has_prefix("a/b", "a"));
        assert!(path_has_prefix("a", "a/"));
        assert!(!path_has_prefix("ab/c", "a"));
    }
}
