// formwork-core/src/runtime/widgets.rs
// ============================================================================
// Module: Formwork Widgets
// Description: Enabled-widget discovery, widget manifests, and model loading.
// Purpose: Turn the configured widget tree into routes and model specs.
// Dependencies: crate::core, crate::runtime::routing, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Widgets are enabled through a nested tree (`{Crm: {Customers: {enabled:
//! true}}}`). A node with `enabled = true` is a widget whose path is the
//! chain of keys leading to it; other object nodes are walked further. Each
//! widget directory holds a `widget.toml` manifest and a `Models/` folder of
//! model definitions loaded in file-name order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::ModelFormat;
use crate::core::ModelSpec;
use crate::core::identifiers::is_valid_path_name;
use crate::runtime::routing::RouteSpec;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Manifest file name inside a widget directory.
pub const MANIFEST_FILE: &str = "widget.toml";
/// Model folder inside a widget directory.
pub const MODELS_DIR: &str = "Models";
/// View folder inside a widget directory.
pub const VIEWS_DIR: &str = "Views";
/// Maximum manifest size.
const MAX_MANIFEST_BYTES: u64 = 256 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Widget loading errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WidgetError {
    /// Widget name is not a safe path.
    #[error("invalid widget name: {0}")]
    InvalidName(String),
    /// Widget directory or manifest is unreadable.
    #[error("widget io error: {0}")]
    Io(String),
    /// Manifest failed to parse.
    #[error("widget manifest invalid: {0}")]
    Manifest(String),
    /// A model file failed to load.
    #[error("widget model invalid: {0}")]
    Model(String),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Widget manifest (`widget.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WidgetManifest {
    /// Widget name; defaults to the widget path.
    #[serde(default)]
    pub name: String,
    /// Human title.
    #[serde(default)]
    pub title: Option<String>,
    /// Icon identifier for the desktop menu.
    #[serde(default)]
    pub icon: Option<String>,
    /// Routes contributed by the widget.
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    /// Model file stems to load; empty loads every file in `Models/`.
    #[serde(default)]
    pub models: Vec<String>,
}

/// Loaded widget with its models.
#[derive(Debug, Clone)]
pub struct LoadedWidget {
    /// Widget path (`Crm/Customers`).
    pub path: String,
    /// Widget directory.
    pub dir: PathBuf,
    /// Manifest.
    pub manifest: WidgetManifest,
    /// Models in file-name order.
    pub models: Vec<ModelSpec>,
}

// ============================================================================
// SECTION: Discovery
// ============================================================================

/// Lists enabled widget paths in tree order.
#[must_use]
pub fn enabled_widgets(tree: &Value) -> Vec<String> {
    let mut out = Vec::new();
    if let Value::Object(map) = tree {
        for (key, child) in map {
            walk_widget_tree(key, child, &mut out);
        }
    }
    out
}

/// Recursive worker for [`enabled_widgets`].
fn walk_widget_tree(path: &str, node: &Value, out: &mut Vec<String>) {
    let Value::Object(map) = node else {
        return;
    };
    if map.get("enabled").is_some_and(|flag| flag.as_bool() == Some(true)) {
        out.push(path.to_string());
        return;
    }
    for (key, child) in map {
        if key != "enabled" {
            walk_widget_tree(&format!("{path}/{key}"), child, out);
        }
    }
}

// ============================================================================
// SECTION: Loader
// ============================================================================

/// Loads widgets from a widgets directory.
#[derive(Debug, Clone)]
pub struct WidgetLoader {
    /// Root directory holding widget folders.
    widgets_dir: PathBuf,
}

impl WidgetLoader {
    /// Creates a loader rooted at `widgets_dir`.
    #[must_use]
    pub fn new(widgets_dir: impl Into<PathBuf>) -> Self {
        Self {
            widgets_dir: widgets_dir.into(),
        }
    }

    /// Loads one widget by path.
    ///
    /// A missing manifest yields an empty one.
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError`] when the name is unsafe or a file fails to load.
    pub fn load(&self, name: &str) -> Result<LoadedWidget, WidgetError> {
        if !is_valid_path_name(name) {
            return Err(WidgetError::InvalidName(name.to_string()));
        }
        let dir = self.widgets_dir.join(name);
        let mut manifest = load_manifest(&dir.join(MANIFEST_FILE))?;
        if manifest.name.is_empty() {
            manifest.name = name.to_string();
        }
        let models = load_models(&dir.join(MODELS_DIR), &manifest.models)?;
        Ok(LoadedWidget {
            path: name.to_string(),
            dir,
            manifest,
            models,
        })
    }
}

/// Reads a manifest file.
fn load_manifest(path: &Path) -> Result<WidgetManifest, WidgetError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(WidgetManifest::default());
        }
        Err(err) => return Err(WidgetError::Io(err.to_string())),
    };
    if metadata.len() > MAX_MANIFEST_BYTES {
        return Err(WidgetError::Manifest(format!("{} exceeds size limit", path.display())));
    }
    let content = fs::read_to_string(path).map_err(|err| WidgetError::Io(err.to_string()))?;
    toml::from_str(&content)
        .map_err(|err| WidgetError::Manifest(format!("{}: {err}", path.display())))
}

/// Loads model files from a `Models/` directory in file-name order.
fn load_models(dir: &Path, only: &[String]) -> Result<Vec<ModelSpec>, WidgetError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(WidgetError::Io(err.to_string())),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| WidgetError::Io(err.to_string()))?.path();
        if !path.is_file() || ModelFormat::from_path(&path).is_none() {
            continue;
        }
        let stem = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default();
        if only.is_empty() || only.iter().any(|wanted| wanted == stem) {
            files.push(path);
        }
    }
    files.sort();
    files
        .iter()
        .map(|path| ModelSpec::load(path).map_err(|err| WidgetError::Model(err.to_string())))
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::*;

    #[test]
    fn enabled_widgets_walk_nested_tree() {
        let tree = json!({
            "Crm": {"Customers": {"enabled": true}, "Invoices": {"enabled": false}},
            "Blog": {"enabled": true, "Extra": {"enabled": true}},
            "Off": 1
        });
        assert_eq!(enabled_widgets(&tree), vec!["Crm/Customers", "Blog"]);
    }

    #[test]
    fn loader_reads_manifest_and_sorted_models() {
        let dir = tempfile::tempdir().unwrap();
        let widget = dir.path().join("Crm/Customers");
        fs::create_dir_all(widget.join(MODELS_DIR)).unwrap();
        fs::write(
            widget.join(MANIFEST_FILE),
            "title = \"Customers\"\n[[routes]]\npattern = \"^customers/?$\"\ncontroller = \"ModelView\"\nparams = { model = \"Crm/Customer\" }\n",
        )
        .unwrap();
        fs::write(
            widget.join("Models/B.toml"),
            "name = \"Crm/B\"\ntable = \"b\"\n[[columns]]\nname = \"label\"\ntype = \"varchar\"\n",
        )
        .unwrap();
        fs::write(widget.join("Models/A.json"), r#"{"name": "Crm/A", "table": "a"}"#).unwrap();
        fs::write(widget.join("Models/notes.txt"), "ignored").unwrap();
        let loaded = WidgetLoader::new(dir.path()).load("Crm/Customers").unwrap();
        assert_eq!(loaded.manifest.name, "Crm/Customers");
        assert_eq!(loaded.manifest.routes.len(), 1);
        let names: Vec<&str> = loaded.models.iter().map(|model| model.name.as_str()).collect();
        assert_eq!(names, vec!["Crm/A", "Crm/B"]);
    }

    #[test]
    fn loader_rejects_traversal() {
        let loader = WidgetLoader::new("/tmp");
        assert!(matches!(loader.load("../etc"), Err(WidgetError::InvalidName(_))));
    }
}
