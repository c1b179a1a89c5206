// formwork-builder/src/prototype.rs
// ============================================================================
// Module: Prototype Documents
// Description: Loading of JSON/YAML prototype documents and widget imports.
// Purpose: Turn builder input paths into a validated prototype tree.
// Dependencies: serde_json, serde_yaml
// ============================================================================

//! ## Overview
//! A prototype input is either a `.json`/`.yml`/`.yaml` file or a directory
//! holding `index.json`. Files with other extensions parse to an empty
//! document. A widget whose value is the string `@import <path>` is loaded
//! from `<path>` relative to the input directory.
//! Invariants:
//! - `ConfigApp` is an object in every loaded prototype.
//! - `ConfigEnv` never redefines the `app`, `auth`, or `widgets` sections.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde_json::Map;
use serde_json::Value;

use crate::builder::BuildError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File loaded when the input is a directory.
pub const INDEX_FILE: &str = "index.json";
/// Marker of an imported widget definition.
pub const IMPORT_DIRECTIVE: &str = "@import";
/// Maximum prototype file size in bytes.
pub const MAX_PROTOTYPE_BYTES: u64 = 4 * 1024 * 1024;
/// `ConfigEnv` sections generated by the builder itself.
const RESERVED_ENV_SECTIONS: &[&str] = &["app", "auth", "widgets"];

// ============================================================================
// SECTION: Prototype
// ============================================================================

/// Loaded prototype document.
#[derive(Debug, Clone)]
pub struct Prototype {
    /// Directory that `@import` paths are relative to.
    pub base_dir: PathBuf,
    /// Parsed prototype file.
    pub file: PathBuf,
    /// Whole document.
    pub document: Map<String, Value>,
}

impl Prototype {
    /// Loads a prototype from a file or a directory with `index.json`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the input is missing, unreadable, or lacks
    /// a `ConfigApp` object.
    pub fn load(input: &Path) -> Result<Self, BuildError> {
        let (file, base_dir) = if input.is_dir() {
            (input.join(INDEX_FILE), input.to_path_buf())
        } else {
            let base = input.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            (input.to_path_buf(), base)
        };
        if !file.is_file() {
            return Err(BuildError::Prototype(format!("input file not found: {}", file.display())));
        }
        let document = match parse_prototype_file(&file)? {
            Value::Object(map) => map,
            _ => return Err(BuildError::Prototype("prototype must be an object".to_string())),
        };
        let prototype = Self {
            base_dir,
            file,
            document,
        };
        prototype.validate()?;
        Ok(prototype)
    }

    /// Checks the required sections.
    fn validate(&self) -> Result<(), BuildError> {
        if !self.document.get("ConfigApp").is_some_and(Value::is_object) {
            return Err(BuildError::Prototype(
                "ConfigApp is missing in prototype definition".to_string(),
            ));
        }
        match self.document.get("ConfigEnv") {
            None | Some(Value::Null) => {}
            Some(Value::Object(env)) => {
                if let Some(reserved) =
                    RESERVED_ENV_SECTIONS.iter().find(|section| env.contains_key(**section))
                {
                    return Err(BuildError::Prototype(format!(
                        "ConfigEnv must not define the {reserved} section"
                    )));
                }
            }
            Some(_) => {
                return Err(BuildError::Prototype("ConfigEnv must be an object".to_string()));
            }
        }
        match self.document.get("Widgets") {
            None | Some(Value::Null | Value::Object(_)) => Ok(()),
            Some(_) => Err(BuildError::Prototype("Widgets must be an object".to_string())),
        }
    }

    /// Sets a key of the `ConfigApp` section.
    pub fn set_app_value(&mut self, key: &str, value: Value) {
        if let Some(Value::Object(app)) = self.document.get_mut("ConfigApp") {
            app.insert(key.to_string(), value);
        }
    }

    /// Returns a top-level string value.
    #[must_use]
    pub fn string(&self, key: &str) -> Option<&str> {
        self.document.get(key).and_then(Value::as_str)
    }

    /// Returns widget definitions in document order.
    #[must_use]
    pub fn widgets(&self) -> Vec<(String, Value)> {
        match self.document.get("Widgets") {
            Some(Value::Object(widgets)) => {
                widgets.iter().map(|(name, config)| (name.clone(), config.clone())).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Resolves an `@import` directive; other values are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Prototype`] when the imported file is missing or
    /// fails to parse.
    pub fn resolve_import(&self, config: Value) -> Result<(Value, Option<PathBuf>), BuildError> {
        let Some(text) = config.as_str() else {
            return Ok((config, None));
        };
        if !text.contains(IMPORT_DIRECTIVE) {
            return Ok((config, None));
        }
        let relative = text.replace(IMPORT_DIRECTIVE, "");
        let path = self.base_dir.join(relative.trim());
        if !path.is_file() {
            return Err(BuildError::Prototype(format!("import not found: {}", path.display())));
        }
        Ok((parse_prototype_file(&path)?, Some(path)))
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a JSON or YAML file; other extensions yield an empty object.
///
/// # Errors
///
/// Returns [`BuildError`] when the file is unreadable, too large, or invalid.
pub fn parse_prototype_file(path: &Path) -> Result<Value, BuildError> {
    let metadata = fs::metadata(path).map_err(|err| BuildError::Io(err.to_string()))?;
    if metadata.len() > MAX_PROTOTYPE_BYTES {
        return Err(BuildError::Prototype(format!("{} exceeds size limit", path.display())));
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let content = fs::read_to_string(path).map_err(|err| BuildError::Io(err.to_string()))?;
    match extension.as_str() {
        "json" => serde_json::from_str(&content)
            .map_err(|err| BuildError::Prototype(format!("{}: {err}", path.display()))),
        "yml" | "yaml" => serde_yaml::from_str(&content)
            .map_err(|err| BuildError::Prototype(format!("{}: {err}", path.display()))),
        _ => Ok(Value::Object(Map::new())),
    }
}

/// Builds the nested enabled tree: `A/B` becomes `{A: {B: {enabled: true}}}`.
#[must_use]
pub fn enabled_tree<'a>(names: impl IntoIterator<Item = &'a str>) -> Value {
    let mut tree = Map::new();
    for name in names {
        let segments: Vec<&str> = name.split('/').collect();
        insert_enabled(&mut tree, &segments);
    }
    Value::Object(tree)
}

/// Marks the node at `segments` as enabled, creating parents on the way.
fn insert_enabled(node: &mut Map<String, Value>, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        node.insert("enabled".to_string(), Value::Bool(true));
        return;
    };
    let entry = node.entry((*head).to_string()).or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(child) = entry {
        insert_enabled(child, rest);
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

    #[test]
    fn enabled_tree_nests_widget_paths() {
        let tree = enabled_tree(["Crm/Customers", "Crm/Invoices", "Blog"]);
        assert_eq!(
            tree,
            json!({
                "Crm": {"Customers": {"enabled": true}, "Invoices": {"enabled": true}},
                "Blog": {"enabled": true}
            })
        );
    }

    #[test]
    fn unknown_extensions_parse_to_an_empty_prototype() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prototype.txt");
        fs::write(&path, "ConfigApp: {}").unwrap();
        assert_eq!(parse_prototype_file(&path).unwrap(), json!({}));
        let err = Prototype::load(&path).unwrap_err();
        assert!(err.to_string().contains("ConfigApp is missing"));
    }

    #[test]
    fn reserved_env_sections_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prototype.json");
        fs::write(&path, r#"{"ConfigApp": {}, "ConfigEnv": {"auth": {}}}"#).unwrap();
        let err = Prototype::load(&path).unwrap_err();
        assert!(err.to_string().contains("auth"));
    }
}
