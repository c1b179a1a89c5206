// formwork-builder/src/templates.rs
// ============================================================================
// Module: Builder Templates
// Description: Embedded minijinja templates, static assets, and filters.
// Purpose: Render generated application files from prototype data.
// Dependencies: minijinja, serde_json, time, toml
// ============================================================================

//! ## Overview
//! Templates are compiled into the binary. Output is never auto-escaped;
//! HTML templates escape prototype text explicitly with `e`. Runtime view
//! syntax inside generated views is wrapped in `raw` blocks.
//!
//! Filters:
//! - `toml`: serializes a table, dropping nulls and placing tables last.
//! - `json`: compact JSON text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use minijinja::AutoEscape;
use minijinja::Environment;
use minijinja::Error;
use minijinja::ErrorKind;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::builder::BuildError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Marker that allows a generated file to be overwritten.
pub const REGENERATE_ALLOWED_TAG: &str = "# formworkBuilderRegenerateAllowed";

/// Application configuration template.
pub const CONFIG_TEMPLATE: &str = "formwork.toml";
/// Desktop layout template.
pub const DESKTOP_TEMPLATE: &str = "Views/Desktop.html";
/// Sign-in view template.
pub const SIGN_IN_TEMPLATE: &str = "Views/SignIn.html";
/// Widget manifest template.
pub const WIDGET_TEMPLATE: &str = "widget.toml";
/// Model definition template.
pub const MODEL_TEMPLATE: &str = "Model.toml";
/// Verbatim action view template.
pub const VERBATIM_VIEW_TEMPLATE: &str = "actions/View.html";
/// Action view templates selectable through an action `template` key.
pub const ACTION_TEMPLATES: &[&str] = &["Table", "Form", "Dashboard", "Blank"];

/// Embedded templates by name.
const TEMPLATES: &[(&str, &str)] = &[
    (CONFIG_TEMPLATE, include_str!("../templates/formwork.toml.j2")),
    (DESKTOP_TEMPLATE, include_str!("../templates/Desktop.html.j2")),
    (SIGN_IN_TEMPLATE, include_str!("../templates/SignIn.html.j2")),
    (WIDGET_TEMPLATE, include_str!("../templates/widget.toml.j2")),
    (MODEL_TEMPLATE, include_str!("../templates/Model.toml.j2")),
    ("actions/Table.html", include_str!("../templates/actions/Table.html.j2")),
    ("actions/Form.html", include_str!("../templates/actions/Form.html.j2")),
    ("actions/Dashboard.html", include_str!("../templates/actions/Dashboard.html.j2")),
    ("actions/Blank.html", include_str!("../templates/actions/Blank.html.j2")),
    (VERBATIM_VIEW_TEMPLATE, include_str!("../templates/actions/View.html.j2")),
];

/// Static files copied into every build, by output path.
pub const STATIC_FILES: &[(&str, &str)] = &[
    ("src/Assets/app.css", include_str!("../assets/app.css")),
    ("src/Assets/images/logo.svg", include_str!("../assets/logo.svg")),
    ("log/.gitkeep", ""),
    ("tmp/.gitkeep", ""),
    ("upload/.gitkeep", ""),
];

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Template engine with every embedded template loaded.
pub struct TemplateEngine {
    /// Configured environment.
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Compiles the embedded templates.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Template`] when a template fails to compile.
    pub fn new() -> Result<Self, BuildError> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_trim_blocks(true);
        env.set_keep_trailing_newline(true);
        env.add_filter("toml", toml_filter);
        env.add_filter("json", json_filter);
        for (name, source) in TEMPLATES.iter().copied() {
            env.add_template(name, source)
                .map_err(|err| BuildError::Template(format!("{name}: {err}")))?;
        }
        Ok(Self {
            env,
        })
    }

    /// Renders one template.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Template`] when the template is unknown or fails.
    pub fn render(&self, name: &str, context: &Value) -> Result<String, BuildError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|err| BuildError::Template(format!("{name}: {err}")))?;
        template.render(context).map_err(|err| BuildError::Template(format!("{name}: {err}")))
    }
}

/// Returns the template name of an action template key.
#[must_use]
pub fn action_template(key: &str) -> Option<String> {
    ACTION_TEMPLATES.contains(&key).then(|| format!("actions/{key}.html"))
}

/// Header comments carrying the generation date and the regenerate tag.
#[must_use]
pub fn builder_info(now: OffsetDateTime) -> Value {
    let stamp = now
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_default();
    let toml_header = format!(
        "# This file was generated by the Formwork builder on {stamp}.\n#\n# To keep your \
         changes on the next build, delete the following tag:\n#\n{REGENERATE_ALLOWED_TAG}"
    );
    let html_header = format!(
        "<!--\n  This file was generated by the Formwork builder on {stamp}.\n\n  To keep your \
         changes on the next build, delete the following tag:\n\n  {REGENERATE_ALLOWED_TAG}\n-->"
    );
    json!({"toml": toml_header, "html": html_header})
}

// ============================================================================
// SECTION: Filters
// ============================================================================

/// Serializes a table to TOML text.
fn toml_filter(value: minijinja::Value) -> Result<String, Error> {
    let json = serde_json::to_value(&value)
        .map_err(|err| Error::new(ErrorKind::InvalidOperation, format!("toml filter: {err}")))?;
    let Value::Object(table) = toml_ready(json) else {
        return Err(Error::new(ErrorKind::InvalidOperation, "toml filter expects a table"));
    };
    toml::to_string(&table)
        .map_err(|err| Error::new(ErrorKind::InvalidOperation, format!("toml filter: {err}")))
}

/// Serializes a value to compact JSON text.
fn json_filter(value: minijinja::Value) -> Result<String, Error> {
    serde_json::to_string(&value)
        .map_err(|err| Error::new(ErrorKind::InvalidOperation, format!("json filter: {err}")))
}

/// Drops nulls and orders plain values before tables.
fn toml_ready(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut plain = Map::new();
            let mut tables = Map::new();
            for (key, item) in map {
                if item.is_null() {
                    continue;
                }
                let item = toml_ready(item);
                if is_table_like(&item) {
                    tables.insert(key, item);
                } else {
                    plain.insert(key, item);
                }
            }
            plain.extend(tables);
            Value::Object(plain)
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().filter(|item| !item.is_null()).map(toml_ready).collect())
        }
        other => other,
    }
}

/// Returns true for values TOML writes as tables or arrays of tables.
fn is_table_like(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => !items.is_empty() && items.iter().all(Value::is_object),
        _ => false,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn toml_filter_drops_nulls_and_orders_tables_last() {
        let engine = TemplateEngine::new().unwrap();
        let out = engine
            .render(
                MODEL_TEMPLATE,
                &json!({
                    "builder_info": {"toml": "# header"},
                    "model": {
                        "columns": [{"name": "name", "type": "varchar"}],
                        "name": "Crm/Customer",
                        "title": null,
                        "table": "crm_customer"
                    }
                }),
            )
            .unwrap();
        let parsed: toml::Table = toml::from_str(&out).unwrap();
        assert_eq!(parsed["name"].as_str(), Some("Crm/Customer"));
        assert!(!parsed.contains_key("title"));
        assert!(out.find("table =").unwrap() < out.find("[[columns]]").unwrap());
        assert!(out.starts_with("# header"));
    }

    #[test]
    fn builder_info_carries_the_tag() {
        let info = builder_info(OffsetDateTime::UNIX_EPOCH);
        let toml = info["toml"].as_str().unwrap();
        assert!(toml.contains("1970-01-01 00:00:00"));
        assert!(toml.contains(REGENERATE_ALLOWED_TAG));
        assert!(info["html"].as_str().unwrap().contains(REGENERATE_ALLOWED_TAG));
    }

    #[test]
    fn generated_views_keep_runtime_syntax() {
        let engine = TemplateEngine::new().unwrap();
        let out = engine
            .render(
                "actions/Table.html",
                &json!({
                    "builder_info": {"html": "<!-- h -->"},
                    "widget": {"name": "Crm/Customers"},
                    "action": {"name": "Table", "config": {"title": "A & B"}}
                }),
            )
            .unwrap();
        assert!(out.contains("<h1>A &amp; B</h1>"));
        assert!(out.contains("{{ viewParams.model }}"));
        assert!(out.contains("{% for name, column in viewParams.table.columns | items %}"));
        assert_eq!(action_template("Form").as_deref(), Some("actions/Form.html"));
        assert_eq!(action_template("Missing"), None);
    }
}
