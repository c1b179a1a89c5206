// formwork-builder/src/builder.rs
// ============================================================================
// Module: Prototype Builder
// Description: Scaffolds an application directory from a prototype document.
// Purpose: Generate configuration, views, widgets, and models in one pass.
// Dependencies: formwork-core, rand, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! [`Builder::build`] runs the build steps in order: clean the generated
//! folders, create the folder layout, copy static files, render
//! `formwork.toml`, render the desktop and sign-in views, then render every
//! widget with its manifest, models, and action views. Each step is written
//! to the build log.
//! Invariants:
//! - An existing file is overwritten only when it carries the regenerate tag.
//! - Generated model files parse as model definitions.
//! - Widget and action names are slash paths of `[A-Za-z0-9_]` segments.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use formwork_core::ModelFormat;
use formwork_core::ModelSpec;
use formwork_core::RoleName;
use formwork_core::core::identifiers::is_valid_path_name;
use rand::Rng;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use time::OffsetDateTime;

use crate::prototype::Prototype;
use crate::prototype::enabled_tree;
use crate::templates::CONFIG_TEMPLATE;
use crate::templates::DESKTOP_TEMPLATE;
use crate::templates::MODEL_TEMPLATE;
use crate::templates::REGENERATE_ALLOWED_TAG;
use crate::templates::SIGN_IN_TEMPLATE;
use crate::templates::STATIC_FILES;
use crate::templates::TemplateEngine;
use crate::templates::VERBATIM_VIEW_TEMPLATE;
use crate::templates::WIDGET_TEMPLATE;
use crate::templates::action_template;
use crate::templates::builder_info;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Folders removed before every build.
const CLEANED_FOLDERS: &[&str] = &["src/Widgets", "log", "tmp", "upload"];
/// Folders created by every build.
const CREATED_FOLDERS: &[&str] = &[
    "src",
    "src/Assets",
    "src/Assets/images",
    "src/Views",
    "src/Lang",
    "src/Widgets",
    "log",
    "tmp",
    "upload",
];
/// Generated widget root.
const WIDGETS_DIR: &str = "src/Widgets";
/// Action view template used when an action names none.
const DEFAULT_ACTION_TEMPLATE: &str = "Blank";
/// Controller of model-bound actions.
const MODEL_CONTROLLER: &str = "ModelView";
/// Controller of other actions.
const PAGE_CONTROLLER: &str = "Dashboard";
/// Action keys consumed by the builder.
const ACTION_BUILDER_KEYS: &[&str] = &["template", "view"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Builder errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Filesystem errors.
    #[error("io error: {0}")]
    Io(String),
    /// Invalid or incomplete prototype.
    #[error("prototype error: {0}")]
    Prototype(String),
    /// Template compilation or rendering errors.
    #[error("template error: {0}")]
    Template(String),
    /// Generated model definition failed to parse.
    #[error("model error: {0}")]
    Model(String),
}

// ============================================================================
// SECTION: Options and Report
// ============================================================================

/// Inputs of one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Prototype file or directory with `index.json`.
    pub input: PathBuf,
    /// Existing output folder.
    pub output: PathBuf,
    /// Session salt injected into `ConfigApp`.
    pub session_salt: String,
    /// Build log file.
    pub log_file: PathBuf,
    /// Administrator token; falls back to `AdminPassword`, then a random one.
    pub admin_password: Option<String>,
}

/// Outcome of a build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Files written, relative to the output folder.
    pub written: Vec<PathBuf>,
    /// Existing files left untouched because they lack the regenerate tag.
    pub skipped: Vec<PathBuf>,
    /// Administrator token written to `formwork.toml`.
    pub admin_token: String,
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Prototype builder.
pub struct Builder {
    /// Loaded prototype.
    prototype: Prototype,
    /// Output folder.
    output: PathBuf,
    /// Administrator token.
    admin_token: String,
    /// Compiled templates.
    templates: TemplateEngine,
    /// Header comments of generated files.
    builder_info: Value,
    /// Build log.
    log: File,
    /// Files written and skipped so far.
    report: BuildReport,
}

impl Builder {
    /// Loads the prototype and opens the build log.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the output folder is missing, the prototype
    /// is invalid, or the log cannot be created.
    pub fn new(options: BuildOptions) -> Result<Self, BuildError> {
        if options.output.as_os_str().is_empty() {
            return Err(BuildError::Prototype("no output folder provided".to_string()));
        }
        if !options.output.is_dir() {
            return Err(BuildError::Io(format!(
                "output folder does not exist: {}",
                options.output.display()
            )));
        }
        let mut prototype = Prototype::load(&options.input)?;
        prototype.set_app_value("session_salt", Value::String(options.session_salt));
        let log = File::create(&options.log_file).map_err(|err| {
            BuildError::Io(format!("log file {} unavailable: {err}", options.log_file.display()))
        })?;
        let admin_token = options
            .admin_password
            .filter(|password| !password.trim().is_empty())
            .or_else(|| prototype.string("AdminPassword").map(str::to_string))
            .unwrap_or_else(|| format!("admin.{}", rand::thread_rng().gen_range(1000 ..= 9999)));
        Ok(Self {
            prototype,
            output: options.output,
            admin_token,
            templates: TemplateEngine::new()?,
            builder_info: builder_info(OffsetDateTime::now_utc()),
            log,
            report: BuildReport::default(),
        })
    }

    /// Runs every build step.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] on the first failing step.
    pub fn build(mut self) -> Result<BuildReport, BuildError> {
        let started =
            format!("Building {} from {}.", self.output.display(), self.prototype.file.display());
        self.log(&started)?;
        for folder in CLEANED_FOLDERS {
            self.remove_folder(folder)?;
        }
        for folder in CREATED_FOLDERS {
            self.create_folder(folder)?;
        }
        for (path, content) in STATIC_FILES {
            self.copy_file(path, content)?;
        }

        let widgets = self.load_widgets()?;
        let mut context = self.base_context();
        context.insert("admin".to_string(), self.admin_account());
        context.insert(
            "widgets".to_string(),
            enabled_tree(widgets.iter().map(|(name, _)| name.as_str())),
        );
        self.render_file("formwork.toml", CONFIG_TEMPLATE, &Value::Object(context))?;
        let context = Value::Object(self.base_context());
        self.render_file("src/Views/Desktop.html", DESKTOP_TEMPLATE, &context)?;
        self.render_file("src/Views/SignIn.html", SIGN_IN_TEMPLATE, &context)?;

        for (name, config) in &widgets {
            self.build_widget(name, config)?;
        }
        self.log("Build finished.")?;
        self.report.admin_token.clone_from(&self.admin_token);
        Ok(self.report)
    }

    // ------------------------------------------------------------------------
    // Widgets
    // ------------------------------------------------------------------------

    /// Validates widget names and resolves `@import` directives.
    fn load_widgets(&mut self) -> Result<Vec<(String, Value)>, BuildError> {
        let mut widgets = Vec::new();
        for (name, config) in self.prototype.widgets() {
            if !is_valid_path_name(&name) {
                return Err(BuildError::Prototype(format!("invalid widget name: {name}")));
            }
            let (config, imported) = self.prototype.resolve_import(config)?;
            if let Some(path) = imported {
                self.log(&format!("Importing {}.", path.display()))?;
            }
            let config = match config {
                Value::Object(_) => config,
                Value::Null => Value::Object(Map::new()),
                _ => {
                    return Err(BuildError::Prototype(format!(
                        "widget {name} must be an object or an @import"
                    )));
                }
            };
            widgets.push((name, config));
        }
        Ok(widgets)
    }

    /// Renders one widget: folders, manifest, models, and action views.
    fn build_widget(&mut self, name: &str, config: &Value) -> Result<(), BuildError> {
        self.log(&format!("Building widget {name}."))?;
        let root = format!("{WIDGETS_DIR}/{name}");
        let mut folder = WIDGETS_DIR.to_string();
        for segment in name.split('/') {
            folder = format!("{folder}/{segment}");
            self.create_folder(&folder)?;
        }

        let models = self.build_models(name, &root, config)?;
        let actions = object_entries(config.get("actions"));
        let mut routes = Vec::new();
        for (index, (action_name, action_config)) in actions.iter().enumerate() {
            if !is_valid_path_name(action_name) {
                return Err(BuildError::Prototype(format!(
                    "invalid action name in {name}: {action_name}"
                )));
            }
            let route = action_route(name, action_name, action_config, models.first());
            if index == 0 {
                let mut index_route = route.clone();
                index_route.insert(
                    "pattern".to_string(),
                    Value::String(format!("^{}/?$", name.to_ascii_lowercase())),
                );
                routes.push(Value::Object(index_route));
            }
            routes.push(Value::Object(route));
            self.build_action(name, &root, action_name, action_config)?;
        }

        let mut manifest = Map::new();
        manifest.insert("name".to_string(), Value::String(name.to_string()));
        for key in ["title", "icon"] {
            if let Some(value) = config.get(key).filter(|value| value.is_string()) {
                manifest.insert(key.to_string(), value.clone());
            }
        }
        manifest.insert("routes".to_string(), Value::Array(routes));
        let mut context = self.base_context();
        context.insert("widget".to_string(), widget_context(name, config));
        context.insert("manifest".to_string(), Value::Object(manifest));
        self.render_file(&format!("{root}/widget.toml"), WIDGET_TEMPLATE, &Value::Object(context))?;
        Ok(())
    }

    /// Renders the model files of a widget; returns the model names.
    fn build_models(
        &mut self,
        widget: &str,
        root: &str,
        config: &Value,
    ) -> Result<Vec<String>, BuildError> {
        let models = object_entries(config.get("models"));
        if models.is_empty() {
            return Ok(Vec::new());
        }
        self.create_folder(&format!("{root}/Models"))?;
        let mut names = Vec::new();
        for (model_name, model_config) in models {
            if !is_valid_path_name(&model_name) || model_name.contains('/') {
                return Err(BuildError::Prototype(format!(
                    "invalid model name in {widget}: {model_name}"
                )));
            }
            let model = model_definition(widget, &model_name, &model_config)?;
            let path = format!("{root}/Models/{model_name}.toml");
            let mut context = self.base_context();
            context.insert("widget".to_string(), widget_context(widget, config));
            context.insert("model".to_string(), model.clone());
            if self.render_file(&path, MODEL_TEMPLATE, &Value::Object(context))? {
                let written = fs::read_to_string(self.output.join(&path))
                    .map_err(|err| BuildError::Io(err.to_string()))?;
                ModelSpec::parse(&written, ModelFormat::Toml)
                    .map_err(|err| BuildError::Model(format!("{path}: {err}")))?;
            }
            if let Some(name) = model.get("name").and_then(Value::as_str) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Renders the view of one action.
    fn build_action(
        &mut self,
        widget: &str,
        root: &str,
        action_name: &str,
        action_config: &Value,
    ) -> Result<(), BuildError> {
        let views_dir = format!("{root}/Views");
        self.create_folder(&views_dir)?;
        let mut folder = views_dir.clone();
        let segments: Vec<&str> = action_name.split('/').collect();
        for segment in &segments[.. segments.len().saturating_sub(1)] {
            folder = format!("{folder}/{segment}");
            self.create_folder(&folder)?;
        }

        let mut stripped = action_config.as_object().cloned().unwrap_or_default();
        for key in ACTION_BUILDER_KEYS {
            stripped.remove(*key);
        }
        let mut context = self.base_context();
        context.insert("widget".to_string(), json!({"name": widget}));
        context.insert(
            "action".to_string(),
            json!({"name": action_name, "config": Value::Object(stripped)}),
        );
        let template = if let Some(view) = action_config.get("view").and_then(Value::as_str) {
            context.insert("view".to_string(), Value::String(view.to_string()));
            VERBATIM_VIEW_TEMPLATE.to_string()
        } else {
            let key = action_config
                .get("template")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_ACTION_TEMPLATE);
            action_template(key).ok_or_else(|| {
                BuildError::Prototype(format!("unknown template {key} for {widget}/{action_name}"))
            })?
        };
        let path = format!("{views_dir}/{action_name}.html");
        self.render_file(&path, &template, &Value::Object(context))?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Contexts
    // ------------------------------------------------------------------------

    /// Prototype sections shared by every template.
    fn base_context(&self) -> Map<String, Value> {
        let mut context = self.prototype.document.clone();
        context.insert("builder_info".to_string(), self.builder_info.clone());
        context
    }

    /// Administrator entry of `[[auth.users]]`.
    fn admin_account(&self) -> Value {
        json!({
            "id": "1",
            "login": "administrator",
            "token": self.admin_token,
            "roles": [RoleName::ADMINISTRATOR],
        })
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    /// Appends one line to the build log.
    fn log(&mut self, message: &str) -> Result<(), BuildError> {
        writeln!(self.log, "{message}").map_err(|err| BuildError::Io(err.to_string()))
    }

    /// Creates a folder below the output folder.
    fn create_folder(&mut self, folder: &str) -> Result<(), BuildError> {
        let path = self.output.join(folder);
        if path.is_dir() {
            return Ok(());
        }
        self.log(&format!("Creating folder {folder}."))?;
        fs::create_dir_all(&path)
            .map_err(|err| BuildError::Io(format!("{}: {err}", path.display())))
    }

    /// Removes a folder below the output folder when present.
    fn remove_folder(&mut self, folder: &str) -> Result<(), BuildError> {
        let path = self.output.join(folder);
        if !path.is_dir() {
            return Ok(());
        }
        self.log(&format!("Removing folder {folder}."))?;
        fs::remove_dir_all(&path)
            .map_err(|err| BuildError::Io(format!("{}: {err}", path.display())))
    }

    /// Writes a static file.
    fn copy_file(&mut self, file: &str, content: &str) -> Result<(), BuildError> {
        self.log(&format!("Copying file {file}."))?;
        let path = self.output.join(file);
        fs::write(&path, content)
            .map_err(|err| BuildError::Io(format!("{}: {err}", path.display())))?;
        self.report.written.push(PathBuf::from(file));
        Ok(())
    }

    /// Renders a template into a file; returns false when the file was kept.
    fn render_file(
        &mut self,
        file: &str,
        template: &str,
        context: &Value,
    ) -> Result<bool, BuildError> {
        self.log(&format!("Rendering file {file} from {template}."))?;
        let path = self.output.join(file);
        if !can_regenerate(&path)? {
            self.log(&format!("Keeping {file}: regenerate tag removed."))?;
            self.report.skipped.push(PathBuf::from(file));
            return Ok(false);
        }
        let content = self.templates.render(template, context)?;
        fs::write(&path, content)
            .map_err(|err| BuildError::Io(format!("{}: {err}", path.display())))?;
        self.report.written.push(PathBuf::from(file));
        Ok(true)
    }
}

/// Builds an application in one call.
///
/// # Errors
///
/// Returns [`BuildError`] when loading or any build step fails.
pub fn build(options: BuildOptions) -> Result<BuildReport, BuildError> {
    Builder::new(options)?.build()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when `path` is missing or still carries the regenerate tag.
fn can_regenerate(path: &Path) -> Result<bool, BuildError> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).contains(REGENERATE_ALLOWED_TAG)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(BuildError::Io(format!("{}: {err}", path.display()))),
    }
}

/// Returns the entries of an object value in document order.
fn object_entries(value: Option<&Value>) -> Vec<(String, Value)> {
    match value {
        Some(Value::Object(map)) => {
            map.iter().map(|(key, item)| (key.clone(), item.clone())).collect()
        }
        _ => Vec::new(),
    }
}

/// Template view of a widget.
fn widget_context(name: &str, config: &Value) -> Value {
    json!({
        "name": name,
        "folder": format!("{WIDGETS_DIR}/{name}"),
        "config": config,
    })
}

/// Normalizes a prototype model into a model definition.
///
/// `name` defaults to `<widget>/<model>` and `table` to its lowercase
/// underscore form. Columns may be given as a list or as a map keyed by
/// column name.
fn model_definition(widget: &str, model: &str, config: &Value) -> Result<Value, BuildError> {
    let Some(source) = config.as_object() else {
        return Err(BuildError::Prototype(format!("model {widget}/{model} must be an object")));
    };
    let default_name = format!("{widget}/{model}");
    let mut definition = Map::new();
    definition.insert(
        "name".to_string(),
        source.get("name").cloned().unwrap_or_else(|| Value::String(default_name.clone())),
    );
    definition.insert(
        "table".to_string(),
        source
            .get("table")
            .cloned()
            .unwrap_or_else(|| Value::String(default_name.replace('/', "_").to_ascii_lowercase())),
    );
    for (key, value) in source {
        if key == "columns" {
            definition.insert(key.clone(), list_with_names(value));
        } else if key != "name" && key != "table" {
            definition.insert(key.clone(), value.clone());
        }
    }
    if let Some(Value::Object(relations)) = source.get("relations") {
        let relations = Value::Object(relations.clone());
        definition.insert("relations".to_string(), list_with_names(&relations));
    }
    Ok(Value::Object(definition))
}

/// Turns `{name: {...}}` maps into `[{name, ...}]` lists; lists pass through.
fn list_with_names(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Array(
            map.iter()
                .map(|(name, spec)| {
                    let mut entry = Map::new();
                    entry.insert("name".to_string(), Value::String(name.clone()));
                    if let Value::Object(fields) = spec {
                        for (key, field) in fields {
                            if key != "name" {
                                entry.insert(key.clone(), field.clone());
                            }
                        }
                    }
                    Value::Object(entry)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Builds the manifest route of one action.
///
/// Model-bound actions use the `ModelView` controller with the action
/// `model` (or the widget's first model); other actions render through
/// `Dashboard`, which wraps them in the desktop.
fn action_route(
    widget: &str,
    action: &str,
    config: &Value,
    first_model: Option<&String>,
) -> Map<String, Value> {
    let path = config
        .get("route")
        .and_then(Value::as_str)
        .map_or_else(|| format!("{widget}/{action}").to_ascii_lowercase(), str::to_string);
    let template = config.get("template").and_then(Value::as_str).unwrap_or_default();
    let model = config
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| first_model.filter(|_| matches!(template, "Table" | "Form")).cloned());
    let mut params = config.get("params").and_then(Value::as_object).cloned().unwrap_or_default();
    let controller = if let Some(model) = model {
        params.insert("model".to_string(), Value::String(model));
        MODEL_CONTROLLER
    } else {
        PAGE_CONTROLLER
    };
    let mut route = Map::new();
    route.insert("pattern".to_string(), Value::String(format!("^{path}/?$")));
    route.insert("controller".to_string(), Value::String(controller.to_string()));
    route.insert("view".to_string(), Value::String(format!("Widgets/{widget}/Views/{action}")));
    if let Some(permission) = config.get("permission").and_then(Value::as_str) {
        route.insert("permission".to_string(), Value::String(permission.to_string()));
    }
    route.insert("params".to_string(), Value::Object(params));
    route
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn model_definition_fills_name_table_and_column_list() {
        let model = model_definition(
            "Crm/Customers",
            "Customer",
            &json!({"columns": {"name": {"type": "varchar", "required": true}}}),
        )
        .unwrap();
        assert_eq!(model["name"], json!("Crm/Customers/Customer"));
        assert_eq!(model["table"], json!("crm_customers_customer"));
        assert_eq!(model["columns"], json!([{"name": "name", "type": "varchar", "required": true}]));
    }

    #[test]
    fn table_actions_bind_the_first_model() {
        let route = action_route(
            "Crm/Customers",
            "List",
            &json!({"template": "Table"}),
            Some(&"Crm/Customers/Customer".to_string()),
        );
        assert_eq!(route["pattern"], json!("^crm/customers/list/?$"));
        assert_eq!(route["controller"], json!(MODEL_CONTROLLER));
        assert_eq!(route["params"]["model"], json!("Crm/Customers/Customer"));
        assert_eq!(route["view"], json!("Widgets/Crm/Customers/Views/List"));

        let page = action_route("Blog", "About", &json!({"template": "Blank"}), None);
        assert_eq!(page["controller"], json!(PAGE_CONTROLLER));
    }
}
