// formwork-views/src/views.rs
// ============================================================================
// Module: Template Views
// Description: minijinja-backed implementation of the core view renderer.
// Purpose: Render application, widget, and built-in templates to HTML.
// Dependencies: formwork-core, minijinja, serde_json
// ============================================================================

//! ## Overview
//! View names resolve to `{name}.html` files, first under `{src_dir}/Views`
//! and then under `{src_dir}` itself, so widget templates are addressed as
//! `Widgets/<Widget>/Views/<Action>`. Names that escape the source directory
//! never resolve. When no file exists, the built-in template of the same
//! name is used. Output is HTML auto-escaped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use formwork_core::PermissionPolicy;
use formwork_core::Translator;
use formwork_core::ViewError;
use formwork_core::ViewRenderer;
use minijinja::AutoEscape;
use minijinja::Environment;
use minijinja::ErrorKind;
use serde_json::Map;
use serde_json::Value;

use crate::functions;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Template file extension.
const TEMPLATE_EXTENSION: &str = "html";
/// Maximum template file size in bytes.
const MAX_TEMPLATE_BYTES: u64 = 1024 * 1024;

/// Built-in templates by view name.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("Desktop", include_str!("../templates/Desktop.html")),
    ("SignIn", include_str!("../templates/SignIn.html")),
    ("Dashboard", include_str!("../templates/Dashboard.html")),
    ("ModelView", include_str!("../templates/ModelView.html")),
    ("Fatal", include_str!("../templates/Fatal.html")),
];

// ============================================================================
// SECTION: Options
// ============================================================================

/// Inputs for [`TemplateViews`].
#[derive(Debug, Clone)]
pub struct ViewsOptions {
    /// Application source directory.
    pub src_dir: PathBuf,
    /// Role grants used by `has_permission`.
    pub policy: PermissionPolicy,
    /// Extra template globals.
    pub globals: Map<String, Value>,
}

impl ViewsOptions {
    /// Creates options rooted at a source directory.
    #[must_use]
    pub fn new(src_dir: impl Into<PathBuf>) -> Self {
        Self {
            src_dir: src_dir.into(),
            policy: PermissionPolicy::default(),
            globals: Map::new(),
        }
    }
}

// ============================================================================
// SECTION: Renderer
// ============================================================================

/// minijinja view renderer.
pub struct TemplateViews {
    /// Configured environment.
    env: Environment<'static>,
}

impl TemplateViews {
    /// Builds the renderer.
    #[must_use]
    pub fn new(options: ViewsOptions) -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        let roots = vec![options.src_dir.join("Views"), options.src_dir.clone()];
        env.set_loader(move |name| Ok(load_template(&roots, name)));
        let translator = Arc::new(Translator::new(&options.src_dir));
        functions::register(&mut env, translator, options.policy);
        for (name, value) in options.globals {
            env.add_global(name, minijinja::Value::from_serialize(&value));
        }
        Self {
            env,
        }
    }
}

impl ViewRenderer for TemplateViews {
    fn render(&self, view: &str, params: &Value) -> Result<String, ViewError> {
        let template = self.env.get_template(view).map_err(|err| match err.kind() {
            ErrorKind::TemplateNotFound => ViewError::NotFound(view.to_string()),
            _ => ViewError::Render(err.to_string()),
        })?;
        template.render(params).map_err(|err| ViewError::Render(err.to_string()))
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads a template source from the roots or the built-ins.
fn load_template(roots: &[PathBuf], name: &str) -> Option<String> {
    let relative = template_path(name)?;
    for root in roots {
        let path = root.join(&relative);
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        if metadata.is_file() && metadata.len() <= MAX_TEMPLATE_BYTES {
            return fs::read_to_string(&path).ok();
        }
    }
    builtin_template(name).map(str::to_string)
}

/// Maps a view name to a relative file path; `None` for unsafe names.
fn template_path(name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains('\\') {
        return None;
    }
    let path = Path::new(name);
    if !path.components().all(|component| matches!(component, Component::Normal(_))) {
        return None;
    }
    if path.extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION) {
        Some(path.to_path_buf())
    } else {
        Some(PathBuf::from(format!("{name}.{TEMPLATE_EXTENSION}")))
    }
}

/// Returns the built-in template of a view.
fn builtin_template(name: &str) -> Option<&'static str> {
    let name = name.strip_suffix(".html").unwrap_or(name);
    BUILTIN_TEMPLATES.iter().find(|(builtin, _)| *builtin == name).map(|(_, source)| *source)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_paths_reject_traversal() {
        assert_eq!(
            template_path("Widgets/Crm/Views/Table"),
            Some(PathBuf::from("Widgets/Crm/Views/Table.html"))
        );
        assert_eq!(template_path("Layout.html"), Some(PathBuf::from("Layout.html")));
        assert_eq!(template_path("../secret"), None);
        assert_eq!(template_path("/etc/passwd"), None);
        assert_eq!(template_path("a\\b"), None);
    }

    #[test]
    fn every_core_view_has_a_builtin() {
        for name in ["Desktop", "SignIn", "Dashboard", "ModelView", "Fatal"] {
            assert!(builtin_template(name).is_some(), "{name}");
        }
    }
}
