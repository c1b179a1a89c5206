// formwork-core/src/runtime/controllers/mod.rs
// ============================================================================
// Module: Formwork Controllers
// Description: Controller trait, render context, and the controller registry.
// Purpose: Define what a routed request executes and which controllers ship built in.
// Dependencies: crate::core, crate::runtime::app, serde_json
// ============================================================================

//! ## Overview
//! A controller either answers with JSON (`render_json` returns `Some`) or
//! contributes parameters to a view template. The render pipeline asks each
//! controller for its permission, authentication requirement, and enabled
//! interfaces before running it. Built-in controllers cover the record API,
//! the desktop shell, sign-in, the dashboard, and a generic model view.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;

use crate::core::Uid;
use crate::core::User;
use crate::runtime::app::Application;
use crate::runtime::app::Interface;
use crate::runtime::app::RenderError;

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod api;
pub mod views;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Inputs available to a controller while rendering.
pub struct ControllerContext<'a> {
    /// Application runtime.
    pub app: &'a Application,
    /// Merged request and route parameters.
    pub params: &'a Map<String, Value>,
    /// Signed-in user.
    pub user: Option<&'a User>,
    /// View instance uid.
    pub uid: &'a Uid,
    /// Requesting interface.
    pub interface: Interface,
    /// Request route.
    pub route: &'a str,
}

impl ControllerContext<'_> {
    /// Returns a string parameter.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Returns a required string parameter.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::BadRequest`] when the parameter is missing or empty.
    pub fn require_str(&self, key: &str) -> Result<&str, RenderError> {
        self.param_str(key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| RenderError::BadRequest(format!("missing parameter: {key}")))
    }

    /// Returns the signed-in user id.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user.map(|user| user.id.as_str())
    }
}

// ============================================================================
// SECTION: Controller Trait
// ============================================================================

/// Routed request handler.
pub trait Controller: Send + Sync {
    /// Controller name (`Api/Record/Save`).
    fn name(&self) -> &str;

    /// Permission required to run the controller; `None` needs only sign-in.
    fn permission(&self, _params: &Map<String, Value>) -> Option<String> {
        Some(self.name().to_string())
    }

    /// Whether a signed-in user is required.
    fn requires_authentication(&self) -> bool {
        true
    }

    /// Whether the output skips the desktop wrapper.
    fn hide_default_desktop(&self) -> bool {
        false
    }

    /// Whether the controller may run from the CLI.
    fn cli_enabled(&self) -> bool {
        true
    }

    /// Whether the controller may run over HTTP.
    fn web_enabled(&self) -> bool {
        true
    }

    /// View template rendered when no JSON is returned.
    fn view(&self) -> String {
        self.name().to_string()
    }

    /// Returns a JSON payload instead of a view.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] when the request cannot be served.
    fn render_json(&self, _ctx: &ControllerContext<'_>) -> Result<Option<Value>, RenderError> {
        Ok(None)
    }

    /// Returns parameters for the view template.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] when the parameters cannot be built.
    fn view_params(&self, _ctx: &ControllerContext<'_>) -> Result<Value, RenderError> {
        Ok(Value::Object(Map::new()))
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Controllers by name.
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    /// Registered controllers.
    controllers: BTreeMap<String, Arc<dyn Controller>>,
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("controllers", &self.controllers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ControllerRegistry {
    /// Creates a registry holding the built-in controllers.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        for controller in api::builtin_controllers().into_iter().chain(views::builtin_controllers()) {
            registry.register(controller);
        }
        registry
    }

    /// Registers a controller, replacing one with the same name.
    pub fn register(&mut self, controller: Arc<dyn Controller>) {
        self.controllers.insert(controller.name().to_string(), controller);
    }

    /// Returns a controller by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Controller>> {
        self.controllers.get(name).cloned()
    }

    /// Lists controller names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.controllers.keys().map(String::as_str)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_api_and_views() {
        let registry = ControllerRegistry::with_builtins();
        for name in [
            "Api/Form/Describe",
            "Api/Table/Describe",
            "Api/Record/Get",
            "Api/Record/GetList",
            "Api/Record/Lookup",
            "Api/Record/Save",
            "Api/Record/Delete",
            "Api/Config/Set",
            "Desktop",
            "SignIn",
            "Dashboard",
            "ModelView",
        ] {
            assert!(registry.get(name).is_some(), "missing controller {name}");
        }
    }
}
