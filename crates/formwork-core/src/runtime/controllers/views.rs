// formwork-core/src/runtime/controllers/views.rs
// ============================================================================
// Module: Formwork View Controllers
// Description: Desktop shell, sign-in, dashboard, and generic model views.
// Purpose: Provide the HTML-facing controllers every application ships with.
// Dependencies: crate::core, crate::runtime, serde_json
// ============================================================================

//! ## Overview
//! View controllers contribute parameters to templates instead of returning
//! JSON. `Desktop` is the default controller and the outer layout; `SignIn`
//! is the fallback for anonymous requests; `Dashboard` serves per-user card
//! layouts; `ModelView` backs widget routes that show a model's table and form.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::core::ModelName;
use crate::core::RecordAction;
use crate::core::permissions::record_permission;
use crate::runtime::app::RenderError;
use crate::runtime::controllers::Controller;
use crate::runtime::controllers::ControllerContext;
use crate::runtime::dashboard;
use crate::runtime::dashboard::DashboardConfig;
use crate::runtime::describe::form_describe;
use crate::runtime::describe::table_describe;

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Returns the built-in view controllers.
#[must_use]
pub fn builtin_controllers() -> Vec<Arc<dyn Controller>> {
    vec![Arc::new(Desktop), Arc::new(SignIn), Arc::new(Dashboard), Arc::new(ModelView)]
}

// ============================================================================
// SECTION: Desktop
// ============================================================================

/// `Desktop`: outer layout with the widget menu.
pub struct Desktop;

impl Controller for Desktop {
    fn name(&self) -> &str {
        "Desktop"
    }

    fn permission(&self, _params: &Map<String, Value>) -> Option<String> {
        None
    }

    fn hide_default_desktop(&self) -> bool {
        true
    }

    fn view_params(&self, ctx: &ControllerContext<'_>) -> Result<Value, RenderError> {
        let menu: Vec<Value> = ctx
            .app
            .widgets()
            .iter()
            .map(|widget| {
                json!({
                    "path": widget.path,
                    "title": widget.manifest.title.clone().unwrap_or_else(|| widget.manifest.name.clone()),
                    "icon": widget.manifest.icon,
                })
            })
            .collect();
        Ok(json!({
            "appName": ctx.app.options().name,
            "menu": menu,
            "userLogin": ctx.user.map(|user| user.login.as_str()),
        }))
    }
}

// ============================================================================
// SECTION: Sign-In
// ============================================================================

/// `SignIn`: anonymous landing view.
pub struct SignIn;

impl Controller for SignIn {
    fn name(&self) -> &str {
        "SignIn"
    }

    fn permission(&self, _params: &Map<String, Value>) -> Option<String> {
        None
    }

    fn requires_authentication(&self) -> bool {
        false
    }

    fn hide_default_desktop(&self) -> bool {
        true
    }

    fn view_params(&self, ctx: &ControllerContext<'_>) -> Result<Value, RenderError> {
        Ok(json!({
            "appName": ctx.app.options().name,
            "signedOut": ctx.params.contains_key("signed-out"),
        }))
    }
}

// ============================================================================
// SECTION: Dashboard
// ============================================================================

/// `Dashboard`: per-user card layout.
///
/// `action=availableCards` and `action=save` answer with JSON; otherwise the
/// layout is rendered.
pub struct Dashboard;

impl Dashboard {
    /// Reads the `preset` parameter.
    fn preset(ctx: &ControllerContext<'_>) -> u32 {
        match ctx.params.get("preset") {
            Some(Value::Number(number)) => {
                number.as_u64().and_then(|value| u32::try_from(value).ok()).unwrap_or_default()
            }
            Some(Value::String(text)) => text.trim().parse().unwrap_or_default(),
            _ => 0,
        }
    }

    /// Returns the signed-in user id.
    fn user<'a>(ctx: &'a ControllerContext<'_>) -> Result<&'a str, RenderError> {
        ctx.user_id().ok_or(RenderError::NotAuthenticated)
    }
}

impl Controller for Dashboard {
    fn name(&self) -> &str {
        "Dashboard"
    }

    fn permission(&self, _params: &Map<String, Value>) -> Option<String> {
        None
    }

    fn render_json(&self, ctx: &ControllerContext<'_>) -> Result<Option<Value>, RenderError> {
        match ctx.param_str("action") {
            Some("availableCards") => {
                let cards = dashboard::available_cards(ctx.app.registry());
                Ok(Some(json!({"data": cards})))
            }
            Some("save") => {
                let user = Self::user(ctx)?;
                let config: DashboardConfig =
                    serde_json::from_value(ctx.params.get("config").cloned().unwrap_or(Value::Null))
                        .map_err(|err| RenderError::BadRequest(format!("invalid dashboard: {err}")))?;
                dashboard::save(&ctx.app.settings(), user, Self::preset(ctx), &config)?;
                Ok(Some(json!({"status": "success"})))
            }
            Some(other) => Err(RenderError::BadRequest(format!("unknown dashboard action: {other}"))),
            None => Ok(None),
        }
    }

    fn view_params(&self, ctx: &ControllerContext<'_>) -> Result<Value, RenderError> {
        let user = Self::user(ctx)?;
        let preset = Self::preset(ctx);
        let settings = ctx.app.settings().snapshot();
        let config = dashboard::load(&settings, ctx.app.registry(), user, preset);
        Ok(json!({
            "preset": preset,
            "config": config,
            "availableCards": dashboard::available_cards(ctx.app.registry()),
        }))
    }
}

// ============================================================================
// SECTION: Model View
// ============================================================================

/// `ModelView`: table and form descriptions of the routed model.
pub struct ModelView;

impl Controller for ModelView {
    fn name(&self) -> &str {
        "ModelView"
    }

    fn permission(&self, params: &Map<String, Value>) -> Option<String> {
        let model = params.get("model").and_then(Value::as_str).unwrap_or_default();
        Some(record_permission(&ModelName::new(model), RecordAction::Read))
    }

    fn view_params(&self, ctx: &ControllerContext<'_>) -> Result<Value, RenderError> {
        let name = ctx.require_str("model")?;
        let model =
            ctx.app.registry().get(name).map_err(|err| RenderError::ModelNotFound(err.to_string()))?;
        let permissions = ctx.app.policy().record_actions(ctx.user, &model.name);
        let table = table_describe(model, ctx.params, permissions);
        let form = form_describe(model, ctx.params, permissions);
        Ok(json!({
            "model": model.name.as_str(),
            "table": table,
            "form": form,
        }))
    }
}
