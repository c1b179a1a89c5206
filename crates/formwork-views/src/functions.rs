// formwork-views/src/functions.rs
// ============================================================================
// Module: Template Functions
// Description: Functions and filters available to view templates.
// Purpose: Expose translation, permissions, and formatting helpers to views.
// Dependencies: formwork-core, minijinja, serde_json
// ============================================================================

//! ## Overview
//! Registered helpers:
//! - `translate(text, context="")`: translates into `config.language`.
//! - `has_permission(permission)`: checks the rendering `user`.
//! - `str2url` filter: URL-safe ASCII slug.
//! - `json` filter: compact JSON text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use formwork_core::PermissionPolicy;
use formwork_core::RoleName;
use formwork_core::Translator;
use formwork_core::User;
use formwork_core::UserId;
use formwork_core::core::upload::str2url;
use minijinja::Environment;
use minijinja::Error;
use minijinja::ErrorKind;
use minijinja::State;
use minijinja::Value;
use serde_json::Map;

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Registers every helper on the environment.
pub(crate) fn register(
    env: &mut Environment<'static>,
    translator: Arc<Translator>,
    policy: PermissionPolicy,
) {
    env.add_function("translate", move |state: &State, text: String, context: Option<String>| {
        let language = state
            .lookup("config")
            .and_then(|config| config.get_attr("language").ok())
            .and_then(|language| language.as_str().map(str::to_string));
        translator.translate(
            &text,
            context.as_deref().unwrap_or_default(),
            language.as_deref(),
            &Map::new(),
        )
    });
    env.add_function("has_permission", move |state: &State, permission: String| {
        state
            .lookup("user")
            .and_then(|user| template_user(&user))
            .is_some_and(|user| policy.allows(&user, &permission))
    });
    env.add_filter("str2url", |text: String| str2url(&text));
    env.add_filter("json", json_filter);
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serializes a template value to JSON text.
fn json_filter(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value).map_err(|err| {
        Error::new(ErrorKind::InvalidOperation, format!("json filter failed: {err}"))
    })
}

/// Rebuilds the rendering user from the `user` template variable.
fn template_user(value: &Value) -> Option<User> {
    if value.is_none() || value.is_undefined() {
        return None;
    }
    let id = value.get_attr("id").ok()?.to_string();
    let login = value.get_attr("login").ok().map(|login| login.to_string()).unwrap_or_default();
    let roles = value
        .get_attr("roles")
        .ok()
        .and_then(|roles| roles.try_iter().ok())
        .map(|roles| roles.filter_map(|role| role.as_str().map(RoleName::new)).collect())
        .unwrap_or_default();
    Some(User {
        id: UserId::new(id),
        login,
        roles,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
