// formwork-core/tests/render_pipeline.rs
// ============================================================================
// Module: Render Pipeline Tests
// Description: End-to-end request rendering over the in-memory store.
// ============================================================================
//! ## Overview
//! Drives [`Application::render`] through authentication, permissions, the
//! save cascade, sealed ids, desktop wrapping, plugins, and audit events.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;

use formwork_core::AppRequest;
use formwork_core::AppResponse;
use formwork_core::Application;
use formwork_core::ApplicationOptions;
use formwork_core::Authenticator;
use formwork_core::ColumnSpec;
use formwork_core::DataType;
use formwork_core::ModelSpec;
use formwork_core::PermissionPolicy;
use formwork_core::RelationKind;
use formwork_core::RelationSpec;
use formwork_core::RoleName;
use formwork_core::User;
use formwork_core::UserId;
use formwork_core::ViewError;
use formwork_core::ViewRenderer;
use formwork_core::runtime::Controller;
use formwork_core::runtime::EventOutcome;
use formwork_core::runtime::InMemoryRecordStore;
use formwork_core::runtime::MemoryAuditSink;
use formwork_core::runtime::Plugin;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Renders `[View]` followed by any wrapped content.
struct EchoViews;

impl ViewRenderer for EchoViews {
    fn render(&self, view: &str, params: &Value) -> Result<String, ViewError> {
        if view == "Fatal" {
            return Err(ViewError::NotFound(view.to_string()));
        }
        let content = params["viewParams"]["contentHtml"].as_str().unwrap_or_default();
        Ok(format!("[{view}]{content}"))
    }
}

/// Fixed token table.
struct Tokens;

impl Authenticator for Tokens {
    fn authenticate(&self, token: &str) -> Option<User> {
        let (id, role) = match token {
            "admin-token" => ("1", RoleName::ADMINISTRATOR),
            "clerk-token" => ("2", "clerk"),
            "sales-token" => ("3", "sales"),
            _ => return None,
        };
        Some(User {
            id: UserId::new(id),
            login: format!("user{id}"),
            roles: vec![RoleName::new(role)],
        })
    }
}

/// Stops `onBeforeRender` for the `blocked` route.
struct Gate;

impl Plugin for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    fn on_event(&self, event: &str, data: Value) -> EventOutcome {
        if event == "onBeforeRender" && data["route"] == json!("blocked") {
            EventOutcome::Stop(json!({"status": "blocked"}))
        } else {
            EventOutcome::Continue(data)
        }
    }
}

/// Web-only controller.
struct WebOnly;

impl Controller for WebOnly {
    fn name(&self) -> &str {
        "WebOnly"
    }

    fn permission(&self, _params: &Map<String, Value>) -> Option<String> {
        None
    }

    fn cli_enabled(&self) -> bool {
        false
    }

    fn render_json(
        &self,
        _ctx: &formwork_core::runtime::ControllerContext<'_>,
    ) -> Result<Option<Value>, formwork_core::RenderError> {
        Ok(Some(json!({"ok": true})))
    }
}

fn customer_model() -> ModelSpec {
    let mut model = ModelSpec::new("Crm/Customer", "crm_customers")
        .with_column(ColumnSpec::new("name", DataType::Varchar).required())
        .with_column(ColumnSpec::new("code", DataType::Varchar))
        .with_relation(RelationSpec::new(
            "contacts",
            RelationKind::HasMany,
            "Crm/Contact",
            "customer",
        ))
        .with_lookup_pattern("{%name%}");
    model.unique = vec![vec!["code".into()]];
    model
}

fn contact_model() -> ModelSpec {
    ModelSpec::new("Crm/Contact", "crm_contacts")
        .with_column(ColumnSpec::new("customer", DataType::Lookup).lookup("Crm/Customer"))
        .with_column(ColumnSpec::new("email", DataType::Varchar).required())
}

fn app_with(options: ApplicationOptions, audit: Arc<MemoryAuditSink>) -> Application {
    let app = Application::builder(options)
        .store(Arc::new(InMemoryRecordStore::new()))
        .views(Arc::new(EchoViews))
        .authenticator(Arc::new(Tokens))
        .policy(
            PermissionPolicy::default()
                .grant("clerk", "Crm/Customer:Read")
                .grant("sales", "Crm/Customer:*"),
        )
        .plugin(Arc::new(Gate))
        .audit(audit)
        .controller(Arc::new(WebOnly))
        .model(customer_model())
        .model(contact_model())
        .build()
        .unwrap();
    app.install().unwrap();
    app
}

fn plain_app() -> Application {
    let options = ApplicationOptions {
        allow_plain_ids: true,
        session_salt: "salt".to_string(),
        ..ApplicationOptions::default()
    };
    app_with(options, Arc::new(MemoryAuditSink::new()))
}

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn api(app: &Application, route: &str, token: &str, body: Value) -> (u16, Value) {
    let response: AppResponse = app.render(&AppRequest::web(route, params(body)).with_token(token));
    (response.status, response.json_body().unwrap())
}

// ============================================================================
// SECTION: Authentication and Permissions
// ============================================================================

#[test]
fn anonymous_api_request_is_rejected_with_401() {
    let app = plain_app();
    let (status, body) = api(&app, "api/record/get-list", "", json!({"model": "Crm/Customer"}));
    assert_eq!(status, 401);
    assert_eq!(body["status"], json!("error"));
    assert_eq!(body["code"], json!("not_authenticated"));
}

#[test]
fn anonymous_html_request_falls_back_to_sign_in() {
    let app = plain_app();
    let response = app.render(&AppRequest::web("", Map::new()));
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "[SignIn]");
}

#[test]
fn missing_permission_is_403_with_sign_in_hint() {
    let app = plain_app();
    let (status, body) = api(
        &app,
        "api/record/save",
        "clerk-token",
        json!({"model": "Crm/Customer", "record": {"name": "Acme"}}),
    );
    assert_eq!(status, 403);
    assert_eq!(
        body["message"],
        json!("Not enough permissions (Crm/Customer:Create). Sign out and sign in again.")
    );
    let (status, _) =
        api(&app, "api/record/get-list", "clerk-token", json!({"model": "Crm/Customer"}));
    assert_eq!(status, 200);
}

#[test]
fn nested_save_needs_permissions_on_child_models() {
    let app = plain_app();
    let (status, body) = api(
        &app,
        "api/record/save",
        "sales-token",
        json!({
            "model": "Crm/Customer",
            "record": {"name": "Acme", "contacts": [{"email": "a@acme.test"}]}
        }),
    );
    assert_eq!(status, 403);
    assert_eq!(
        body["message"],
        json!("Not enough permissions (Crm/Contact:Create). Sign out and sign in again.")
    );
    let (_, list) =
        api(&app, "api/record/get-list", "admin-token", json!({"model": "Crm/Customer"}));
    assert_eq!(list["total"], json!(0));

    let (status, body) = api(
        &app,
        "api/record/save",
        "sales-token",
        json!({"model": "Crm/Customer", "record": {"name": "Acme", "contacts": []}}),
    );
    assert_eq!(status, 200, "{body}");
}

#[test]
fn sign_out_redirects() {
    let app = plain_app();
    let response = app.render(&AppRequest::web("", params(json!({"sign-out": "1"}))));
    assert_eq!(response.status, 302);
    assert_eq!(response.location.as_deref(), Some("/?signed-out"));
}

// ============================================================================
// SECTION: Save Cascade
// ============================================================================

#[test]
fn nested_save_persists_children_and_reads_them_back() {
    let app = plain_app();
    let (status, body) = api(
        &app,
        "api/record/save",
        "admin-token",
        json!({
            "model": "Crm/Customer",
            "record": {
                "id": 0,
                "name": "Acme",
                "code": "A1",
                "contacts": [
                    {"email": "a@acme.test", "_useMasterRecordId_": ["customer"]},
                    {"email": "b@acme.test"}
                ]
            }
        }),
    );
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["status"], json!("success"));
    let saved = &body["savedRecord"];
    let id = saved["id"].as_i64().unwrap();
    assert_eq!(saved["contacts"].as_array().unwrap().len(), 2);
    assert_eq!(saved["contacts"][1]["customer"], json!(id));

    let (status, record) =
        api(&app, "api/record/get", "admin-token", json!({"model": "Crm/Customer", "id": id}));
    assert_eq!(status, 200);
    assert_eq!(record["_LOOKUP"], json!("Acme"));
    assert_eq!(record["contacts"].as_array().unwrap().len(), 2);
}

#[test]
fn failing_child_rolls_back_the_whole_save() {
    let app = plain_app();
    let (status, body) = api(
        &app,
        "api/record/save",
        "admin-token",
        json!({
            "model": "Crm/Customer",
            "record": {"name": "Acme", "contacts": [{"email": ""}]}
        }),
    );
    assert_eq!(status, 422);
    assert_eq!(body["code"], json!("invalid_inputs"));
    assert!(body["invalidInputs"]["email"].is_string());
    let (_, list) =
        api(&app, "api/record/get-list", "admin-token", json!({"model": "Crm/Customer"}));
    assert_eq!(list["total"], json!(0));
}

#[test]
fn duplicate_unique_value_is_422() {
    let app = plain_app();
    let record = json!({"model": "Crm/Customer", "record": {"name": "Acme", "code": "A1"}});
    let (status, _) = api(&app, "api/record/save", "admin-token", record.clone());
    assert_eq!(status, 200);
    let (status, body) = api(&app, "api/record/save", "admin-token", record);
    assert_eq!(status, 422);
    assert_eq!(body["code"], json!("unique_violation"));
}

#[test]
fn sealed_ids_round_trip_and_plain_ids_are_rejected() {
    let options = ApplicationOptions {
        session_salt: "salt".to_string(),
        ..ApplicationOptions::default()
    };
    let app = app_with(options, Arc::new(MemoryAuditSink::new()));
    let (_, body) = api(
        &app,
        "api/record/save",
        "admin-token",
        json!({"model": "Crm/Customer", "record": {"name": "Acme"}}),
    );
    let token = body["savedRecord"]["id"].clone();
    assert!(token.is_string());
    let (status, record) =
        api(&app, "api/record/get", "admin-token", json!({"model": "Crm/Customer", "id": token}));
    assert_eq!(status, 200);
    assert_eq!(record["name"], json!("Acme"));
    let (status, _) =
        api(&app, "api/record/get", "admin-token", json!({"model": "Crm/Customer", "id": 1}));
    assert_eq!(status, 400);
}

#[test]
fn delete_removes_record() {
    let app = plain_app();
    let (_, body) = api(
        &app,
        "api/record/save",
        "admin-token",
        json!({"model": "Crm/Customer", "record": {"name": "Acme"}}),
    );
    let id = body["savedRecord"]["id"].clone();
    let (status, deleted) =
        api(&app, "api/record/delete", "admin-token", json!({"model": "Crm/Customer", "id": id}));
    assert_eq!(status, 200);
    assert_eq!(deleted["deleted"], json!(true));
    let (status, body) =
        api(&app, "api/record/get", "admin-token", json!({"model": "Crm/Customer", "id": id}));
    assert_eq!(status, 404);
    assert_eq!(body["code"], json!("record_not_found"));
}

// ============================================================================
// SECTION: Views, Interfaces, and Plugins
// ============================================================================

#[test]
fn views_are_wrapped_in_desktop_unless_ajax() {
    let app = plain_app();
    let request = AppRequest::web("dashboard", Map::new()).with_token("admin-token");
    let response = app.render(&request);
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "[Desktop][Dashboard]");
    let ajax = AppRequest::web("dashboard", params(json!({"__IS_AJAX__": "1"})))
        .with_token("admin-token");
    assert_eq!(app.render(&ajax).body, "[Dashboard]");
}

#[test]
fn unknown_default_controller_is_reported() {
    let options = ApplicationOptions {
        default_controller: "Missing".to_string(),
        allow_plain_ids: true,
        ..ApplicationOptions::default()
    };
    let app = app_with(options, Arc::new(MemoryAuditSink::new()));
    let response = app.render(&AppRequest::web("", Map::new()).expecting_json());
    assert_eq!(response.status, 400);
    assert_eq!(response.json_body().unwrap()["message"], json!("Controller not found: Missing"));
}

#[test]
fn cli_disabled_controller_is_rejected_from_cli() {
    let options = ApplicationOptions {
        default_controller: "WebOnly".to_string(),
        allow_plain_ids: true,
        ..ApplicationOptions::default()
    };
    let app = app_with(options, Arc::new(MemoryAuditSink::new()));
    let cli = app.render(&AppRequest::cli("", Map::new()).with_token("admin-token"));
    assert_eq!(cli.status, 400);
    assert_eq!(
        cli.json_body().unwrap()["message"],
        json!("Controller is not enabled in CLI interface.")
    );
    let web = app.render(&AppRequest::web("", Map::new()).with_token("admin-token"));
    assert_eq!(web.json_body().unwrap(), json!({"ok": true}));
}

#[test]
fn plugin_can_stop_rendering() {
    let app = plain_app();
    let response = app.render(&AppRequest::web("blocked", Map::new()).with_token("admin-token"));
    assert_eq!(response.json_body().unwrap(), json!({"status": "blocked"}));
}

#[test]
fn html_errors_fall_back_to_plain_fatal_page() {
    let app = plain_app();
    let request = AppRequest::web("dashboard", params(json!({"uid": "bad uid!"})))
        .with_token("admin-token");
    let response = app.render(&request);
    assert_eq!(response.status, 400);
    assert!(response.body.contains("Invalid UID: bad uid!"));
}

#[test]
fn every_render_emits_one_audit_event() {
    let audit = Arc::new(MemoryAuditSink::new());
    let options = ApplicationOptions {
        allow_plain_ids: true,
        ..ApplicationOptions::default()
    };
    let app = app_with(options, audit.clone());
    let _response = app.render(&AppRequest::web("", Map::new()));
    let _response = app.render(
        &AppRequest::web("api/record/get-list", params(json!({"model": "Crm/Customer"})))
            .with_token("admin-token"),
    );
    let renders: Vec<_> = audit.events().into_iter().filter(|e| e.event == "render").collect();
    assert_eq!(renders.len(), 2);
    assert_eq!(renders[1].fields["controller"], json!("Api/Record/GetList"));
    assert_eq!(renders[1].fields["user"], json!("1"));
    let installs = audit.event_names().iter().filter(|name| **name == "install_model").count();
    assert_eq!(installs, 2);
}

#[test]
fn settings_saved_through_api_are_visible() {
    let app = plain_app();
    let (status, _) = api(
        &app,
        "api/config/set",
        "admin-token",
        json!({"path": "app/theme", "value": {"color": "red"}}),
    );
    assert_eq!(status, 200);
    assert_eq!(app.settings().get("app/theme/color"), Some(json!("red")));
}
