// formwork-server/tests/http_server.rs
// ============================================================================
// Module: HTTP Server Tests
// Description: Drives the axum router against a configured application.
// ============================================================================
//! ## Overview
//! Builds a sqlite-backed application from `formwork.toml` text and sends
//! requests through [`FormworkServer::router`] without binding a socket.

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

use std::fs;
use std::path::Path;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use formwork_config::FormworkConfig;
use formwork_server::FormworkServer;
use http_body_util::BodyExt;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const CUSTOMER_MODEL: &str = r#"
name = "Crm/Customer"
table = "crm_customers"
lookup_pattern = "{%name%}"

[[columns]]
name = "name"
type = "varchar"
required = true
"#;

/// Writes a widget, an asset, and a config; returns the built server.
fn server(dir: &Path, extra: &str) -> FormworkServer {
    let widget = dir.join("src/Widgets/Crm/Customers");
    fs::create_dir_all(widget.join("Models")).unwrap();
    fs::write(widget.join("Models/Customer.toml"), CUSTOMER_MODEL).unwrap();
    fs::create_dir_all(dir.join("src/Assets/css")).unwrap();
    fs::write(dir.join("src/Assets/css/site.css"), "body { margin: 0; }").unwrap();
    let config = FormworkConfig::from_toml_str(
        &format!(
            "[app]\nsession_salt = \"salt\"\n{extra}\n\
             [server]\nmax_body_bytes = 4096\n\
             [store]\ntype = \"sqlite\"\npath = \"data/app.sqlite\"\n\
             [audit]\npath = \"log/audit.jsonl\"\n\
             [[auth.users]]\nid = \"1\"\ntoken = \"admin-token\"\nroles = [\"administrator\"]\n\
             [widgets.Crm.Customers]\nenabled = true\n"
        ),
        dir,
    )
    .unwrap();
    let server = FormworkServer::from_config(&config).unwrap();
    server.application().install().unwrap();
    server
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

fn api_request(route: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/{route}"))
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn api_save_then_list_round_trips_through_sqlite() {
    let dir = TempDir::new().unwrap();
    let router = server(dir.path(), "").router();
    let (status, content_type, body) = send(
        &router,
        api_request(
            "api/record/save",
            Some("admin-token"),
            &json!({"model": "Crm/Customer", "record": {"name": "Acme"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(content_type, "application/json");
    let saved: Value = serde_json::from_str(&body).unwrap();
    assert!(saved["savedRecord"]["id"].is_string());

    let (status, _, body) = send(
        &router,
        api_request("api/record/get-list", Some("admin-token"), &json!({"model": "Crm/Customer"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let list: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(list["total"], json!(1));
    assert!(dir.path().join("data/app.sqlite").is_file());
}

#[tokio::test]
async fn anonymous_requests_get_401_or_the_sign_in_page() {
    let dir = TempDir::new().unwrap();
    let router = server(dir.path(), "name = \"Acme CRM\"").router();
    let (status, _, body) = send(
        &router,
        api_request("api/record/get-list", None, &json!({"model": "Crm/Customer"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("not_authenticated"));

    let (status, content_type, body) =
        send(&router, Request::builder().uri("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/html"));
    assert!(body.contains("Acme CRM"));
}

#[tokio::test]
async fn bad_tokens_are_not_accepted() {
    let dir = TempDir::new().unwrap();
    let router = server(dir.path(), "").router();
    let (status, _, _) = send(
        &router,
        api_request("api/record/get-list", Some("admin-tokem"), &json!({"model": "Crm/Customer"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_json_body_is_400() {
    let dir = TempDir::new().unwrap();
    let router = server(dir.path(), "").router();
    let request = Request::builder()
        .method("POST")
        .uri("/api/record/get-list")
        .header("content-type", "application/json")
        .body(Body::from("{"))
        .unwrap();
    let (status, _, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("invalid_request"));
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let dir = TempDir::new().unwrap();
    let router = server(dir.path(), "").router();
    let request = Request::builder()
        .method("POST")
        .uri("/api/record/get-list")
        .header("content-type", "application/json")
        .body(Body::from(vec![b' '; 8192]))
        .unwrap();
    let (status, _, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn assets_are_served_and_traversal_is_404() {
    let dir = TempDir::new().unwrap();
    let router = server(dir.path(), "").router();
    let (status, content_type, body) =
        send(&router, Request::builder().uri("/assets/css/site.css").body(Body::empty()).unwrap())
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/css; charset=utf-8");
    assert_eq!(body, "body { margin: 0; }");

    let (status, _, _) = send(
        &router,
        Request::builder().uri("/assets/../formwork.toml").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let audit = fs::read_to_string(dir.path().join("log/audit.jsonl")).unwrap();
    assert!(audit.contains("\"asset\""));
}

#[tokio::test]
async fn rewrite_base_scopes_routes_and_sign_out() {
    let dir = TempDir::new().unwrap();
    let router = server(dir.path(), "rewrite_base = \"/crm/\"").router();
    let (status, _, _) =
        send(&router, Request::builder().uri("/other").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/crm/?sign-out").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get("location").unwrap(), "/crm/?signed-out");
}
