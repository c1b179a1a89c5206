// formwork-server/src/server.rs
// ============================================================================
// Module: HTTP Server
// Description: axum front end that feeds HTTP requests into the render pipeline.
// Purpose: Serve a Formwork application over HTTP.
// Dependencies: axum, formwork-core, formwork-config, tokio
// ============================================================================

//! ## Overview
//! Every request below the rewrite base is translated into an
//! [`AppRequest`] and rendered on the blocking pool. `GET` requests under
//! `assets/` are answered from the application asset directory instead.
//! Security posture: parameters, headers, and bodies are untrusted; the
//! body size is capped and tokens are compared in constant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header::ACCEPT;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use axum::http::header::LOCATION;
use axum::response::IntoResponse;
use axum::response::Response;
use formwork_config::FormworkConfig;
use formwork_core::AppRequest;
use formwork_core::AppResponse;
use formwork_core::Application;
use formwork_core::runtime::AuditEvent;
use serde_json::json;
use thiserror::Error;

use crate::assets::content_type;
use crate::assets::resolve_asset;
use crate::bootstrap::build_application;
use crate::request::merge_params;
use crate::request::parse_json_body;
use crate::request::parse_urlencoded;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Route prefix of static assets.
const ASSETS_ROUTE: &str = "assets/";
/// Header that marks ajax requests.
const REQUESTED_WITH: &str = "x-requested-with";
/// Value of [`REQUESTED_WITH`] sent by browsers' ajax helpers.
const XML_HTTP_REQUEST: &str = "XMLHttpRequest";
/// JSON media type fragment.
const JSON_MEDIA: &str = "application/json";
/// Urlencoded form media type fragment.
const FORM_MEDIA: &str = "application/x-www-form-urlencoded";
/// Bearer authorization scheme prefix.
const BEARER_PREFIX: &str = "Bearer ";

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server for one application.
pub struct FormworkServer {
    /// Shared handler state.
    state: Arc<ServerState>,
    /// Listen address.
    bind: SocketAddr,
    /// Maximum request body size.
    max_body_bytes: usize,
}

impl FormworkServer {
    /// Builds a server and its application from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration or initialization fails.
    pub fn from_config(config: &FormworkConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let bind = config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let app = build_application(config)?;
        Ok(Self::new(Arc::new(app), bind, config.server.max_body_bytes))
    }

    /// Wraps an already built application.
    #[must_use]
    pub fn new(app: Arc<Application>, bind: SocketAddr, max_body_bytes: usize) -> Self {
        Self {
            state: Arc::new(ServerState {
                app,
            }),
            bind,
            max_body_bytes,
        }
    }

    /// Returns the served application.
    #[must_use]
    pub fn application(&self) -> &Application {
        &self.state.app
    }

    /// Returns the listen address.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Builds the axum router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(handle_request)
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .with_state(Arc::clone(&self.state))
    }

    /// Serves requests until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind)
            .await
            .map_err(|err| ServerError::Transport(format!("http bind failed: {err}")))?;
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
    }
}

/// Shared state of the HTTP handlers.
struct ServerState {
    /// Application serving requests.
    app: Arc<Application>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles every request.
async fn handle_request(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(route) = strip_rewrite_base(&state.app.options().rewrite_base, uri.path()) else {
        return plain_response(StatusCode::NOT_FOUND, "not found");
    };
    if method == Method::GET
        && let Some(asset) = route.strip_prefix(ASSETS_ROUTE)
    {
        return serve_asset(&state.app, asset).await;
    }
    let request = match build_request(route, uri.query(), &headers, &body) {
        Ok(request) => request,
        Err(message) => {
            return into_response(AppResponse::json(
                StatusCode::BAD_REQUEST.as_u16(),
                &json!({"status": "error", "code": "invalid_request", "message": message}),
            ));
        }
    };
    let app = Arc::clone(&state.app);
    match tokio::task::spawn_blocking(move || app.render(&request)).await {
        Ok(response) => into_response(response),
        Err(_) => into_response(AppResponse::json(
            StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            &json!({"status": "error", "code": "render_failed", "message": "render task failed"}),
        )),
    }
}

/// Serves one static asset.
async fn serve_asset(app: &Application, asset: &str) -> Response {
    let resolved = resolve_asset(&app.options().src_dir, asset);
    let file = match &resolved {
        Some(path) => tokio::fs::read(path).await.ok(),
        None => None,
    };
    let status = if file.is_some() { StatusCode::OK } else { StatusCode::NOT_FOUND };
    app.audit(&AuditEvent::new("asset", json!({"path": asset, "status": status.as_u16()})));
    match (resolved, file) {
        (Some(path), Some(bytes)) => {
            let mut response = Response::new(Body::from(bytes));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type(&path)));
            response
        }
        _ => plain_response(StatusCode::NOT_FOUND, "not found"),
    }
}

// ============================================================================
// SECTION: Request Translation
// ============================================================================

/// Strips the rewrite base; `None` when the path lies outside it.
fn strip_rewrite_base<'a>(rewrite_base: &str, path: &'a str) -> Option<&'a str> {
    let base = rewrite_base.trim_end_matches('/');
    let rest = path.strip_prefix(base)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    Some(rest.trim_start_matches('/'))
}

/// Builds the interface-neutral request.
fn build_request(
    route: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<AppRequest, String> {
    let mut params = query.map(|query| parse_urlencoded(query.as_bytes())).unwrap_or_default();
    let content_type = header_str(headers, CONTENT_TYPE.as_str()).unwrap_or_default();
    if content_type.contains(JSON_MEDIA) {
        merge_params(&mut params, parse_json_body(body)?);
    } else if content_type.contains(FORM_MEDIA) {
        merge_params(&mut params, parse_urlencoded(body));
    }
    let mut request = AppRequest::web(route, params);
    request.token = bearer_token(headers);
    request.ajax = header_str(headers, REQUESTED_WITH)
        .is_some_and(|value| value.eq_ignore_ascii_case(XML_HTTP_REQUEST));
    request.json = content_type.contains(JSON_MEDIA)
        || header_str(headers, ACCEPT.as_str()).is_some_and(|accept| accept.contains(JSON_MEDIA));
    Ok(request)
}

/// Extracts the bearer token from the authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header_str(headers, AUTHORIZATION.as_str())?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() { None } else { Some(token.to_string()) }
}

/// Returns a header value as text.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Converts an application response to an HTTP response.
fn into_response(response: AppResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut http = (status, response.body).into_response();
    http.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(response.content_type));
    if let Some(location) = response.location
        && let Ok(value) = HeaderValue::from_str(&location)
    {
        http.headers_mut().insert(LOCATION, value);
    }
    http
}

/// Plain-text response.
fn plain_response(status: StatusCode, message: &'static str) -> Response {
    (status, message).into_response()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::Value;

    use super::*;

    #[test]
    fn rewrite_base_prefix_is_stripped() {
        assert_eq!(strip_rewrite_base("/", "/crm/customers"), Some("crm/customers"));
        assert_eq!(strip_rewrite_base("/app/", "/app"), Some(""));
        assert_eq!(strip_rewrite_base("/app/", "/app/crm"), Some("crm"));
        assert_eq!(strip_rewrite_base("/app/", "/application"), None);
        assert_eq!(strip_rewrite_base("/app/", "/other"), None);
    }

    #[test]
    fn headers_shape_the_request() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-1"));
        headers.insert(REQUESTED_WITH, HeaderValue::from_static("XMLHttpRequest"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let request =
            build_request("crm", Some("page=2"), &headers, br#"{"search": "ana"}"#).unwrap();
        assert_eq!(request.token.as_deref(), Some("tok-1"));
        assert!(request.ajax);
        assert!(request.json);
        assert_eq!(request.params.get("page"), Some(&Value::String("2".to_string())));
        assert_eq!(request.params.get("search"), Some(&Value::String("ana".to_string())));
        assert!(build_request("crm", None, &headers, b"{").is_err());
    }
}
