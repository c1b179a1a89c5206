// formwork-core/src/runtime/app.rs
// ============================================================================
// Module: Formwork Application
// Description: Application loader and the request render pipeline.
// Purpose: Route HTTP and CLI requests to controllers and views with permission checks.
// Dependencies: crate::core, crate::interfaces, crate::runtime, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`Application`] is assembled once by [`ApplicationBuilder`]: enabled
//! widgets are loaded, their models registered and validated, widget routes
//! added after the built-in API routes, and persisted settings read into the
//! live settings tree.
//!
//! [`Application::render`] then serves requests:
//! route match, sign-out, controller lookup, interface check, authentication
//! (with the `SignIn` fallback), permission check, uid, `onBeforeRender`
//! plugins, and finally either the controller's JSON payload or its view,
//! wrapped in the `Desktop` layout unless the request is ajax or the
//! controller opts out.
//! Invariants:
//! - Every request produces exactly one `render` audit event.
//! - Bearer tokens never appear in responses or audit events.
//! - Errors never escape `render`; they become JSON or fatal-page responses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Instant;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::IdCodec;
use crate::core::IdCodecError;
use crate::core::ModelSpec;
use crate::core::NormalizeContext;
use crate::core::PermissionPolicy;
use crate::core::SettingsTree;
use crate::core::Translator;
use crate::core::Uid;
use crate::core::UidError;
use crate::core::User;
use crate::core::data_types::escape_html;
use crate::interfaces::Authenticator;
use crate::interfaces::RecordStore;
use crate::interfaces::SettingsStore;
use crate::interfaces::StoreError;
use crate::interfaces::ViewError;
use crate::interfaces::ViewRenderer;
use crate::runtime::audit::AuditEvent;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::audit::RenderAuditParams;
use crate::runtime::controllers::Controller;
use crate::runtime::controllers::ControllerContext;
use crate::runtime::controllers::ControllerRegistry;
use crate::runtime::plugins::EVENT_AFTER_INSTALL;
use crate::runtime::plugins::EVENT_BEFORE_RENDER;
use crate::runtime::plugins::EventOutcome;
use crate::runtime::plugins::Plugin;
use crate::runtime::plugins::PluginHost;
use crate::runtime::records::RecordError;
use crate::runtime::records::RecordSaveError;
use crate::runtime::records::RecordService;
use crate::runtime::registry::ModelRegistry;
use crate::runtime::registry::RegistryError;
use crate::runtime::routing::Router;
use crate::runtime::routing::RoutingError;
use crate::runtime::settings::SettingsService;
use crate::runtime::store::InMemoryRecordStore;
use crate::runtime::widgets::LoadedWidget;
use crate::runtime::widgets::WidgetError;
use crate::runtime::widgets::WidgetLoader;
use crate::runtime::widgets::enabled_widgets;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// JSON response content type.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// HTML response content type.
pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
/// Controller used when anonymous requests need a user.
pub const SIGN_IN_CONTROLLER: &str = "SignIn";
/// Outer layout controller and view.
pub const DESKTOP_CONTROLLER: &str = "Desktop";
/// View rendered for fatal errors.
pub const FATAL_VIEW: &str = "Fatal";
/// Request parameter that signs the user out.
pub const SIGN_OUT_PARAM: &str = "sign-out";
/// Request parameter that marks an ajax request.
pub const AJAX_PARAM: &str = "__IS_AJAX__";

// ============================================================================
// SECTION: Options
// ============================================================================

/// Requesting interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    /// HTTP request.
    Web,
    /// Command-line request.
    Cli,
}

impl Interface {
    /// Returns the lowercase interface label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Cli => "cli",
        }
    }

    /// Returns the label used in interface errors.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Web => "WEB",
            Self::Cli => "CLI",
        }
    }
}

/// Runtime options of an application.
#[derive(Debug, Clone)]
pub struct ApplicationOptions {
    /// Application name.
    pub name: String,
    /// Public base URL without trailing slash.
    pub url: String,
    /// URL path prefix stripped from request paths.
    pub rewrite_base: String,
    /// Application source directory (`Views`, `Widgets`, `Lang`, `Assets`).
    pub src_dir: PathBuf,
    /// Interface language.
    pub language: Option<String>,
    /// Salt for sealed ids and password digests.
    pub session_salt: String,
    /// Adds error chains to error responses.
    pub debug: bool,
    /// Directory for uploaded files.
    pub upload_dir: Option<PathBuf>,
    /// Public URL of the upload directory.
    pub upload_url: String,
    /// Controller used when no route matches.
    pub default_controller: String,
    /// Accepts plain integer ids from clients.
    pub allow_plain_ids: bool,
    /// Nested widget tree.
    pub widgets: Value,
}

impl Default for ApplicationOptions {
    fn default() -> Self {
        Self {
            name: "Formwork".to_string(),
            url: String::new(),
            rewrite_base: "/".to_string(),
            src_dir: PathBuf::from("src"),
            language: None,
            session_salt: String::new(),
            debug: false,
            upload_dir: None,
            upload_url: String::new(),
            default_controller: DESKTOP_CONTROLLER.to_string(),
            allow_plain_ids: false,
            widgets: Value::Object(Map::new()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Application assembly and install errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Widget failed to load.
    #[error(transparent)]
    Widget(#[from] WidgetError),
    /// Model registration or validation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Route pattern failed to compile.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Required component was not provided.
    #[error("missing application component: {0}")]
    MissingComponent(String),
}

/// Render pipeline errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// Controller is not registered.
    #[error("Controller not found: {0}")]
    ControllerNotFound(String),
    /// Controller refuses the requesting interface.
    #[error("Controller is not enabled in {0} interface.")]
    InterfaceDisabled(&'static str),
    /// Request needs a signed-in user.
    #[error("Not authenticated.")]
    NotAuthenticated,
    /// Signed-in user lacks the permission.
    #[error("Not enough permissions ({permission}).{}", sign_in_hint(.signed_in))]
    NotEnoughPermissions {
        /// Missing permission.
        permission: String,
        /// Whether a user was signed in.
        signed_in: bool,
    },
    /// Uid failed validation.
    #[error("Invalid UID: {0}")]
    InvalidUid(String),
    /// Request parameters are invalid.
    #[error("{0}")]
    BadRequest(String),
    /// Model is not registered.
    #[error("{0}")]
    ModelNotFound(String),
    /// Record does not exist.
    #[error("{0}")]
    RecordNotFound(String),
    /// List query is invalid.
    #[error("{0}")]
    InvalidQuery(String),
    /// Columns failed normalization.
    #[error("Invalid inputs.")]
    InvalidInputs(BTreeMap<String, String>),
    /// Unique constraint violated.
    #[error("{0}")]
    UniqueViolation(String),
    /// View failed to render.
    #[error("View failed to render.")]
    View(#[source] ViewError),
    /// Store failure.
    #[error("Store operation failed.")]
    Store(#[source] StoreError),
    /// Unexpected failure.
    #[error("{0}")]
    Internal(String),
}

/// Hint appended to permission errors of signed-in users.
const fn sign_in_hint(signed_in: &bool) -> &'static str {
    if *signed_in { " Sign out and sign in again." } else { "" }
}

impl RenderError {
    /// Returns the HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::ControllerNotFound(_)
            | Self::InterfaceDisabled(_)
            | Self::InvalidUid(_)
            | Self::BadRequest(_)
            | Self::InvalidQuery(_) => 400,
            Self::NotAuthenticated => 401,
            Self::NotEnoughPermissions {
                ..
            } => 403,
            Self::ModelNotFound(_) | Self::RecordNotFound(_) => 404,
            Self::InvalidInputs(_) | Self::UniqueViolation(_) => 422,
            Self::View(_) | Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ControllerNotFound(_) => "controller_not_found",
            Self::InterfaceDisabled(_) => "interface_disabled",
            Self::NotAuthenticated => "not_authenticated",
            Self::NotEnoughPermissions {
                ..
            } => "not_enough_permissions",
            Self::InvalidUid(_) => "invalid_uid",
            Self::BadRequest(_) => "bad_request",
            Self::ModelNotFound(_) => "model_not_found",
            Self::RecordNotFound(_) => "record_not_found",
            Self::InvalidQuery(_) => "invalid_query",
            Self::InvalidInputs(_) => "invalid_inputs",
            Self::UniqueViolation(_) => "unique_violation",
            Self::View(_) => "view_error",
            Self::Store(_) => "store_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<IdCodecError> for RenderError {
    fn from(err: IdCodecError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<UidError> for RenderError {
    fn from(err: UidError) -> Self {
        match err {
            UidError::InvalidUid(uid) => Self::InvalidUid(uid),
        }
    }
}

impl From<ViewError> for RenderError {
    fn from(err: ViewError) -> Self {
        Self::View(err)
    }
}

impl From<StoreError> for RenderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(columns) => {
                Self::UniqueViolation(RecordSaveError::UniqueViolation(columns).to_string())
            }
            other => Self::Store(other),
        }
    }
}

impl From<RecordError> for RenderError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Registry(err) => Self::ModelNotFound(err.to_string()),
            err @ RecordError::RecordNotFound {
                ..
            } => Self::RecordNotFound(err.to_string()),
            RecordError::InvalidQuery(message) => Self::InvalidQuery(message),
            RecordError::Store(err) => err.into(),
        }
    }
}

impl From<RecordSaveError> for RenderError {
    fn from(err: RecordSaveError) -> Self {
        match err {
            RecordSaveError::InvalidInputs(inputs) => Self::InvalidInputs(inputs),
            err @ RecordSaveError::UniqueViolation(_) => Self::UniqueViolation(err.to_string()),
            RecordSaveError::Registry(err) => Self::ModelNotFound(err.to_string()),
            RecordSaveError::Store(err) => err.into(),
        }
    }
}

// ============================================================================
// SECTION: Requests and Responses
// ============================================================================

/// Interface-neutral request.
#[derive(Debug, Clone)]
pub struct AppRequest {
    /// Request route without the rewrite base.
    pub route: String,
    /// Merged request parameters.
    pub params: Map<String, Value>,
    /// Bearer token.
    pub token: Option<String>,
    /// Requesting interface.
    pub interface: Interface,
    /// Content-only rendering without the desktop layout.
    pub ajax: bool,
    /// Client expects JSON.
    pub json: bool,
}

impl AppRequest {
    /// Creates a web request for `route`.
    #[must_use]
    pub fn web(route: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            route: route.into(),
            params,
            token: None,
            interface: Interface::Web,
            ajax: false,
            json: false,
        }
    }

    /// Creates a CLI request for `route`.
    #[must_use]
    pub fn cli(route: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            interface: Interface::Cli,
            ..Self::web(route, params)
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Marks the request as expecting JSON.
    #[must_use]
    pub const fn expecting_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Returns true when errors should be answered with JSON.
    #[must_use]
    pub fn wants_json(&self) -> bool {
        self.json || self.route.trim_matches('/').starts_with("api/")
    }

    /// Returns true for content-only requests.
    #[must_use]
    pub fn is_ajax(&self) -> bool {
        self.ajax || self.params.contains_key(AJAX_PARAM)
    }
}

/// Interface-neutral response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content type.
    pub content_type: &'static str,
    /// Response body.
    pub body: String,
    /// Redirect target.
    pub location: Option<String>,
}

impl AppResponse {
    /// Builds a JSON response.
    #[must_use]
    pub fn json(status: u16, payload: &Value) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_JSON,
            body: payload.to_string(),
            location: None,
        }
    }

    /// Builds an HTML response.
    #[must_use]
    pub const fn html(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_HTML,
            body,
            location: None,
        }
    }

    /// Builds a redirect response.
    #[must_use]
    pub const fn redirect(location: String) -> Self {
        Self {
            status: 302,
            content_type: CONTENT_TYPE_HTML,
            body: String::new(),
            location: Some(location),
        }
    }

    /// Parses the body as JSON.
    #[must_use]
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Install outcome for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallOutcome {
    /// Model name.
    pub model: String,
    /// Table name.
    pub table: String,
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Assembles an [`Application`].
pub struct ApplicationBuilder {
    /// Runtime options.
    options: ApplicationOptions,
    /// Record store.
    store: Option<Arc<dyn RecordStore>>,
    /// Settings store.
    settings_store: Option<Arc<dyn SettingsStore>>,
    /// View renderer.
    views: Option<Arc<dyn ViewRenderer>>,
    /// Token authenticator.
    authenticator: Option<Arc<dyn Authenticator>>,
    /// Role permissions.
    policy: PermissionPolicy,
    /// Event plugins.
    plugins: PluginHost,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Controllers.
    controllers: ControllerRegistry,
    /// Models registered in addition to widget models.
    models: Vec<ModelSpec>,
}

impl ApplicationBuilder {
    /// Creates a builder with built-in controllers and a no-op audit sink.
    #[must_use]
    pub fn new(options: ApplicationOptions) -> Self {
        Self {
            options,
            store: None,
            settings_store: None,
            views: None,
            authenticator: None,
            policy: PermissionPolicy::default(),
            plugins: PluginHost::new(),
            audit: Arc::new(NoopAuditSink),
            controllers: ControllerRegistry::with_builtins(),
            models: Vec::new(),
        }
    }

    /// Uses one backend for records and settings.
    #[must_use]
    pub fn store<S>(mut self, store: Arc<S>) -> Self
    where
        S: RecordStore + SettingsStore + 'static,
    {
        self.store = Some(store.clone());
        self.settings_store = Some(store);
        self
    }

    /// Overrides the settings store.
    #[must_use]
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets the view renderer.
    #[must_use]
    pub fn views(mut self, views: Arc<dyn ViewRenderer>) -> Self {
        self.views = Some(views);
        self
    }

    /// Sets the token authenticator.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Sets the role permissions.
    #[must_use]
    pub fn policy(mut self, policy: PermissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registers a plugin.
    #[must_use]
    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.register(plugin);
        self
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Registers a controller, replacing a built-in one with the same name.
    #[must_use]
    pub fn controller(mut self, controller: Arc<dyn Controller>) -> Self {
        self.controllers.register(controller);
        self
    }

    /// Registers a model outside any widget.
    #[must_use]
    pub fn model(mut self, model: ModelSpec) -> Self {
        self.models.push(model);
        self
    }

    /// Loads widgets, validates models, and builds the application.
    ///
    /// Without a store the application runs on an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] when a widget, model, route, or the settings
    /// store fails to load, or no view renderer was provided.
    pub fn build(self) -> Result<Application, AppError> {
        let views =
            self.views.ok_or_else(|| AppError::MissingComponent("view renderer".to_string()))?;
        let (store, settings_store): (Arc<dyn RecordStore>, Arc<dyn SettingsStore>) =
            match (self.store, self.settings_store) {
                (Some(store), Some(settings)) => (store, settings),
                (Some(_), None) => {
                    return Err(AppError::MissingComponent("settings store".to_string()));
                }
                (None, settings) => {
                    let memory = Arc::new(InMemoryRecordStore::new());
                    let store: Arc<dyn RecordStore> = memory.clone();
                    (store, settings.unwrap_or(memory))
                }
            };

        let loader = WidgetLoader::new(self.options.src_dir.join("Widgets"));
        let mut widgets = Vec::new();
        for name in enabled_widgets(&self.options.widgets) {
            widgets.push(loader.load(&name)?);
        }

        let mut registry = ModelRegistry::new();
        for model in widgets.iter().flat_map(|widget| widget.models.iter()) {
            registry.register(model.clone())?;
        }
        for model in self.models {
            registry.register(model)?;
        }
        registry.validate()?;

        let mut router = Router::with_builtin_routes()?;
        for widget in &widgets {
            for route in &widget.manifest.routes {
                router.add_spec(route.clone())?;
            }
        }

        let settings = SettingsTree::from_rows(settings_store.load_settings()?);
        let codec = IdCodec::new(self.options.session_salt.clone(), self.options.allow_plain_ids);
        let translator = Translator::new(self.options.src_dir.clone());

        Ok(Application {
            options: self.options,
            registry,
            router,
            controllers: self.controllers,
            store,
            settings_store,
            settings: RwLock::new(settings),
            views,
            authenticator: self.authenticator,
            policy: self.policy,
            plugins: self.plugins,
            audit: self.audit,
            codec,
            translator,
            widgets,
        })
    }
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// Loaded application.
pub struct Application {
    /// Runtime options.
    options: ApplicationOptions,
    /// Registered models.
    registry: ModelRegistry,
    /// Route table.
    router: Router,
    /// Controllers.
    controllers: ControllerRegistry,
    /// Record store.
    store: Arc<dyn RecordStore>,
    /// Settings store.
    settings_store: Arc<dyn SettingsStore>,
    /// Live settings tree.
    settings: RwLock<SettingsTree>,
    /// View renderer.
    views: Arc<dyn ViewRenderer>,
    /// Token authenticator.
    authenticator: Option<Arc<dyn Authenticator>>,
    /// Role permissions.
    policy: PermissionPolicy,
    /// Event plugins.
    plugins: PluginHost,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Record id codec.
    codec: IdCodec,
    /// Translation dictionaries.
    translator: Translator,
    /// Loaded widgets.
    widgets: Vec<LoadedWidget>,
}

/// Per-request facts reported in the render audit event.
#[derive(Default)]
struct RenderTrace {
    /// Controller that handled the request.
    controller: String,
    /// Signed-in user id.
    user: Option<String>,
}

impl Application {
    /// Starts assembling an application.
    #[must_use]
    pub fn builder(options: ApplicationOptions) -> ApplicationBuilder {
        ApplicationBuilder::new(options)
    }

    /// Returns the runtime options.
    #[must_use]
    pub const fn options(&self) -> &ApplicationOptions {
        &self.options
    }

    /// Returns the model registry.
    #[must_use]
    pub const fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Returns the router.
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the controllers.
    #[must_use]
    pub const fn controllers(&self) -> &ControllerRegistry {
        &self.controllers
    }

    /// Returns the permission policy.
    #[must_use]
    pub const fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }

    /// Returns the id codec.
    #[must_use]
    pub const fn codec(&self) -> &IdCodec {
        &self.codec
    }

    /// Returns the plugin host.
    #[must_use]
    pub const fn plugins(&self) -> &PluginHost {
        &self.plugins
    }

    /// Returns the loaded widgets.
    #[must_use]
    pub fn widgets(&self) -> &[LoadedWidget] {
        &self.widgets
    }

    /// Returns the translator.
    #[must_use]
    pub const fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Returns a record service bound to the store.
    #[must_use]
    pub fn records(&self) -> RecordService<'_> {
        let normalize = NormalizeContext::new(
            self.options.upload_dir.clone(),
            self.options.session_salt.clone(),
        );
        RecordService::new(&self.registry, self.store.as_ref(), normalize)
    }

    /// Returns the settings service.
    #[must_use]
    pub fn settings(&self) -> SettingsService<'_> {
        SettingsService::new(self.settings_store.as_ref(), &self.settings, self.audit.as_ref())
    }

    /// Records an audit event.
    pub fn audit(&self, event: &AuditEvent) {
        self.audit.record(event);
    }

    /// Translates `source` into the application language.
    #[must_use]
    pub fn translate(&self, source: &str, context: &str, vars: &Map<String, Value>) -> String {
        self.translator.translate(source, context, self.options.language.as_deref(), vars)
    }

    /// Resolves a bearer token.
    #[must_use]
    pub fn authenticate(&self, token: Option<&str>) -> Option<User> {
        let token = token.filter(|token| !token.is_empty())?;
        self.authenticator.as_ref().and_then(|auth| auth.authenticate(token))
    }

    /// Creates the tables of all registered models in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] when a table cannot be created; no table
    /// is kept in that case.
    pub fn install(&self) -> Result<Vec<InstallOutcome>, AppError> {
        let mut tx = self.store.begin()?;
        let mut outcomes = Vec::new();
        for model in self.registry.models() {
            if let Err(err) = tx.create_table(&self.registry.table_schema(model)) {
                self.audit(&AuditEvent::install_model(model.name.as_str(), &err.to_string()));
                return Err(err.into());
            }
            outcomes.push(InstallOutcome {
                model: model.name.to_string(),
                table: model.table.clone(),
            });
        }
        tx.commit()?;
        for outcome in &outcomes {
            self.audit(&AuditEvent::install_model(&outcome.model, "installed"));
        }
        let models: Vec<&str> = outcomes.iter().map(|outcome| outcome.model.as_str()).collect();
        let _outcome = self.plugins.dispatch(EVENT_AFTER_INSTALL, json!({"models": models}));
        Ok(outcomes)
    }

    /// Serves one request.
    #[must_use]
    pub fn render(&self, request: &AppRequest) -> AppResponse {
        let started = Instant::now();
        let mut trace = RenderTrace::default();
        let response = match self.dispatch(request, &mut trace) {
            Ok(response) => response,
            Err(err) => self.error_response(request, &err),
        };
        self.audit(&AuditEvent::render(RenderAuditParams {
            route: request.route.trim_matches('/').to_string(),
            controller: trace.controller,
            status: response.status,
            user: trace.user,
            interface: request.interface.as_str(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }));
        response
    }

    /// Runs the pipeline up to a response.
    fn dispatch(
        &self,
        request: &AppRequest,
        trace: &mut RenderTrace,
    ) -> Result<AppResponse, RenderError> {
        let route = request.route.trim_matches('/');
        let mut params = request.params.clone();
        params.remove("route");

        let target = self.router.resolve(route);
        for (key, value) in target.params.clone() {
            params.insert(key, value);
        }

        if params.contains_key(SIGN_OUT_PARAM) {
            return Ok(AppResponse::redirect(format!("{}?signed-out", self.options.rewrite_base)));
        }

        let name = if target.controller.is_empty() {
            self.options.default_controller.clone()
        } else {
            target.controller.clone()
        };
        trace.controller.clone_from(&name);
        let mut controller =
            self.controllers.get(&name).ok_or(RenderError::ControllerNotFound(name))?;
        let mut permission = target.permission.clone().or_else(|| controller.permission(&params));
        let mut view = target.view.clone();

        let interface_enabled = match request.interface {
            Interface::Cli => controller.cli_enabled(),
            Interface::Web => controller.web_enabled(),
        };
        if !interface_enabled {
            return Err(RenderError::InterfaceDisabled(request.interface.label()));
        }

        let user = self.authenticate(request.token.as_deref());
        trace.user = user.as_ref().map(|user| user.id.to_string());
        if controller.requires_authentication() && user.is_none() {
            if request.wants_json() {
                return Err(RenderError::NotAuthenticated);
            }
            controller = self
                .controllers
                .get(SIGN_IN_CONTROLLER)
                .ok_or_else(|| RenderError::ControllerNotFound(SIGN_IN_CONTROLLER.to_string()))?;
            trace.controller = SIGN_IN_CONTROLLER.to_string();
            permission = controller.permission(&params);
            view = None;
        }
        if let Some(permission) = permission {
            let allowed = user.as_ref().is_some_and(|user| self.policy.allows(user, &permission));
            if !allowed {
                return Err(RenderError::NotEnoughPermissions {
                    permission,
                    signed_in: user.is_some(),
                });
            }
        }

        let uid = Uid::generate(controller.name(), params.get("uid").and_then(Value::as_str))?;

        let before = json!({
            "route": route,
            "controller": controller.name(),
            "params": Value::Object(params),
        });
        let params = match self.plugins.dispatch(EVENT_BEFORE_RENDER, before) {
            EventOutcome::Stop(payload) => return Ok(AppResponse::json(200, &payload)),
            EventOutcome::Continue(mut payload) => match payload.get_mut("params").map(Value::take) {
                Some(Value::Object(params)) => params,
                _ => Map::new(),
            },
        };

        let ctx = ControllerContext {
            app: self,
            params: &params,
            user: user.as_ref(),
            uid: &uid,
            interface: request.interface,
            route,
        };
        if let Some(payload) = controller.render_json(&ctx)? {
            return Ok(AppResponse::json(200, &payload));
        }

        let view = view.unwrap_or_else(|| controller.view());
        let view_params = controller.view_params(&ctx)?;
        let content = self.views.render(&view, &self.view_context(&ctx, view_params.clone()))?;
        if request.is_ajax() || controller.hide_default_desktop() {
            return Ok(AppResponse::html(200, content));
        }
        self.wrap_in_desktop(&ctx, content, view_params).map(|body| AppResponse::html(200, body))
    }

    /// Builds the template parameters shared by every view.
    fn view_context(&self, ctx: &ControllerContext<'_>, view_params: Value) -> Value {
        let route_url = if ctx.route.is_empty() {
            self.options.url.clone()
        } else {
            format!("{}/{}", self.options.url, ctx.route)
        };
        json!({
            "uid": ctx.uid.as_str(),
            "user": ctx.user,
            "config": {
                "name": self.options.name,
                "url": self.options.url,
                "rewriteBase": self.options.rewrite_base,
                "language": self.options.language,
                "uploadUrl": self.options.upload_url,
                "debug": self.options.debug,
            },
            "routeUrl": route_url,
            "routeParams": Value::Object(ctx.params.clone()),
            "route": ctx.route,
            "viewParams": view_params,
            "windowParams": ctx.params.get("windowParams").cloned().unwrap_or(Value::Null),
        })
    }

    /// Renders controller content inside the desktop layout.
    fn wrap_in_desktop(
        &self,
        ctx: &ControllerContext<'_>,
        content: String,
        view_params: Value,
    ) -> Result<String, RenderError> {
        let Some(desktop) = self.controllers.get(DESKTOP_CONTROLLER) else {
            return Ok(content);
        };
        let mut params = match desktop.view_params(ctx)? {
            Value::Object(params) => params,
            _ => Map::new(),
        };
        if let Value::Object(extra) = view_params {
            params.extend(extra);
        }
        params.insert("contentHtml".to_string(), Value::String(content));
        let context = self.view_context(ctx, Value::Object(params));
        Ok(self.views.render(&desktop.view(), &context)?)
    }

    /// Converts a pipeline error into a response.
    fn error_response(&self, request: &AppRequest, err: &RenderError) -> AppResponse {
        let message = err.to_string();
        let mut payload = json!({
            "status": "error",
            "code": err.code(),
            "message": message,
        });
        if let RenderError::InvalidInputs(inputs) = err {
            payload["invalidInputs"] = json!(inputs);
        }
        if self.options.debug {
            payload["chain"] = json!(error_chain(err));
        }
        if request.wants_json() || request.interface == Interface::Cli {
            return AppResponse::json(err.status(), &payload);
        }
        let body = self
            .views
            .render(FATAL_VIEW, &json!({"error": payload, "config": {"name": self.options.name}}))
            .unwrap_or_else(|_| {
                format!("<!DOCTYPE html><html><body><h1>{}</h1></body></html>", escape_html(&message))
            });
        AppResponse::html(err.status(), body)
    }
}

/// Collects an error and its sources as strings.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(next) = source {
        chain.push(next.to_string());
        source = next.source();
    }
    chain
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn render_errors_map_to_http_statuses() {
        assert_eq!(RenderError::ControllerNotFound("X".to_string()).status(), 400);
        assert_eq!(RenderError::NotAuthenticated.status(), 401);
        let denied = RenderError::NotEnoughPermissions {
            permission: "Crm/Customer:Read".to_string(),
            signed_in: true,
        };
        assert_eq!(denied.status(), 403);
        assert_eq!(
            denied.to_string(),
            "Not enough permissions (Crm/Customer:Read). Sign out and sign in again."
        );
        assert_eq!(RenderError::InvalidInputs(BTreeMap::new()).status(), 422);
        assert_eq!(RenderError::Store(StoreError::Io("down".to_string())).status(), 500);
    }

    #[test]
    fn error_chain_lists_underlying_causes() {
        let err: RenderError = StoreError::Io("disk full".to_string()).into();
        assert_eq!(
            error_chain(&err),
            vec!["Store operation failed.", "record store io error: disk full"]
        );
        let err: RenderError = ViewError::NotFound("Crm/Customers".to_string()).into();
        assert_eq!(
            error_chain(&err),
            vec!["View failed to render.", "view not found: Crm/Customers"]
        );
        assert_eq!(error_chain(&RenderError::NotAuthenticated), vec!["Not authenticated."]);
    }

    #[test]
    fn unique_store_errors_become_unique_violations() {
        let err: RenderError = StoreError::UniqueViolation("code".to_string()).into();
        assert_eq!(err, RenderError::UniqueViolation("Record already exists (code).".to_string()));
    }

    #[test]
    fn interface_errors_name_the_interface() {
        assert_eq!(
            RenderError::InterfaceDisabled(Interface::Cli.label()).to_string(),
            "Controller is not enabled in CLI interface."
        );
    }

    #[test]
    fn api_routes_want_json() {
        assert!(AppRequest::web("/api/record/get", Map::new()).wants_json());
        assert!(!AppRequest::web("crm/customers", Map::new()).wants_json());
        assert!(AppRequest::web("x", Map::new()).expecting_json().wants_json());
    }
}
