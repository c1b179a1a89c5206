// formwork-config/src/config.rs
// ============================================================================
// Module: Formwork Configuration
// Description: Configuration loading, finalization, and validation.
// Purpose: Provide strict, fail-closed parsing of `formwork.toml`.
// Dependencies: formwork-core, formwork-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! After parsing, derived defaults are filled relative to the config file:
//! `account_dir` defaults to the directory holding the file, relative
//! directories resolve against it, and the upload directory and URL derive
//! from `account_dir` and `url`.
//! Invariants:
//! - A loaded config has absolute-or-account-relative paths resolved.
//! - `auth.users` tokens are unique and non-empty.
//! - Memory stores never carry a path; sqlite stores always do.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use formwork_core::ApplicationOptions;
use formwork_core::PermissionPolicy;
use formwork_core::RoleName;
use formwork_core::User;
use formwork_core::UserId;
use formwork_store_sqlite::SqliteStoreConfig;
use formwork_store_sqlite::SqliteStoreMode;
use formwork_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "formwork.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "FORMWORK_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of configured users.
pub(crate) const MAX_AUTH_USERS: usize = 256;
/// Maximum length of a user token.
pub(crate) const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Default request body limit (10 MiB).
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
/// Largest accepted request body limit (1 GiB).
pub(crate) const MAX_MAX_BODY_BYTES: usize = 1024 * 1024 * 1024;
/// Default `SQLite` busy timeout in milliseconds.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Formwork application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormworkConfig {
    /// Application settings.
    #[serde(default)]
    pub app: AppConfig,
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Record store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Bearer-token users.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Role permission grants.
    #[serde(default)]
    pub permissions: PermissionsConfig,
    /// Nested widget enablement tree.
    #[serde(default = "empty_object")]
    pub widgets: Value,
    /// Audit sink settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl FormworkConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let base = resolved.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::from_toml_str(content, &base)
    }

    /// Parses, finalizes, and validates configuration text.
    ///
    /// `base_dir` is the directory the configuration belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.finalize(base_dir);
        config.validate()?;
        Ok(config)
    }

    /// Fills derived defaults relative to `base_dir`.
    pub fn finalize(&mut self, base_dir: &Path) {
        let base = if base_dir.as_os_str().is_empty() { Path::new(".") } else { base_dir };
        let account_dir = self.app.account_dir.get_or_insert_with(|| base.to_path_buf()).clone();
        if self.app.src_dir.is_relative() {
            self.app.src_dir = account_dir.join(&self.app.src_dir);
        }
        let upload_dir = self.app.upload_dir.take().map_or_else(
            || format!("{}/upload", account_dir.display()),
            |dir| {
                let dir = PathBuf::from(dir);
                if dir.is_relative() {
                    account_dir.join(dir).display().to_string()
                } else {
                    dir.display().to_string()
                }
            },
        );
        self.app.upload_dir = Some(upload_dir.replace('\\', "/"));
        if self.app.upload_url.is_none() {
            self.app.upload_url = Some(format!("{}/upload", self.app.url.trim_end_matches('/')));
        }
        if let Some(path) = &self.store.path
            && path.is_relative()
        {
            self.store.path = Some(account_dir.join(path));
        }
        if let Some(path) = &self.audit.path
            && path.is_relative()
        {
            self.audit.path = Some(account_dir.join(path));
        }
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.app.validate()?;
        self.server.validate()?;
        self.store.validate()?;
        self.auth.validate()?;
        self.permissions.validate()?;
        self.audit.validate()?;
        if !(self.widgets.is_object() || self.widgets.is_null()) {
            return Err(ConfigError::Invalid("widgets must be a table".to_string()));
        }
        Ok(())
    }

    /// Returns runtime options for the application builder.
    #[must_use]
    pub fn application_options(&self) -> ApplicationOptions {
        ApplicationOptions {
            name: self.app.name.clone(),
            url: self.app.url.trim_end_matches('/').to_string(),
            rewrite_base: self.app.rewrite_base.clone(),
            src_dir: self.app.src_dir.clone(),
            language: Some(self.app.language.clone()),
            session_salt: self.app.session_salt.clone(),
            debug: self.app.debug,
            upload_dir: self.app.upload_dir.as_ref().map(PathBuf::from),
            upload_url: self.app.upload_url.clone().unwrap_or_default(),
            default_controller: self.app.default_controller.clone(),
            allow_plain_ids: self.app.allow_plain_ids,
            widgets: if self.widgets.is_null() { empty_object() } else { self.widgets.clone() },
        }
    }

    /// Returns the role permission policy.
    #[must_use]
    pub fn permission_policy(&self) -> PermissionPolicy {
        PermissionPolicy::new(self.permissions.roles.clone())
    }
}

/// Returns an empty JSON object.
fn empty_object() -> Value {
    Value::Object(Map::new())
}

// ============================================================================
// SECTION: App
// ============================================================================

/// `[app]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name.
    pub name: String,
    /// Public base URL.
    pub url: String,
    /// URL path prefix of the application.
    pub rewrite_base: String,
    /// Account directory; defaults to the config file directory.
    pub account_dir: Option<PathBuf>,
    /// Source directory, relative to `account_dir` unless absolute.
    pub src_dir: PathBuf,
    /// Interface language.
    pub language: String,
    /// Display timezone passed to views.
    pub timezone: String,
    /// Salt for sealed ids and password digests.
    pub session_salt: String,
    /// Adds error chains to error responses.
    pub debug: bool,
    /// Upload directory; defaults to `{account_dir}/upload`.
    pub upload_dir: Option<String>,
    /// Upload URL; defaults to `{url}/upload`.
    pub upload_url: Option<String>,
    /// Controller used when no route matches.
    pub default_controller: String,
    /// Accepts plain integer ids from clients.
    pub allow_plain_ids: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            url: String::new(),
            rewrite_base: "/".to_string(),
            account_dir: None,
            src_dir: PathBuf::from("src"),
            language: "en".to_string(),
            timezone: "Europe/Bratislava".to_string(),
            session_salt: String::new(),
            debug: false,
            upload_dir: None,
            upload_url: None,
            default_controller: "Desktop".to_string(),
            allow_plain_ids: false,
        }
    }
}

impl AppConfig {
    /// Validates application settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("app.name must be non-empty".to_string()));
        }
        if !self.rewrite_base.starts_with('/') || !self.rewrite_base.ends_with('/') {
            return Err(ConfigError::Invalid(
                "app.rewrite_base must start and end with '/'".to_string(),
            ));
        }
        if self.session_salt.trim().is_empty() && !self.allow_plain_ids {
            return Err(ConfigError::Invalid(
                "app.session_salt is required unless app.allow_plain_ids is set".to_string(),
            ));
        }
        if self.language.trim().is_empty()
            || !self.language.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            return Err(ConfigError::Invalid(
                "app.language must be a language code".to_string(),
            ));
        }
        if self.default_controller.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "app.default_controller must be non-empty".to_string(),
            ));
        }
        validate_path_string("app.src_dir", &self.src_dir.display().to_string())?;
        if let Some(dir) = &self.account_dir {
            validate_path_string("app.account_dir", &dir.display().to_string())?;
        }
        if let Some(dir) = &self.upload_dir {
            validate_path_string("app.upload_dir", dir)?;
        }
        Ok(())
    }
}

/// Returns the default application name.
fn default_app_name() -> String {
    "Formwork".to_string()
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid server.bind: {}", self.bind)))
    }

    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_MAX_BODY_BYTES {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be between 1 and 1 GiB".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Returns the `SQLite` store config when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Validates store settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
                validate_path_string("store.path", &path.display().to_string())
            }
        }
    }
}

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

/// Returns the default busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Auth
// ============================================================================

/// `[auth]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Bearer-token users.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl AuthConfig {
    /// Returns `(token, user)` pairs.
    #[must_use]
    pub fn token_users(&self) -> Vec<(String, User)> {
        self.users.iter().map(|user| (user.token.clone(), user.to_user())).collect()
    }

    /// Validates user entries.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.users.len() > MAX_AUTH_USERS {
            return Err(ConfigError::Invalid("auth.users exceeds limit".to_string()));
        }
        let mut tokens = BTreeSet::new();
        let mut ids = BTreeSet::new();
        for user in &self.users {
            let token = user.token.trim();
            if token.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "auth.users token for {} must be non-empty",
                    user.id
                )));
            }
            if token.len() > MAX_AUTH_TOKEN_LENGTH {
                return Err(ConfigError::Invalid("auth.users token too long".to_string()));
            }
            if token.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(
                    "auth.users token must not contain whitespace".to_string(),
                ));
            }
            if user.id.trim().is_empty() {
                return Err(ConfigError::Invalid("auth.users id must be non-empty".to_string()));
            }
            if !tokens.insert(token) {
                return Err(ConfigError::Invalid("auth.users tokens must be unique".to_string()));
            }
            if !ids.insert(user.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate auth.users id: {}", user.id)));
            }
        }
        Ok(())
    }
}

/// `[[auth.users]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// User identifier.
    pub id: String,
    /// Login shown in views; defaults to the id.
    #[serde(default)]
    pub login: Option<String>,
    /// Bearer token.
    pub token: String,
    /// Granted roles.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserConfig {
    /// Converts the entry into a runtime user.
    #[must_use]
    pub fn to_user(&self) -> User {
        User {
            id: UserId::new(self.id.clone()),
            login: self.login.clone().unwrap_or_else(|| self.id.clone()),
            roles: self.roles.iter().map(RoleName::new).collect(),
        }
    }
}

// ============================================================================
// SECTION: Permissions
// ============================================================================

/// `[permissions]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionsConfig {
    /// Permission patterns granted per role.
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,
}

impl PermissionsConfig {
    /// Validates role grants.
    fn validate(&self) -> Result<(), ConfigError> {
        for (role, patterns) in &self.roles {
            if role.trim().is_empty() {
                return Err(ConfigError::Invalid("permission role must be non-empty".to_string()));
            }
            if patterns.iter().any(|pattern| pattern.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "permissions.roles.{role} contains an empty pattern"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// `[audit]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Emits audit events when true.
    pub enabled: bool,
    /// JSON lines file; stderr when absent.
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", &path.display().to_string())?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
