// formwork-server/src/bootstrap.rs
// ============================================================================
// Module: Application Bootstrap
// Description: Assembles an Application from a loaded configuration.
// Purpose: Share one wiring path between the HTTP server and the CLI.
// Dependencies: formwork-config, formwork-core, formwork-store-sqlite, formwork-views
// ============================================================================

//! ## Overview
//! [`build_application`] selects the record store, creates the template
//! renderer, the token authenticator, and the audit sink, then builds the
//! [`Application`]. The upload directory is created when missing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::sync::Arc;

use formwork_config::AuditConfig;
use formwork_config::FormworkConfig;
use formwork_config::StoreType;
use formwork_core::Application;
use formwork_core::runtime::AuditSink;
use formwork_core::runtime::FileAuditSink;
use formwork_core::runtime::InMemoryRecordStore;
use formwork_core::runtime::NoopAuditSink;
use formwork_core::runtime::StderrAuditSink;
use formwork_store_sqlite::SqliteRecordStore;
use formwork_views::TemplateViews;
use formwork_views::ViewsOptions;
use serde_json::Value;

use crate::auth::TokenAuthenticator;
use crate::server::ServerError;

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

/// Builds an application from configuration.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the store, audit sink, or application
/// fails to initialize.
pub fn build_application(config: &FormworkConfig) -> Result<Application, ServerError> {
    let options = config.application_options();
    if let Some(upload_dir) = &options.upload_dir {
        fs::create_dir_all(upload_dir).map_err(|err| {
            ServerError::Init(format!("upload dir {} unavailable: {err}", upload_dir.display()))
        })?;
    }
    let policy = config.permission_policy();
    let mut views = ViewsOptions::new(&options.src_dir);
    views.policy = policy.clone();
    views.globals.insert("timezone".to_string(), Value::String(config.app.timezone.clone()));
    let builder = Application::builder(options)
        .views(Arc::new(TemplateViews::new(views)))
        .authenticator(Arc::new(TokenAuthenticator::new(config.auth.token_users())))
        .policy(policy)
        .audit(build_audit_sink(&config.audit)?);
    let builder = match config.store.store_type {
        StoreType::Memory => builder.store(Arc::new(InMemoryRecordStore::new())),
        StoreType::Sqlite => {
            let sqlite = config
                .store
                .sqlite()
                .ok_or_else(|| ServerError::Config("sqlite store requires path".to_string()))?;
            let store =
                SqliteRecordStore::new(&sqlite).map_err(|err| ServerError::Init(err.to_string()))?;
            builder.store(Arc::new(store))
        }
    };
    builder.build().map_err(|err| ServerError::Init(err.to_string()))
}

/// Builds the configured audit sink.
fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, ServerError> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).map_err(|err| ServerError::Init(err.to_string()))?;
            }
            let sink = FileAuditSink::new(path).map_err(|err| {
                ServerError::Init(format!("audit log {} unavailable: {err}", path.display()))
            })?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
