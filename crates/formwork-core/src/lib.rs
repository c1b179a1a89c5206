// formwork-core/src/lib.rs
// ============================================================================
// Module: Formwork Core Library
// Description: Models, data types, routing, permissions, records, and rendering.
// Purpose: Provide the store- and template-agnostic core of a Formwork application.
// Dependencies: serde, serde_json, regex, sha2, subtle, time, toml, serde_yaml
// ============================================================================

//! ## Overview
//! Formwork core loads declarative model definitions, normalizes form input
//! through column data types, persists nested records through the save
//! cascade, and routes HTTP or CLI requests to controllers and views.
//! Storage and templating sit behind the traits in [`interfaces`].
//! Invariants:
//! - Record writes of one save run inside a single store transaction.
//! - Record ids leave the core sealed unless plain ids are enabled.
//! - Permissions are checked before any controller runs.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;
pub use crate::interfaces::Authenticator;
pub use crate::interfaces::ListQuery;
pub use crate::interfaces::OrderBy;
pub use crate::interfaces::RecordPage;
pub use crate::interfaces::RecordStore;
pub use crate::interfaces::RecordTx;
pub use crate::interfaces::SettingsStore;
pub use crate::interfaces::StoreError;
pub use crate::interfaces::TableSchema;
pub use crate::interfaces::ViewError;
pub use crate::interfaces::ViewRenderer;
pub use crate::runtime::AppError;
pub use crate::runtime::AppRequest;
pub use crate::runtime::AppResponse;
pub use crate::runtime::Application;
pub use crate::runtime::ApplicationBuilder;
pub use crate::runtime::ApplicationOptions;
pub use crate::runtime::Interface;
pub use crate::runtime::ModelRegistry;
pub use crate::runtime::RenderError;
