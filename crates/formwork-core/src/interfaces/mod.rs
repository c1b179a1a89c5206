// formwork-core/src/interfaces/mod.rs
// ============================================================================
// Module: Formwork Interfaces
// Description: Backend-agnostic interfaces for record stores, settings, views, and auth.
// Purpose: Define the contract between the Formwork runtime and its backends.
// Dependencies: crate::core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces decouple the runtime from persistence, templating, and
//! authentication. Record stores expose reads directly and writes through a
//! transaction guard: the save cascade opens one [`RecordTx`], performs every
//! nested write on it, and either commits or drops it. Dropping an
//! uncommitted transaction must roll it back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::ModelSpec;
use crate::core::RecordId;
use crate::core::SettingsRow;
use crate::core::User;
use crate::core::record::Record;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Record and settings store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("record store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("record store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("record store version mismatch: {0}")]
    VersionMismatch(String),
    /// Request or data is invalid.
    #[error("record store invalid data: {0}")]
    Invalid(String),
    /// Table for a model does not exist.
    #[error("record store missing table: {0}")]
    MissingTable(String),
    /// Unique constraint rejected a write.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    /// Store reported an error.
    #[error("record store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Sort order for list queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Column name or `id`.
    pub column: String,
    /// Sort descending when true.
    pub descending: bool,
}

impl Default for OrderBy {
    fn default() -> Self {
        Self {
            column: "id".to_string(),
            descending: true,
        }
    }
}

/// Paged list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Full-text search over searchable columns.
    pub search: Option<String>,
    /// Sort order.
    pub order_by: OrderBy,
    /// One-based page number.
    pub page: u32,
    /// Page size.
    pub items_per_page: u32,
    /// Column equality filters.
    pub filters: Map<String, Value>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: None,
            order_by: OrderBy::default(),
            page: 1,
            items_per_page: 25,
            filters: Map::new(),
        }
    }
}

impl ListQuery {
    /// Returns the row offset of the requested page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.items_per_page)
    }
}

/// One page of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    /// Records on this page.
    pub data: Vec<Record>,
    /// Total matching records.
    pub total: u64,
}

/// Table layout passed to stores on install.
#[derive(Debug, Clone)]
pub struct TableSchema<'a> {
    /// Model whose table is created.
    pub model: &'a ModelSpec,
    /// Referenced table per lookup column.
    pub lookup_tables: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Record Store
// ============================================================================

/// Transaction over a record store.
///
/// Dropping the transaction without [`RecordTx::commit`] rolls it back.
pub trait RecordTx {
    /// Creates the table for a model when missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the table cannot be created.
    fn create_table(&mut self, schema: &TableSchema<'_>) -> Result<(), StoreError>;

    /// Inserts a record and returns its new id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert(&mut self, model: &ModelSpec, record: &Record) -> Result<RecordId, StoreError>;

    /// Updates the given columns of a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn update(&mut self, model: &ModelSpec, id: RecordId, record: &Record)
    -> Result<(), StoreError>;

    /// Deletes a record; returns false when it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete(&mut self, model: &ModelSpec, id: RecordId) -> Result<bool, StoreError>;

    /// Reads a record inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get(&mut self, model: &ModelSpec, id: RecordId) -> Result<Option<Record>, StoreError>;

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Persistent record store.
pub trait RecordStore: Send + Sync {
    /// Begins a write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction cannot start.
    fn begin(&self) -> Result<Box<dyn RecordTx + '_>, StoreError>;

    /// Loads a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get(&self, model: &ModelSpec, id: RecordId) -> Result<Option<Record>, StoreError>;

    /// Lists records matching a query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list(&self, model: &ModelSpec, query: &ListQuery) -> Result<RecordPage, StoreError>;

    /// Loads records whose `foreign_key` equals `id`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn children(
        &self,
        model: &ModelSpec,
        foreign_key: &str,
        id: RecordId,
    ) -> Result<Vec<Record>, StoreError>;
}

// ============================================================================
// SECTION: Settings Store
// ============================================================================

/// Persistent settings rows.
pub trait SettingsStore: Send + Sync {
    /// Loads all settings rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load_settings(&self) -> Result<Vec<SettingsRow>, StoreError>;

    /// Inserts or replaces settings rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_settings(&self, rows: &[SettingsRow]) -> Result<(), StoreError>;

    /// Deletes `prefix` and every row below it; returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_settings_prefix(&self, prefix: &str) -> Result<usize, StoreError>;
}

// ============================================================================
// SECTION: View Renderer
// ============================================================================

/// View rendering errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    /// View template does not exist.
    #[error("view not found: {0}")]
    NotFound(String),
    /// Template failed to render.
    #[error("view render failed: {0}")]
    Render(String),
}

/// Renders named views with JSON parameters.
pub trait ViewRenderer: Send + Sync {
    /// Renders a view to HTML.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError`] when the view is missing or fails to render.
    fn render(&self, view: &str, params: &Value) -> Result<String, ViewError>;
}

// ============================================================================
// SECTION: Authentication
// ============================================================================

/// Resolves bearer tokens to users.
pub trait Authenticator: Send + Sync {
    /// Returns the user owning the token, if any.
    fn authenticate(&self, token: &str) -> Option<User>;
}
