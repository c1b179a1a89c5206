// formwork-store-sqlite/src/lib.rs
// ============================================================================
// Module: Formwork SQLite Store
// Description: SQLite-backed record and settings persistence.
// Purpose: Provide the durable store used by deployed Formwork applications.
// Dependencies: formwork-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteRecordStore`] implements the core record and settings store traits
//! on a single `SQLite` database file. Model tables are created on install
//! from their [`formwork_core::TableSchema`].

// ============================================================================
// SECTION: Modules
// ============================================================================

mod sql;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteRecordStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
