// formwork-config/src/lib.rs
// ============================================================================
// Module: Formwork Config Library
// Description: Loading and validation of `formwork.toml`.
// Purpose: Expose the application configuration model to the server and CLI.
// Dependencies: formwork-core, formwork-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! The configuration crate parses `formwork.toml`, fills derived defaults
//! relative to the config file location, and validates every section before
//! the application is assembled.

pub mod config;

pub use config::*;
