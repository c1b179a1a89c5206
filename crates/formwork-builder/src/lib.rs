// formwork-builder/src/lib.rs
// ============================================================================
// Module: Formwork Builder Library
// Description: Prototype-driven scaffolding of Formwork applications.
// Purpose: Generate an application directory from a JSON or YAML prototype.
// Dependencies: formwork-core, minijinja, rand, serde_json, serde_yaml, time, toml
// ============================================================================

//! ## Overview
//! A prototype names the application configuration (`ConfigApp`, optional
//! `ConfigEnv`) and its widgets with models and actions. [`build`] renders
//! `formwork.toml`, the desktop views, and one folder per widget. Files
//! whose regenerate tag was removed are left untouched on later builds.

pub mod builder;
pub mod prototype;
pub mod templates;

pub use builder::BuildError;
pub use builder::BuildOptions;
pub use builder::BuildReport;
pub use builder::Builder;
pub use builder::build;
pub use prototype::Prototype;
pub use templates::REGENERATE_ALLOWED_TAG;
