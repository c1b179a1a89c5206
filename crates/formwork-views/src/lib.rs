// formwork-views/src/lib.rs
// ============================================================================
// Module: Formwork Views Library
// Description: Template rendering for Formwork applications.
// Purpose: Provide the minijinja implementation of the core view renderer.
// Dependencies: formwork-core, minijinja, serde_json
// ============================================================================

//! ## Overview
//! [`TemplateViews`] renders application templates from the source directory
//! and falls back to built-in `Desktop`, `SignIn`, `Dashboard`, `ModelView`,
//! and `Fatal` templates.

mod functions;
pub mod views;

pub use views::TemplateViews;
pub use views::ViewsOptions;
