// formwork-server/src/lib.rs
// ============================================================================
// Module: Formwork Server Library
// Description: HTTP front end and configuration bootstrap.
// Purpose: Serve Formwork applications built from `formwork.toml`.
// Dependencies: axum, formwork-config, formwork-core, formwork-store-sqlite, formwork-views, tokio
// ============================================================================

//! ## Overview
//! [`build_application`] wires a configured application from its store,
//! views, authenticator, and audit sink. [`FormworkServer`] exposes it over
//! HTTP with axum. Security posture: requests are untrusted input; see the
//! module docs of [`server`].

pub mod assets;
pub mod auth;
pub mod bootstrap;
pub mod request;
pub mod server;

pub use auth::TokenAuthenticator;
pub use bootstrap::build_application;
pub use server::FormworkServer;
pub use server::ServerError;
