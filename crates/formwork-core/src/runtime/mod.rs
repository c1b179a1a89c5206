// formwork-core/src/runtime/mod.rs
// ============================================================================
// Module: Formwork Runtime
// Description: Application loader, render pipeline, and record services.
// Purpose: Wire models, routes, controllers, stores, and views into an application.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The runtime turns loaded models and widgets into a running application:
//! the [`ModelRegistry`], the [`Router`], the controllers, the record and
//! settings services, and the [`Application`] render pipeline that ties them
//! together. [`InMemoryRecordStore`] backs tests and store-less tooling.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod app;
pub mod audit;
pub mod controllers;
pub mod dashboard;
pub mod describe;
pub mod plugins;
pub mod records;
pub mod registry;
pub mod routing;
pub mod settings;
pub mod store;
pub mod widgets;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use app::AppError;
pub use app::AppRequest;
pub use app::AppResponse;
pub use app::Application;
pub use app::ApplicationBuilder;
pub use app::ApplicationOptions;
pub use app::InstallOutcome;
pub use app::Interface;
pub use app::RenderError;
pub use audit::AuditEvent;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use controllers::Controller;
pub use controllers::ControllerContext;
pub use controllers::ControllerRegistry;
pub use dashboard::DashboardCard;
pub use dashboard::DashboardConfig;
pub use describe::FormDescription;
pub use describe::TableDescription;
pub use plugins::EventOutcome;
pub use plugins::Plugin;
pub use plugins::PluginHost;
pub use records::ListResult;
pub use records::RecordError;
pub use records::RecordSaveError;
pub use records::RecordService;
pub use records::SaveOutcome;
pub use registry::ModelRegistry;
pub use registry::RegistryError;
pub use routing::RouteSpec;
pub use routing::RouteTarget;
pub use routing::Router;
pub use routing::RoutingError;
pub use settings::SettingsService;
pub use store::InMemoryRecordStore;
pub use widgets::LoadedWidget;
pub use widgets::WidgetError;
pub use widgets::WidgetLoader;
pub use widgets::WidgetManifest;
