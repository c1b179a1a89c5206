// formwork-core/src/core/mod.rs
// ============================================================================
// Module: Formwork Core Types
// Description: Models, data types, records, permissions, and supporting codecs.
// Purpose: Provide the serializable building blocks shared by every Formwork crate.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! Core types describe what an application manages: model definitions with
//! typed columns and relations, records and their reserved keys, permission
//! policy, and the settings tree. They carry no I/O beyond model files,
//! uploads, and translation dictionaries.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod data_types;
pub mod hashing;
pub mod id_codec;
pub mod identifiers;
pub mod model;
pub mod permissions;
pub mod record;
pub mod settings;
pub mod translate;
pub mod uid;
pub mod upload;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use data_types::DataType;
pub use data_types::DataTypeError;
pub use data_types::NormalizeContext;
pub use id_codec::IdCodec;
pub use id_codec::IdCodecError;
pub use identifiers::ColumnName;
pub use identifiers::ControllerName;
pub use identifiers::IdentifierError;
pub use identifiers::ModelName;
pub use identifiers::RecordId;
pub use identifiers::RoleName;
pub use identifiers::UserId;
pub use model::CardSpec;
pub use model::ColumnSpec;
pub use model::ModelError;
pub use model::ModelFormat;
pub use model::ModelSpec;
pub use model::RelationKind;
pub use model::RelationSpec;
pub use permissions::PermissionError;
pub use permissions::PermissionPolicy;
pub use permissions::RecordAction;
pub use permissions::RecordPermissions;
pub use permissions::User;
pub use record::Record;
pub use settings::SettingsRow;
pub use settings::SettingsTree;
pub use translate::Language;
pub use translate::Translator;
pub use uid::Uid;
pub use uid::UidError;
pub use upload::UploadError;
