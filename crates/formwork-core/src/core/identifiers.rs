// formwork-core/src/core/identifiers.rs
// ============================================================================
// Module: Formwork Identifiers
// Description: Strongly typed names for models, columns, controllers, and records.
// Purpose: Keep model and record references distinct at API boundaries.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Formwork addresses models by slash-separated paths (`Crm/Customer`),
//! columns by SQL-safe names, and records by positive integer ids. The
//! wrappers here serialize transparently. `new` constructors never validate;
//! use `parse` at input boundaries where the value comes from a file or a
//! request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a model or controller path.
const MAX_PATH_NAME_LENGTH: usize = 255;
/// Maximum length of a column name.
const MAX_COLUMN_NAME_LENGTH: usize = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Model name is malformed.
    #[error("invalid model name: {0}")]
    ModelName(String),
    /// Column name is malformed.
    #[error("invalid column name: {0}")]
    ColumnName(String),
    /// Controller name is malformed.
    #[error("invalid controller name: {0}")]
    ControllerName(String),
    /// Record id is malformed.
    #[error("invalid record id: {0}")]
    RecordId(String),
}

// ============================================================================
// SECTION: Model Name
// ============================================================================

/// Model name in `Widget/Model` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelName(String);

impl ModelName {
    /// Creates a new model name without validation.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Parses and validates a model name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::ModelName`] when the name is empty, too long,
    /// has empty segments, or contains characters outside `[A-Za-z0-9_/]`.
    pub fn parse(name: &str) -> Result<Self, IdentifierError> {
        if is_valid_path_name(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(IdentifierError::ModelName(name.to_string()))
        }
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last path segment (`Customer` for `Crm/Customer`).
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ModelName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ModelName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Column Name
// ============================================================================

/// Column name within a model table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnName(String);

impl ColumnName {
    /// Creates a new column name without validation.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Parses and validates a column name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::ColumnName`] when the name is not a plain
    /// SQL identifier or is the reserved primary key `id`.
    pub fn parse(name: &str) -> Result<Self, IdentifierError> {
        if name != "id" && is_sql_identifier(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(IdentifierError::ColumnName(name.to_string()))
        }
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ColumnName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ColumnName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Controller Name
// ============================================================================

/// Controller name such as `Api/Record/Save` or `Crm/Customers`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerName(String);

impl ControllerName {
    /// Creates a new controller name without validation.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Parses and validates a controller name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::ControllerName`] when the name is malformed.
    pub fn parse(name: &str) -> Result<Self, IdentifierError> {
        if is_valid_path_name(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(IdentifierError::ControllerName(name.to_string()))
        }
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControllerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ControllerName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Record Id
// ============================================================================

/// Primary key of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Id used for records that have not been saved yet.
    pub const NEW: Self = Self(0);

    /// Creates a record id from a raw integer.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Returns true when the id refers to a persisted record.
    #[must_use]
    pub const fn is_persisted(self) -> bool {
        self.0 > 0
    }

    /// Reads a record id from a JSON value (number or numeric string).
    ///
    /// Missing and empty values read as [`RecordId::NEW`].
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::RecordId`] when the value is not an integer.
    pub fn from_value(value: Option<&serde_json::Value>) -> Result<Self, IdentifierError> {
        match value {
            None | Some(serde_json::Value::Null) => Ok(Self::NEW),
            Some(serde_json::Value::Number(number)) => number
                .as_i64()
                .map(Self)
                .ok_or_else(|| IdentifierError::RecordId(number.to_string())),
            Some(serde_json::Value::String(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(Self::NEW);
                }
                trimmed.parse::<i64>().map(Self).map_err(|_| IdentifierError::RecordId(text.clone()))
            }
            Some(other) => Err(IdentifierError::RecordId(other.to_string())),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

// ============================================================================
// SECTION: User Identifiers
// ============================================================================

/// Authenticated user identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a new user identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Role name granted to users.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    /// Role that is granted every permission.
    pub const ADMINISTRATOR: &'static str = "administrator";

    /// Creates a new role name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the administrator role.
    #[must_use]
    pub fn is_administrator(&self) -> bool {
        self.0 == Self::ADMINISTRATOR
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RoleName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when `name` is a non-empty `[A-Za-z0-9_]` path with `/` separators.
pub fn is_valid_path_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_PATH_NAME_LENGTH
        && name.split('/').all(|segment| {
            !segment.is_empty()
                && segment.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        })
}

/// Returns true when `name` is a plain SQL identifier.
pub(crate) fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_COLUMN_NAME_LENGTH
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use serde_json::json;

    use super::*;

    #[test]
    fn model_name_accepts_nested_paths() {
        let name = ModelName::parse("Crm/Customer").unwrap();
        assert_eq!(name.short_name(), "Customer");
        assert!(ModelName::parse("Crm//Customer").is_err());
        assert!(ModelName::parse("Crm/Cust-omer").is_err());
        assert!(ModelName::parse("").is_err());
    }

    #[test]
    fn column_name_rejects_reserved_id() {
        assert!(ColumnName::parse("id").is_err());
        assert!(ColumnName::parse("id_customer").is_ok());
        assert!(ColumnName::parse("9lives").is_err());
    }

    #[test]
    fn record_id_reads_numbers_and_strings() {
        assert_eq!(RecordId::from_value(Some(&json!(12))).unwrap(), RecordId::new(12));
        assert_eq!(RecordId::from_value(Some(&json!("7"))).unwrap(), RecordId::new(7));
        assert_eq!(RecordId::from_value(Some(&json!(""))).unwrap(), RecordId::NEW);
        assert_eq!(RecordId::from_value(None).unwrap(), RecordId::NEW);
        assert!(RecordId::from_value(Some(&json!("x1"))).is_err());
        assert!(RecordId::from_value(Some(&json!([1]))).is_err());
    }
}
