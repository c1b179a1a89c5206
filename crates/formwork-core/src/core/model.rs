// formwork-core/src/core/model.rs
// ============================================================================
// Module: Formwork Model Specification
// Description: Declarative model, column, and relation definitions.
// Purpose: Define the canonical model schema loaded from widget model files.
// Dependencies: crate::core::{data_types, identifiers}, serde, serde_yaml, toml
// ============================================================================

//! ## Overview
//! A [`ModelSpec`] describes one table: its columns with their data types,
//! the relations to other models, unique constraints, and the lookup pattern
//! used to render a record as a single line of text. Specs are parsed from
//! TOML, JSON, or YAML files and validated at load time so the registry and
//! stores can rely on well-formed names.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::data_types::DataType;
use crate::core::identifiers::ColumnName;
use crate::core::identifiers::ModelName;
use crate::core::identifiers::is_sql_identifier;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default lookup pattern when a model does not declare one.
pub const DEFAULT_LOOKUP_PATTERN: &str = "{%id%}";
/// Default varchar length.
pub const DEFAULT_VARCHAR_BYTES: u32 = 255;
/// Maximum model file size accepted by the loader.
pub const MAX_MODEL_FILE_BYTES: usize = 512 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Model specification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Model file could not be read.
    #[error("model io error: {0}")]
    Io(String),
    /// Model file could not be parsed.
    #[error("model parse error: {0}")]
    Parse(String),
    /// Model definition is invalid.
    #[error("invalid model {model}: {message}")]
    Invalid {
        /// Model name.
        model: String,
        /// Validation failure.
        message: String,
    },
}

// ============================================================================
// SECTION: File Format
// ============================================================================

/// Serialization format of a model definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// TOML model file.
    Toml,
    /// JSON model file.
    Json,
    /// YAML model file.
    Yaml,
}

impl ModelFormat {
    /// Detects the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Model Specification
// ============================================================================

/// Declarative definition of a model and its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    /// Model name (`Widget/Model`).
    pub name: ModelName,
    /// SQL table name.
    pub table: String,
    /// Human-readable title.
    #[serde(default)]
    pub title: Option<String>,
    /// Lookup pattern with `{%column%}` placeholders.
    #[serde(default = "default_lookup_pattern")]
    pub lookup_pattern: String,
    /// Columns in declaration order.
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    /// Relations to other models.
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
    /// Unique constraints over column sets.
    #[serde(default)]
    pub unique: Vec<Vec<ColumnName>>,
    /// Optional dashboard card.
    #[serde(default)]
    pub card: Option<CardSpec>,
}

impl ModelSpec {
    /// Creates an empty model spec.
    #[must_use]
    pub fn new(name: impl Into<ModelName>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            title: None,
            lookup_pattern: default_lookup_pattern(),
            columns: Vec::new(),
            relations: Vec::new(),
            unique: Vec::new(),
            card: None,
        }
    }

    /// Appends a column.
    #[must_use]
    pub fn with_column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Appends a relation.
    #[must_use]
    pub fn with_relation(mut self, relation: RelationSpec) -> Self {
        self.relations.push(relation);
        self
    }

    /// Sets the lookup pattern.
    #[must_use]
    pub fn with_lookup_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.lookup_pattern = pattern.into();
        self
    }

    /// Parses a model spec from text in the given format and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when parsing or validation fails.
    pub fn parse(content: &str, format: ModelFormat) -> Result<Self, ModelError> {
        let spec: Self = match format {
            ModelFormat::Toml => {
                toml::from_str(content).map_err(|err| ModelError::Parse(err.to_string()))?
            }
            ModelFormat::Json => {
                serde_json::from_str(content).map_err(|err| ModelError::Parse(err.to_string()))?
            }
            ModelFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|err| ModelError::Parse(err.to_string()))?
            }
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Loads a model spec from a file, detecting the format by extension.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let format = ModelFormat::from_path(path).ok_or_else(|| {
            ModelError::Parse(format!("unsupported model file extension: {}", path.display()))
        })?;
        let bytes = std::fs::read(path).map_err(|err| ModelError::Io(err.to_string()))?;
        if bytes.len() > MAX_MODEL_FILE_BYTES {
            return Err(ModelError::Parse(format!(
                "model file exceeds size limit: {}",
                path.display()
            )));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ModelError::Parse("model file must be utf-8".to_string()))?;
        Self::parse(content, format)
    }

    /// Validates internal consistency of the spec.
    ///
    /// Cross-model references are checked by the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] when validation fails.
    pub fn validate(&self) -> Result<(), ModelError> {
        ModelName::parse(self.name.as_str()).map_err(|err| self.invalid(err.to_string()))?;
        if !is_sql_identifier(&self.table) {
            return Err(self.invalid(format!("table name is not a plain identifier: {}", self.table)));
        }
        let mut names = BTreeSet::new();
        for column in &self.columns {
            ColumnName::parse(column.name.as_str()).map_err(|err| self.invalid(err.to_string()))?;
            if !names.insert(column.name.as_str()) {
                return Err(self.invalid(format!("duplicate column: {}", column.name)));
            }
            column.validate().map_err(|message| self.invalid(message))?;
        }
        let mut relation_names = BTreeSet::new();
        for relation in &self.relations {
            if relation.name.trim().is_empty() {
                return Err(self.invalid("relation name must be non-empty".to_string()));
            }
            if names.contains(relation.name.as_str()) {
                return Err(self.invalid(format!("relation shadows column: {}", relation.name)));
            }
            if !relation_names.insert(relation.name.as_str()) {
                return Err(self.invalid(format!("duplicate relation: {}", relation.name)));
            }
            if relation.kind == RelationKind::BelongsTo && self.column(relation.foreign_key.as_str()).is_none()
            {
                return Err(self.invalid(format!(
                    "belongs_to relation {} references unknown column {}",
                    relation.name, relation.foreign_key
                )));
            }
        }
        for constraint in &self.unique {
            if constraint.is_empty() {
                return Err(self.invalid("unique constraint must list columns".to_string()));
            }
            for column in constraint {
                if self.column(column.as_str()).is_none() {
                    return Err(self.invalid(format!("unique constraint on unknown column {column}")));
                }
            }
        }
        for placeholder in pattern_placeholders(&self.lookup_pattern) {
            if placeholder != "id" && self.column(placeholder).is_none() {
                return Err(self.invalid(format!("lookup pattern references unknown column {placeholder}")));
            }
        }
        Ok(())
    }

    /// Returns the human-readable title (defaults to the short model name).
    #[must_use]
    pub fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.name.short_name().to_string())
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name.as_str() == name)
    }

    /// Looks up a relation by name.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Renders the lookup text of a record.
    #[must_use]
    pub fn lookup_text(&self, record: &Map<String, Value>) -> String {
        let mut text = self.lookup_pattern.clone();
        for placeholder in pattern_placeholders(&self.lookup_pattern) {
            let value = match record.get(placeholder) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
            };
            text = text.replace(&format!("{{%{placeholder}%}}"), &value);
        }
        text
    }

    /// Builds an invalid-model error for this spec.
    fn invalid(&self, message: String) -> ModelError {
        ModelError::Invalid {
            model: self.name.to_string(),
            message,
        }
    }
}

/// Returns the default lookup pattern.
fn default_lookup_pattern() -> String {
    DEFAULT_LOOKUP_PATTERN.to_string()
}

// ============================================================================
// SECTION: Column Specification
// ============================================================================

/// Column definition within a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    /// Column name.
    pub name: ColumnName,
    /// Column data type.
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Human-readable title.
    #[serde(default)]
    pub title: Option<String>,
    /// Rejects empty values when true.
    #[serde(default)]
    pub required: bool,
    /// Excluded from writes when true.
    #[serde(default)]
    pub read_only: bool,
    /// Listed in form descriptions.
    #[serde(default = "default_true")]
    pub show_in_form: bool,
    /// Listed in table descriptions.
    #[serde(default = "default_true")]
    pub show_in_table: bool,
    /// Default value for new records.
    #[serde(default)]
    pub default: Option<Value>,
    /// Help text.
    #[serde(default)]
    pub description: Option<String>,
    /// Maximum length for varchar columns.
    #[serde(default)]
    pub byte_size: Option<u32>,
    /// Allowed values for enum columns.
    #[serde(default)]
    pub enum_values: Vec<String>,
    /// Target model for lookup columns.
    #[serde(default)]
    pub lookup_model: Option<ModelName>,
    /// Display format for date and time columns.
    #[serde(default)]
    pub format: Option<String>,
    /// Upload subfolder for image and file columns.
    #[serde(default)]
    pub folder_path: Option<String>,
    /// Upload rename pattern for image and file columns.
    #[serde(default)]
    pub rename_pattern: Option<String>,
    /// Unit suffix for numeric display.
    #[serde(default)]
    pub unit: Option<String>,
}

impl ColumnSpec {
    /// Creates a column with defaults for every optional attribute.
    #[must_use]
    pub fn new(name: impl Into<ColumnName>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            title: None,
            required: false,
            read_only: false,
            show_in_form: true,
            show_in_table: true,
            default: None,
            description: None,
            byte_size: None,
            enum_values: Vec::new(),
            lookup_model: None,
            format: None,
            folder_path: None,
            rename_pattern: None,
            unit: None,
        }
    }

    /// Marks the column as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the lookup target model.
    #[must_use]
    pub fn lookup(mut self, model: impl Into<ModelName>) -> Self {
        self.lookup_model = Some(model.into());
        self
    }

    /// Sets enum values.
    #[must_use]
    pub fn with_enum_values(mut self, values: &[&str]) -> Self {
        self.enum_values = values.iter().map(|value| (*value).to_string()).collect();
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Returns the human-readable title (defaults to the column name).
    #[must_use]
    pub fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.name.to_string())
    }

    /// Returns the varchar length limit.
    #[must_use]
    pub fn byte_size(&self) -> u32 {
        self.byte_size.unwrap_or(DEFAULT_VARCHAR_BYTES)
    }

    /// Validates column-local attributes.
    fn validate(&self) -> Result<(), String> {
        match self.data_type {
            DataType::Lookup if self.lookup_model.is_none() => {
                Err(format!("lookup column {} requires lookup_model", self.name))
            }
            DataType::Enum if self.enum_values.is_empty() => {
                Err(format!("enum column {} requires enum_values", self.name))
            }
            DataType::Varchar if self.byte_size == Some(0) => {
                Err(format!("varchar column {} requires byte_size > 0", self.name))
            }
            _ => {
                if let Some(folder) = &self.folder_path
                    && folder.contains("..")
                {
                    return Err(format!("column {} folder_path must not contain ..", self.name));
                }
                Ok(())
            }
        }
    }
}

/// Returns true for serde defaults.
const fn default_true() -> bool {
    true
}

// ============================================================================
// SECTION: Relations
// ============================================================================

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Related model holds a foreign key to this model; many rows.
    HasMany,
    /// Related model holds a foreign key to this model; one row.
    HasOne,
    /// This model holds a foreign key to the related model.
    BelongsTo,
}

/// Relation to another model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationSpec {
    /// Relation name (key used in records).
    pub name: String,
    /// Relation cardinality.
    pub kind: RelationKind,
    /// Related model.
    pub model: ModelName,
    /// Foreign key column.
    pub foreign_key: ColumnName,
}

impl RelationSpec {
    /// Creates a relation spec.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: RelationKind,
        model: impl Into<ModelName>,
        foreign_key: impl Into<ColumnName>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            model: model.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

/// Dashboard card offered by a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardSpec {
    /// Card title.
    pub title: String,
    /// Optional card description.
    #[serde(default)]
    pub description: Option<String>,
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts `{%name%}` placeholder names from a pattern.
#[must_use]
pub fn pattern_placeholders(pattern: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = pattern;
    while let Some(start) = rest.find("{%") {
        let after = &rest[start + 2 ..];
        let Some(end) = after.find("%}") else {
            break;
        };
        names.push(&after[.. end]);
        rest = &after[end + 2 ..];
    }
    names
}

// ============================================================================
// SECTION: Tests
// ============================================================================
