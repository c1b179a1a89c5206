// formwork-core/src/runtime/describe.rs
// ============================================================================
// Module: Formwork Describe
// Description: Form and table descriptions derived from model specs.
// Purpose: Give clients everything needed to render CRUD forms and tables.
// Dependencies: crate::core, serde, serde_json
// ============================================================================

//! ## Overview
//! Clients never read model files. They ask for a form or table description,
//! which lists the visible columns with their types and attributes, the
//! default record, the relations, and the record permissions of the caller.
//! Request parameters may override the title, ordering, and page size.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

use crate::core::ColumnSpec;
use crate::core::DataType;
use crate::core::ModelSpec;
use crate::core::RecordPermissions;
use crate::core::RelationKind;
use crate::core::record::ID_KEY;
use crate::core::record::Record;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default table ordering.
pub const DEFAULT_ORDER_BY: &str = "id desc";
/// Default table page size.
pub const DEFAULT_ITEMS_PER_PAGE: u32 = 25;
/// Largest page size a client may request.
pub const MAX_ITEMS_PER_PAGE: u32 = 500;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Client-facing column description.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescription {
    /// Data type.
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Title.
    pub title: String,
    /// Required flag.
    pub required: bool,
    /// Read-only flag.
    pub read_only: bool,
    /// Help text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Allowed enum values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    /// Lookup target model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Display format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Display unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Varchar length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_size: Option<u32>,
}

impl ColumnDescription {
    /// Describes a column.
    #[must_use]
    pub fn from_column(column: &ColumnSpec) -> Self {
        Self {
            data_type: column.data_type,
            title: column.title(),
            required: column.required,
            read_only: column.read_only,
            description: column.description.clone(),
            enum_values: column.enum_values.clone(),
            model: column.lookup_model.as_ref().map(ToString::to_string),
            format: column.format.clone(),
            unit: column.unit.clone(),
            byte_size: (column.data_type == DataType::Varchar).then(|| column.byte_size()),
        }
    }
}

/// Client-facing relation description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDescription {
    /// Relation kind.
    pub kind: RelationKind,
    /// Related model.
    pub model: String,
    /// Foreign key column.
    pub foreign_key: String,
}

/// Form description.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDescription {
    /// Model name.
    pub model: String,
    /// Form title.
    pub title: String,
    /// Visible columns by name.
    pub columns: Map<String, Value>,
    /// Default record for new entries.
    pub default_values: Record,
    /// Relations by name.
    pub relations: Map<String, Value>,
    /// Caller's record permissions.
    pub permissions: RecordPermissions,
}

/// Table description.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescription {
    /// Model name.
    pub model: String,
    /// Table title.
    pub title: String,
    /// Visible columns by name.
    pub columns: Map<String, Value>,
    /// Default ordering.
    pub order_by: String,
    /// Page size.
    pub items_per_page: u32,
    /// Caller's record permissions.
    pub permissions: RecordPermissions,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Describes the form of a model.
#[must_use]
pub fn form_describe(
    model: &ModelSpec,
    params: &Map<String, Value>,
    permissions: RecordPermissions,
) -> FormDescription {
    let columns = describe_columns(model, |column| column.show_in_form);
    let relations = model
        .relations
        .iter()
        .map(|relation| {
            let description = RelationDescription {
                kind: relation.kind,
                model: relation.model.to_string(),
                foreign_key: relation.foreign_key.to_string(),
            };
            (relation.name.clone(), serde_json::to_value(description).unwrap_or(Value::Null))
        })
        .collect();
    FormDescription {
        model: model.name.to_string(),
        title: string_param(params, "title").unwrap_or_else(|| model.title()),
        columns,
        default_values: record_default_values(model),
        relations,
        permissions,
    }
}

/// Describes the table of a model.
#[must_use]
pub fn table_describe(
    model: &ModelSpec,
    params: &Map<String, Value>,
    permissions: RecordPermissions,
) -> TableDescription {
    let items_per_page = params
        .get("itemsPerPage")
        .and_then(|value| match value {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        })
        .and_then(|value| u32::try_from(value).ok())
        .filter(|value| (1 ..= MAX_ITEMS_PER_PAGE).contains(value))
        .unwrap_or(DEFAULT_ITEMS_PER_PAGE);
    TableDescription {
        model: model.name.to_string(),
        title: string_param(params, "title").unwrap_or_else(|| model.title()),
        columns: describe_columns(model, |column| column.show_in_table),
        order_by: string_param(params, "orderBy").unwrap_or_else(|| DEFAULT_ORDER_BY.to_string()),
        items_per_page,
        permissions,
    }
}

/// Builds the default record of a model: column defaults and `id = 0`.
#[must_use]
pub fn record_default_values(model: &ModelSpec) -> Record {
    let mut record = Record::new();
    record.insert(ID_KEY.to_string(), Value::Number(Number::from(0)));
    for column in &model.columns {
        record.insert(column.name.to_string(), column.default.clone().unwrap_or(Value::Null));
    }
    record
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Describes the columns passing `visible`.
fn describe_columns(model: &ModelSpec, visible: impl Fn(&ColumnSpec) -> bool) -> Map<String, Value> {
    model
        .columns
        .iter()
        .filter(|column| visible(column))
        .map(|column| {
            let description = ColumnDescription::from_column(column);
            (column.name.to_string(), serde_json::to_value(description).unwrap_or(Value::Null))
        })
        .collect()
}

/// Reads a non-empty string parameter.
fn string_param(params: &Map<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).filter(|text| !text.is_empty()).map(str::to_string)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
