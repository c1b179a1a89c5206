// formwork-store-sqlite/src/sql.rs
// ============================================================================
// Module: SQLite Record SQL
// Description: DDL generation and JSON to SQLite value mapping for model tables.
// Purpose: Keep statement text and value conversion out of the store logic.
// Dependencies: formwork-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Model tables use `id INTEGER PRIMARY KEY AUTOINCREMENT` followed by one
//! column per model column, typed by [`DataType::sql_type`]. Lookup columns
//! reference their target table with `ON DELETE SET NULL`; unique constraints
//! become unique indexes. Identifiers are always double-quoted; model
//! validation restricts them to `[A-Za-z_][A-Za-z0-9_]*`.
//!
//! Values map JSON to `SQLite` storage classes: integers and reals as numbers,
//! booleans as `0/1`, strings as text, and arrays or objects as JSON text.
//! Reads decode by column type so booleans and JSON columns come back typed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use formwork_core::ColumnSpec;
use formwork_core::DataType;
use formwork_core::ModelSpec;
use formwork_core::Record;
use formwork_core::TableSchema;
use rusqlite::types::Value as SqlValue;
use serde_json::Number;
use serde_json::Value;

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Double-quotes an identifier.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Returns the quoted select list: `id` followed by model columns.
pub(crate) fn select_list(model: &ModelSpec) -> String {
    std::iter::once(quote("id"))
        .chain(model.columns.iter().map(|column| quote(column.name.as_str())))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// SECTION: DDL
// ============================================================================

/// Builds the statements that install a model table.
pub(crate) fn create_table_statements(schema: &TableSchema<'_>) -> Vec<String> {
    let model = schema.model;
    let table = quote(&model.table);
    let mut definitions = vec!["\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    for column in &model.columns {
        definitions.push(format!(
            "{} {}",
            quote(column.name.as_str()),
            column.data_type.sql_type(column)
        ));
    }
    for (column, target) in &schema.lookup_tables {
        definitions.push(format!(
            "FOREIGN KEY ({}) REFERENCES {}(\"id\") ON DELETE SET NULL",
            quote(column),
            quote(target)
        ));
    }
    let mut statements =
        vec![format!("CREATE TABLE IF NOT EXISTS {table} (\n    {}\n)", definitions.join(",\n    "))];
    for column in schema.lookup_tables.keys() {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({})",
            quote(&format!("ix_{}_{column}", model.table)),
            quote(column)
        ));
    }
    for columns in &model.unique {
        let names: Vec<&str> = columns.iter().map(|column| column.as_str()).collect();
        statements.push(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {table} ({})",
            quote(&format!("uq_{}_{}", model.table, names.join("_"))),
            names.iter().map(|name| quote(name)).collect::<Vec<_>>().join(", ")
        ));
    }
    statements
}

// ============================================================================
// SECTION: Values
// ============================================================================

/// Converts a JSON value into an `SQLite` value.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number.as_i64().map_or_else(
            || number.as_f64().map_or(SqlValue::Null, SqlValue::Real),
            SqlValue::Integer,
        ),
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Converts a stored value back to JSON using the column type.
pub(crate) fn from_sql(column: Option<&ColumnSpec>, value: SqlValue) -> Value {
    let data_type = column.map(|column| column.data_type);
    match (data_type, value) {
        (_, SqlValue::Null) => Value::Null,
        (Some(DataType::Boolean), SqlValue::Integer(number)) => Value::Bool(number != 0),
        (Some(DataType::Json), SqlValue::Text(text)) => {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        }
        (_, SqlValue::Integer(number)) => Value::Number(Number::from(number)),
        (_, SqlValue::Real(number)) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        (_, SqlValue::Text(text)) => Value::String(text),
        (_, SqlValue::Blob(bytes)) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Builds a record from a row read with [`select_list`].
pub(crate) fn row_to_record(model: &ModelSpec, row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let mut record = Record::new();
    let id: SqlValue = row.get(0)?;
    record.insert("id".to_string(), from_sql(None, id));
    for (index, column) in model.columns.iter().enumerate() {
        let value: SqlValue = row.get(index + 1)?;
        record.insert(column.name.to_string(), from_sql(Some(column), value));
    }
    Ok(record)
}

/// Returns the model columns present in a record, in model order.
pub(crate) fn present_columns<'a>(
    model: &'a ModelSpec,
    record: &'a Record,
) -> Vec<(&'a ColumnSpec, &'a Value)> {
    model
        .columns
        .iter()
        .filter_map(|column| record.get(column.name.as_str()).map(|value| (column, value)))
        .collect()
}

/// Escapes `LIKE` wildcards with a backslash.
pub(crate) fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use formwork_core::ColumnName;
    use serde_json::json;

    use super::*;

    #[test]
    fn create_table_includes_foreign_keys_and_unique_indexes() {
        let mut model = ModelSpec::new("Crm/Contact", "contacts")
            .with_column(ColumnSpec::new("customer", DataType::Lookup).lookup("Crm/Customer"))
            .with_column(ColumnSpec::new("email", DataType::Varchar));
        model.unique = vec![vec![ColumnName::new("email")]];
        let schema = TableSchema {
            model: &model,
            lookup_tables: BTreeMap::from([("customer".to_string(), "customers".to_string())]),
        };
        let statements = create_table_statements(&schema);
        assert!(statements[0].contains("\"email\" varchar(255)"));
        assert!(statements[0].contains("REFERENCES \"customers\"(\"id\") ON DELETE SET NULL"));
        assert!(statements.iter().any(|s| s.starts_with("CREATE UNIQUE INDEX")));
    }

    #[test]
    fn values_round_trip_through_column_types() {
        let flag = ColumnSpec::new("active", DataType::Boolean);
        assert_eq!(from_sql(Some(&flag), to_sql(&json!(true))), json!(true));
        let data = ColumnSpec::new("meta", DataType::Json);
        assert_eq!(from_sql(Some(&data), to_sql(&json!({"a": [1]}))), json!({"a": [1]}));
        assert_eq!(from_sql(None, to_sql(&json!(1.5))), json!(1.5));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }
}
