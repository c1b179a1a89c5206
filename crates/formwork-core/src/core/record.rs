// formwork-core/src/core/record.rs
// ============================================================================
// Module: Formwork Records
// Description: Record representation and reserved record keys.
// Purpose: Share record markers between the save cascade, stores, and the API.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! A record is a JSON object keyed by column name. A handful of keys are
//! reserved: they carry cascade instructions (`_toBeDeleted_`,
//! `_useMasterRecordId_`) or read annotations (`_RELATIONS`, `_LOOKUP`) and
//! never reach a store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Primary key column.
pub const ID_KEY: &str = "id";
/// Marker requesting deletion of a (sub)record during a save.
pub const TO_BE_DELETED_KEY: &str = "_toBeDeleted_";
/// Columns replaced by the master record id during a cascade.
pub const USE_MASTER_RECORD_ID_KEY: &str = "_useMasterRecordId_";
/// Column value replaced by the master record id during a cascade.
pub const MASTER_RECORD_ID_PLACEHOLDER: &str = "$masterRecordId";
/// Relation names included in a read.
pub const RELATIONS_KEY: &str = "_RELATIONS";
/// Display text produced by the lookup pattern.
pub const LOOKUP_KEY: &str = "_LOOKUP";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Record payload keyed by column name.
pub type Record = Map<String, Value>;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true for keys that carry cascade or read annotations.
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    matches!(
        key,
        TO_BE_DELETED_KEY | USE_MASTER_RECORD_ID_KEY | RELATIONS_KEY | LOOKUP_KEY
    )
}

/// Returns true when the record asks to be deleted.
#[must_use]
pub fn is_marked_for_deletion(record: &Record) -> bool {
    record.get(TO_BE_DELETED_KEY).is_some_and(is_truthy)
}

/// Lists the columns that should receive the master record id.
#[must_use]
pub fn master_id_columns(record: &Record) -> Vec<String> {
    let mut columns: Vec<String> = match record.get(USE_MASTER_RECORD_ID_KEY) {
        Some(Value::Array(items)) => {
            items.iter().filter_map(Value::as_str).map(str::to_string).collect()
        }
        Some(Value::String(single)) if !single.is_empty() => vec![single.clone()],
        _ => Vec::new(),
    };
    for (key, value) in record {
        if value.as_str() == Some(MASTER_RECORD_ID_PLACEHOLDER) && !columns.contains(key) {
            columns.push(key.clone());
        }
    }
    columns
}

/// Interprets loosely typed flags (`true`, `1`, `"1"`, `"true"`).
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !matches!(text.as_str(), "" | "0" | "false"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
        Value::Null => false,
    }
}

/// Returns a copy of the record without reserved keys.
#[must_use]
pub fn strip_reserved(record: &Record) -> Record {
    record
        .iter()
        .filter(|(key, _)| !is_reserved_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
