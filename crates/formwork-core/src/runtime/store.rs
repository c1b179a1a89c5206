// formwork-core/src/runtime/store.rs
// ============================================================================
// Module: Formwork In-Memory Store
// Description: In-memory record and settings store for tests and demos.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`RecordStore`] and
//! [`SettingsStore`] for tests and local demos. A transaction holds the store
//! lock and a snapshot of the state taken at `begin`; dropping it without a
//! commit restores the snapshot. It mirrors the SQLite store's unique
//! constraints and `ON DELETE SET NULL` lookups. It is not intended for
//! production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde_json::Number;
use serde_json::Value;

use crate::core::ModelSpec;
use crate::core::RecordId;
use crate::core::SettingsRow;
use crate::core::record::ID_KEY;
use crate::core::record::Record;
use crate::core::settings::path_has_prefix;
use crate::interfaces::ListQuery;
use crate::interfaces::RecordPage;
use crate::interfaces::RecordStore;
use crate::interfaces::RecordTx;
use crate::interfaces::SettingsStore;
use crate::interfaces::StoreError;
use crate::interfaces::TableSchema;

// ============================================================================
// SECTION: State
// ============================================================================

/// One table.
#[derive(Debug, Clone, Default)]
struct MemoryTable {
    /// Last assigned id.
    last_id: i64,
    /// Rows by id.
    rows: BTreeMap<i64, Record>,
    /// Unique constraints.
    unique: Vec<Vec<String>>,
    /// Referenced table per lookup column.
    lookups: BTreeMap<String, String>,
}

/// Whole store state.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// Tables by name.
    tables: BTreeMap<String, MemoryTable>,
    /// Settings rows by path.
    settings: BTreeMap<String, Value>,
}

impl MemoryState {
    /// Returns a table or a missing-table error.
    fn table(&self, name: &str) -> Result<&MemoryTable, StoreError> {
        self.tables.get(name).ok_or_else(|| StoreError::MissingTable(name.to_string()))
    }

    /// Returns a mutable table or a missing-table error.
    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, StoreError> {
        self.tables.get_mut(name).ok_or_else(|| StoreError::MissingTable(name.to_string()))
    }

    /// Loads a row shaped by the model columns.
    fn get(&self, model: &ModelSpec, id: RecordId) -> Result<Option<Record>, StoreError> {
        Ok(self.table(&model.table)?.rows.get(&id.get()).map(|row| shape_row(model, row)))
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// In-memory record store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRecordStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("record store mutex poisoned".to_string()))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn begin(&self) -> Result<Box<dyn RecordTx + '_>, StoreError> {
        let guard = self.lock()?;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            snapshot: Some(snapshot),
        }))
    }

    fn get(&self, model: &ModelSpec, id: RecordId) -> Result<Option<Record>, StoreError> {
        self.lock()?.get(model, id)
    }

    fn list(&self, model: &ModelSpec, query: &ListQuery) -> Result<RecordPage, StoreError> {
        let state = self.lock()?;
        let table = state.table(&model.table)?;
        let search = query.search.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty());
        let mut rows: Vec<Record> = table
            .rows
            .values()
            .filter(|row| {
                query.filters.iter().all(|(column, expected)| {
                    loosely_equal(row.get(column).unwrap_or(&Value::Null), expected)
                })
            })
            .filter(|row| search.as_deref().is_none_or(|needle| matches_search(model, row, needle)))
            .map(|row| shape_row(model, row))
            .collect();
        let column = query.order_by.column.as_str();
        rows.sort_by(|a, b| {
            let ordering = compare_values(
                a.get(column).unwrap_or(&Value::Null),
                b.get(column).unwrap_or(&Value::Null),
            );
            if query.order_by.descending { ordering.reverse() } else { ordering }
        });
        let total = rows.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let data = rows
            .into_iter()
            .skip(offset)
            .take(usize::try_from(query.items_per_page).unwrap_or(usize::MAX))
            .collect();
        Ok(RecordPage {
            data,
            total,
        })
    }

    fn children(
        &self,
        model: &ModelSpec,
        foreign_key: &str,
        id: RecordId,
    ) -> Result<Vec<Record>, StoreError> {
        let state = self.lock()?;
        let expected = Value::Number(Number::from(id.get()));
        Ok(state
            .table(&model.table)?
            .rows
            .values()
            .filter(|row| row.get(foreign_key).is_some_and(|value| loosely_equal(value, &expected)))
            .map(|row| shape_row(model, row))
            .collect())
    }
}

impl SettingsStore for InMemoryRecordStore {
    fn load_settings(&self) -> Result<Vec<SettingsRow>, StoreError> {
        Ok(self.lock()?.settings.iter().map(|(path, value)| (path.clone(), value.clone())).collect())
    }

    fn upsert_settings(&self, rows: &[SettingsRow]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        for (path, value) in rows {
            state.settings.insert(path.clone(), value.clone());
        }
        Ok(())
    }

    fn delete_settings_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut state = self.lock()?;
        let before = state.settings.len();
        state.settings.retain(|path, _| !path_has_prefix(path, prefix));
        Ok(before - state.settings.len())
    }
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Snapshot transaction over the in-memory state.
struct MemoryTx<'a> {
    /// Held store lock.
    guard: MutexGuard<'a, MemoryState>,
    /// State at `begin`; restored on drop unless committed.
    snapshot: Option<MemoryState>,
}

impl MemoryTx<'_> {
    /// Rejects a write that would duplicate a unique key.
    fn check_unique(
        table: &MemoryTable,
        id: Option<i64>,
        candidate: &Record,
    ) -> Result<(), StoreError> {
        for constraint in &table.unique {
            let key: Vec<&Value> =
                constraint.iter().map(|column| candidate.get(column).unwrap_or(&Value::Null)).collect();
            if key.iter().any(|value| value.is_null()) {
                continue;
            }
            let clash = table.rows.iter().any(|(row_id, row)| {
                Some(*row_id) != id
                    && constraint.iter().zip(&key).all(|(column, value)| {
                        row.get(column).is_some_and(|existing| loosely_equal(existing, value))
                    })
            });
            if clash {
                return Err(StoreError::UniqueViolation(constraint.join(", ")));
            }
        }
        Ok(())
    }
}

impl RecordTx for MemoryTx<'_> {
    fn create_table(&mut self, schema: &TableSchema<'_>) -> Result<(), StoreError> {
        let model = schema.model;
        let table = self.guard.tables.entry(model.table.clone()).or_default();
        table.unique = model
            .unique
            .iter()
            .map(|constraint| constraint.iter().map(ToString::to_string).collect())
            .collect();
        table.lookups = schema.lookup_tables.clone();
        Ok(())
    }

    fn insert(&mut self, model: &ModelSpec, record: &Record) -> Result<RecordId, StoreError> {
        let table = self.guard.table_mut(&model.table)?;
        let mut row = Record::new();
        for column in &model.columns {
            let value = record.get(column.name.as_str()).cloned().unwrap_or(Value::Null);
            row.insert(column.name.to_string(), value);
        }
        Self::check_unique(table, None, &row)?;
        table.last_id += 1;
        let id = table.last_id;
        row.insert(ID_KEY.to_string(), Value::Number(Number::from(id)));
        table.rows.insert(id, row);
        Ok(RecordId::new(id))
    }

    fn update(
        &mut self,
        model: &ModelSpec,
        id: RecordId,
        record: &Record,
    ) -> Result<(), StoreError> {
        let table = self.guard.table_mut(&model.table)?;
        let Some(existing) = table.rows.get(&id.get()) else {
            return Err(StoreError::Invalid(format!("record {id} not found in {}", model.table)));
        };
        let mut row = existing.clone();
        for column in &model.columns {
            if let Some(value) = record.get(column.name.as_str()) {
                row.insert(column.name.to_string(), value.clone());
            }
        }
        Self::check_unique(table, Some(id.get()), &row)?;
        table.rows.insert(id.get(), row);
        Ok(())
    }

    fn delete(&mut self, model: &ModelSpec, id: RecordId) -> Result<bool, StoreError> {
        let removed = self.guard.table_mut(&model.table)?.rows.remove(&id.get()).is_some();
        if removed {
            let target = Value::Number(Number::from(id.get()));
            for table in self.guard.tables.values_mut() {
                let columns: Vec<String> = table
                    .lookups
                    .iter()
                    .filter(|(_, referenced)| **referenced == model.table)
                    .map(|(column, _)| column.clone())
                    .collect();
                for row in table.rows.values_mut() {
                    for column in &columns {
                        if row.get(column).is_some_and(|value| loosely_equal(value, &target)) {
                            row.insert(column.clone(), Value::Null);
                        }
                    }
                }
            }
        }
        Ok(removed)
    }

    fn get(&mut self, model: &ModelSpec, id: RecordId) -> Result<Option<Record>, StoreError> {
        self.guard.get(model, id)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.snapshot = None;
        Ok(())
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Orders a stored row as `id` followed by model columns.
fn shape_row(model: &ModelSpec, row: &Record) -> Record {
    let mut shaped = Record::new();
    shaped.insert(ID_KEY.to_string(), row.get(ID_KEY).cloned().unwrap_or(Value::Null));
    for column in &model.columns {
        let value = row.get(column.name.as_str()).cloned().unwrap_or(Value::Null);
        shaped.insert(column.name.to_string(), value);
    }
    shaped
}

/// Returns true when any searchable column contains `needle`.
fn matches_search(model: &ModelSpec, row: &Record, needle: &str) -> bool {
    model.columns.iter().filter(|column| column.data_type.is_searchable()).any(|column| {
        row.get(column.name.as_str())
            .and_then(Value::as_str)
            .is_some_and(|text| text.to_lowercase().contains(needle))
    })
}

/// Compares values treating numeric strings and numbers alike.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::String(b)) | (Value::String(b), Value::Number(a)) => {
            b.trim().parse::<f64>().ok() == a.as_f64()
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Orders values: null first, then booleans, numbers, and strings.
fn compare_values(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            a.as_f64().unwrap_or(0.0).total_cmp(&b.as_f64().unwrap_or(0.0))
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => rank(left).cmp(&rank(right)),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
