// formwork-core/src/runtime/records.rs
// ============================================================================
// Module: Formwork Record Service
// Description: Record reads, lookups, deletes, and the nested save cascade.
// Purpose: Apply model semantics (types, relations, defaults) on top of a store.
// Dependencies: crate::core, crate::interfaces, crate::runtime::registry, serde, thiserror
// ============================================================================

//! ## Overview
//! The record service is the only code that writes records. A save walks the
//! submitted record tree: it normalizes every column through its data type,
//! inserts or updates the record, then descends into `has_many` and
//! `has_one` relation payloads with the saved id as master id. The whole
//! tree is written inside a single store transaction; any failure drops the
//! transaction, which rolls back every nested write.
//!
//! Invariants:
//! - Reserved keys never reach the store.
//! - A failed save leaves the store unchanged.
//! - `belongs_to` payloads are read-only and ignored on save.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use thiserror::Error;

use crate::core::DataTypeError;
use crate::core::ModelSpec;
use crate::core::NormalizeContext;
use crate::core::RecordAction;
use crate::core::RecordId;
use crate::core::RelationKind;
use crate::core::record::ID_KEY;
use crate::core::record::LOOKUP_KEY;
use crate::core::record::MASTER_RECORD_ID_PLACEHOLDER;
use crate::core::record::RELATIONS_KEY;
use crate::core::record::Record;
use crate::core::record::is_marked_for_deletion;
use crate::core::permissions::record_permission;
use crate::core::record::master_id_columns;
use crate::interfaces::ListQuery;
use crate::interfaces::OrderBy;
use crate::interfaces::RecordStore;
use crate::interfaces::RecordTx;
use crate::interfaces::StoreError;
use crate::runtime::describe::MAX_ITEMS_PER_PAGE;
use crate::runtime::describe::record_default_values;
use crate::runtime::registry::ModelRegistry;
use crate::runtime::registry::RegistryError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum rows returned by a lookup.
pub const LOOKUP_LIMIT: u32 = 100;
/// Default relation depth for reads.
pub const DEFAULT_MAX_RELATION_LEVEL: u32 = 1;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Record read and delete errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Model lookup failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Record does not exist.
    #[error("Record not found: {model} #{id}")]
    RecordNotFound {
        /// Model name.
        model: String,
        /// Requested id.
        id: i64,
    },
    /// List query is invalid.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Save cascade errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordSaveError {
    /// One or more columns failed normalization.
    #[error("invalid inputs: {}", format_invalid_inputs(.0))]
    InvalidInputs(BTreeMap<String, String>),
    /// A unique constraint rejected the write.
    #[error("Record already exists ({0}).")]
    UniqueViolation(String),
    /// Model lookup failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Store failure.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RecordSaveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(columns) => Self::UniqueViolation(columns),
            other => Self::Store(other),
        }
    }
}

/// Renders invalid input messages in column order.
fn format_invalid_inputs(inputs: &BTreeMap<String, String>) -> String {
    inputs.iter().map(|(column, message)| format!("{column}: {message}")).collect::<Vec<_>>().join("; ")
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of a save cascade.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    /// Record as submitted.
    pub original_record: Record,
    /// Record as stored, with saved relations embedded.
    pub saved_record: Record,
}

/// One page of a record list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    /// Records on the page, each with `_LOOKUP`.
    pub data: Vec<Record>,
    /// Total matching records.
    pub total: u64,
    /// One-based page number.
    pub page: u32,
    /// Page size.
    pub items_per_page: u32,
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Record operations over a store.
pub struct RecordService<'a> {
    /// Model registry.
    registry: &'a ModelRegistry,
    /// Record store.
    store: &'a dyn RecordStore,
    /// Normalization context.
    normalize: NormalizeContext,
}

impl<'a> RecordService<'a> {
    /// Creates a service.
    #[must_use]
    pub fn new(
        registry: &'a ModelRegistry,
        store: &'a dyn RecordStore,
        normalize: NormalizeContext,
    ) -> Self {
        Self {
            registry,
            store,
            normalize,
        }
    }

    /// Loads a record; ids `<= 0` return the model's default record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] when the model or record is missing.
    pub fn get(
        &self,
        model: &str,
        id: RecordId,
        include_relations: bool,
        max_level: u32,
    ) -> Result<Record, RecordError> {
        let spec = self.registry.get(model)?;
        if !id.is_persisted() {
            return Ok(record_default_values(spec));
        }
        let mut record = self.store.get(spec, id)?.ok_or_else(|| RecordError::RecordNotFound {
            model: model.to_string(),
            id: id.get(),
        })?;
        self.annotate(spec, &mut record, if include_relations { max_level } else { 0 })?;
        Ok(record)
    }

    /// Lists records.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidQuery`] for unknown order or filter
    /// columns and [`RecordError`] for store failures.
    pub fn get_list(&self, model: &str, query: &ListQuery) -> Result<ListResult, RecordError> {
        let spec = self.registry.get(model)?;
        if !is_column_or_id(spec, &query.order_by.column) {
            return Err(RecordError::InvalidQuery(format!(
                "unknown order column: {}",
                query.order_by.column
            )));
        }
        if let Some(column) = query.filters.keys().find(|column| !is_column_or_id(spec, column)) {
            return Err(RecordError::InvalidQuery(format!("unknown filter column: {column}")));
        }
        let mut query = query.clone();
        query.page = query.page.max(1);
        query.items_per_page = query.items_per_page.clamp(1, MAX_ITEMS_PER_PAGE);
        let page = self.store.list(spec, &query)?;
        let data = page
            .data
            .into_iter()
            .map(|mut record| {
                let text = spec.lookup_text(&record);
                record.insert(LOOKUP_KEY.to_string(), Value::String(text));
                record
            })
            .collect();
        Ok(ListResult {
            data,
            total: page.total,
            page: query.page,
            items_per_page: query.items_per_page,
        })
    }

    /// Returns `{id: {id, _LOOKUP}}` for up to [`LOOKUP_LIMIT`] matches.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] when the model is unknown or the store fails.
    pub fn lookup(&self, model: &str, search: Option<&str>) -> Result<Map<String, Value>, RecordError> {
        let query = ListQuery {
            search: search.map(str::to_string),
            order_by: OrderBy {
                column: ID_KEY.to_string(),
                descending: false,
            },
            items_per_page: LOOKUP_LIMIT,
            ..ListQuery::default()
        };
        let page = self.get_list(model, &query)?;
        let mut out = Map::new();
        for record in page.data {
            let id = record.get(ID_KEY).cloned().unwrap_or(Value::Null);
            let key = id.as_i64().map(|id| id.to_string()).unwrap_or_default();
            let mut entry = Map::new();
            entry.insert(ID_KEY.to_string(), id);
            entry.insert(
                LOOKUP_KEY.to_string(),
                record.get(LOOKUP_KEY).cloned().unwrap_or(Value::Null),
            );
            out.insert(key, Value::Object(entry));
        }
        Ok(out)
    }

    /// Deletes a record; returns false when it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] when the model is unknown or the store fails.
    pub fn delete(&self, model: &str, id: RecordId) -> Result<bool, RecordError> {
        let spec = self.registry.get(model)?;
        if !id.is_persisted() {
            return Ok(false);
        }
        let mut tx = self.store.begin()?;
        let removed = tx.delete(spec, id)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Saves a record tree in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RecordSaveError`] when any level fails; nothing is written.
    pub fn save(&self, model: &str, record: Record) -> Result<SaveOutcome, RecordSaveError> {
        let spec = self.registry.get(model)?;
        let mut tx = self.store.begin()?;
        let saved = self.save_level(tx.as_mut(), spec, record.clone(), None)?;
        tx.commit()?;
        Ok(SaveOutcome {
            original_record: record,
            saved_record: saved,
        })
    }

    /// Saves one level of the cascade.
    fn save_level(
        &self,
        tx: &mut dyn RecordTx,
        model: &ModelSpec,
        mut record: Record,
        master_id: Option<RecordId>,
    ) -> Result<Record, RecordSaveError> {
        for column in master_id_columns(&record) {
            match master_id {
                Some(master) => {
                    record.insert(column, Value::Number(Number::from(master.get())));
                }
                None => {
                    if record.get(&column).and_then(Value::as_str) == Some(MASTER_RECORD_ID_PLACEHOLDER)
                    {
                        record.remove(&column);
                    }
                }
            }
        }
        let id = RecordId::from_value(record.get(ID_KEY)).map_err(|err| {
            RecordSaveError::InvalidInputs(BTreeMap::from([(ID_KEY.to_string(), err.to_string())]))
        })?;
        if is_marked_for_deletion(&record) {
            if id.is_persisted() {
                tx.delete(model, id)?;
            }
            return Ok(Record::new());
        }

        let values = self.normalize_columns(model, &record, id)?;
        let saved_id = if id.is_persisted() {
            tx.update(model, id, &values)?;
            id
        } else {
            tx.insert(model, &values)?
        };
        let mut saved = tx.get(model, saved_id)?.ok_or_else(|| {
            RecordSaveError::Store(StoreError::Invalid(format!(
                "saved record {saved_id} missing from {}",
                model.table
            )))
        })?;

        for relation in &model.relations {
            let Some(payload) = record.get(&relation.name) else {
                continue;
            };
            let related = self.registry.get(relation.model.as_str())?;
            let foreign_key = relation.foreign_key.as_str();
            match (relation.kind, payload) {
                (RelationKind::HasMany, Value::Array(items)) => {
                    let mut saved_items = Vec::with_capacity(items.len());
                    for item in items {
                        let Value::Object(child) = item else {
                            continue;
                        };
                        let child = with_foreign_key(child.clone(), foreign_key, saved_id);
                        let saved_child = self.save_level(tx, related, child, Some(saved_id))?;
                        if !saved_child.is_empty() {
                            saved_items.push(Value::Object(saved_child));
                        }
                    }
                    saved.insert(relation.name.clone(), Value::Array(saved_items));
                }
                (RelationKind::HasOne, Value::Object(child)) => {
                    let child = with_foreign_key(child.clone(), foreign_key, saved_id);
                    let saved_child = self.save_level(tx, related, child, Some(saved_id))?;
                    let value =
                        if saved_child.is_empty() { Value::Null } else { Value::Object(saved_child) };
                    saved.insert(relation.name.clone(), value);
                }
                _ => {}
            }
        }
        Ok(saved)
    }

    /// Normalizes submitted columns; new records receive column defaults.
    fn normalize_columns(
        &self,
        model: &ModelSpec,
        record: &Record,
        id: RecordId,
    ) -> Result<Record, RecordSaveError> {
        let mut values = Record::new();
        let mut errors = BTreeMap::new();
        for column in &model.columns {
            let name = column.name.as_str();
            let raw = match (record.get(name), &column.default) {
                (Some(raw), _) => raw.clone(),
                (None, Some(default)) if !id.is_persisted() => default.clone(),
                (None, _) if !id.is_persisted() && column.required => Value::Null,
                (None, _) => continue,
            };
            match column.data_type.normalize(column, &raw, &self.normalize) {
                Ok(Some(value)) => {
                    values.insert(name.to_string(), value);
                }
                Ok(None) if column.required && !id.is_persisted() => {
                    let err = DataTypeError::Required(column.title());
                    errors.insert(name.to_string(), err.to_string());
                }
                Ok(None) => {}
                Err(err) => {
                    errors.insert(name.to_string(), err.to_string());
                }
            }
        }
        if errors.is_empty() { Ok(values) } else { Err(RecordSaveError::InvalidInputs(errors)) }
    }

    /// Adds `_LOOKUP` and, when `levels > 0`, embedded relations.
    fn annotate(&self, model: &ModelSpec, record: &mut Record, levels: u32) -> Result<(), RecordError> {
        let text = model.lookup_text(record);
        record.insert(LOOKUP_KEY.to_string(), Value::String(text));
        if levels == 0 || model.relations.is_empty() {
            return Ok(());
        }
        let id = RecordId::from_value(record.get(ID_KEY)).unwrap_or(RecordId::NEW);
        let mut included = Vec::new();
        for relation in &model.relations {
            let related = self.registry.get(relation.model.as_str())?;
            let foreign_key = relation.foreign_key.as_str();
            let value = match relation.kind {
                RelationKind::HasMany => {
                    let mut items = Vec::new();
                    for mut child in self.store.children(related, foreign_key, id)? {
                        self.annotate(related, &mut child, levels - 1)?;
                        items.push(Value::Object(child));
                    }
                    Value::Array(items)
                }
                RelationKind::HasOne => match self.store.children(related, foreign_key, id)?.into_iter().next() {
                    Some(mut child) => {
                        self.annotate(related, &mut child, levels - 1)?;
                        Value::Object(child)
                    }
                    None => Value::Null,
                },
                RelationKind::BelongsTo => {
                    let target = RecordId::from_value(record.get(foreign_key)).unwrap_or(RecordId::NEW);
                    match target.is_persisted().then(|| self.store.get(related, target)).transpose()? {
                        Some(Some(mut parent)) => {
                            self.annotate(related, &mut parent, levels - 1)?;
                            Value::Object(parent)
                        }
                        _ => Value::Null,
                    }
                }
            };
            record.insert(relation.name.clone(), value);
            included.push(Value::String(relation.name.clone()));
        }
        record.insert(RELATIONS_KEY.to_string(), Value::Array(included));
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses `"column [asc|desc]"` against a model.
///
/// # Errors
///
/// Returns [`RecordError::InvalidQuery`] for unknown columns or directions.
pub fn parse_order_by(model: &ModelSpec, text: &str) -> Result<OrderBy, RecordError> {
    let mut parts = text.split_whitespace();
    let column = parts.next().unwrap_or(ID_KEY);
    let descending = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        None | Some("asc") => false,
        Some("desc") => true,
        Some(other) => return Err(RecordError::InvalidQuery(format!("unknown order direction: {other}"))),
    };
    if parts.next().is_some() || !is_column_or_id(model, column) {
        return Err(RecordError::InvalidQuery(format!("invalid order: {text}")));
    }
    Ok(OrderBy {
        column: column.to_string(),
        descending,
    })
}

/// Lists the record permissions a save cascade needs, one entry per model and
/// action across every nesting level.
///
/// Levels marked for deletion need `:Delete` when they carry an id and add
/// nothing otherwise; their children are not visited.
///
/// # Errors
///
/// Returns [`RegistryError`] when a relation targets an unknown model.
pub fn cascade_permissions(
    registry: &ModelRegistry,
    model: &ModelSpec,
    record: &Record,
) -> Result<BTreeSet<String>, RegistryError> {
    let mut permissions = BTreeSet::new();
    collect_cascade_permissions(registry, model, record, &mut permissions)?;
    Ok(permissions)
}

/// Walks one cascade level for [`cascade_permissions`].
fn collect_cascade_permissions(
    registry: &ModelRegistry,
    model: &ModelSpec,
    record: &Record,
    permissions: &mut BTreeSet<String>,
) -> Result<(), RegistryError> {
    let persisted = RecordId::from_value(record.get(ID_KEY)).is_ok_and(RecordId::is_persisted);
    if is_marked_for_deletion(record) {
        if persisted {
            permissions.insert(record_permission(&model.name, RecordAction::Delete));
        }
        return Ok(());
    }
    let action = if persisted { RecordAction::Update } else { RecordAction::Create };
    permissions.insert(record_permission(&model.name, action));
    for relation in &model.relations {
        let children: Vec<&Record> = match (relation.kind, record.get(&relation.name)) {
            (RelationKind::HasMany, Some(Value::Array(items))) => {
                items.iter().filter_map(Value::as_object).collect()
            }
            (RelationKind::HasOne, Some(Value::Object(child))) => vec![child],
            _ => continue,
        };
        if children.is_empty() {
            continue;
        }
        let related = registry.get(relation.model.as_str())?;
        for child in children {
            collect_cascade_permissions(registry, related, child, permissions)?;
        }
    }
    Ok(())
}

/// Returns true for `id` and declared columns.
fn is_column_or_id(model: &ModelSpec, column: &str) -> bool {
    column == ID_KEY || model.column(column).is_some()
}

/// Sets the foreign key of a child record to the master id.
fn with_foreign_key(mut child: Record, foreign_key: &str, master: RecordId) -> Record {
    child.insert(foreign_key.to_string(), Value::Number(Number::from(master.get())));
    child
}

// ============================================================================
// SECTION: Tests
// ============================================================================
