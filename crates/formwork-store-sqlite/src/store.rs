// formwork-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Record Store
// Description: Durable RecordStore and SettingsStore backed by SQLite.
// Purpose: Persist model records and runtime settings with transactional saves.
// Dependencies: formwork-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteRecordStore`] serializes access to one `SQLite` connection through a
//! mutex. [`RecordStore::begin`] takes the lock, issues `BEGIN IMMEDIATE`, and
//! returns a transaction guard that holds the lock until it is committed or
//! dropped; dropping an uncommitted guard rolls back.
//! Invariants:
//! - `store_meta` records the schema version; other versions fail closed.
//! - Unique constraint failures surface as [`StoreError::UniqueViolation`].
//! - Settings rows store each leaf value as JSON text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use formwork_core::ListQuery;
use formwork_core::ModelSpec;
use formwork_core::Record;
use formwork_core::RecordId;
use formwork_core::RecordPage;
use formwork_core::RecordStore;
use formwork_core::RecordTx;
use formwork_core::SettingsRow;
use formwork_core::SettingsStore;
use formwork_core::StoreError;
use formwork_core::TableSchema;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::sql::create_table_statements;
use crate::sql::escape_like;
use crate::sql::present_columns;
use crate::sql::quote;
use crate::sql::row_to_record;
use crate::sql::select_list;
use crate::sql::to_sql;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Extended result code of unique constraint failures.
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` record store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store configuration or data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps an engine error to a store error.
fn db_error(err: &rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, message) = err {
        if failure.code == ErrorCode::ConstraintViolation
            && failure.extended_code == SQLITE_CONSTRAINT_UNIQUE
        {
            return StoreError::UniqueViolation(unique_columns(message.as_deref()));
        }
        if let Some(message) = message
            && let Some(table) = message.strip_prefix("no such table: ")
        {
            return StoreError::MissingTable(table.to_string());
        }
    }
    StoreError::Store(err.to_string())
}

/// Extracts `a, b` from `UNIQUE constraint failed: t.a, t.b`.
fn unique_columns(message: Option<&str>) -> String {
    let Some(list) = message.and_then(|message| message.split_once(": ")).map(|(_, list)| list)
    else {
        return String::new();
    };
    list.split(", ")
        .map(|qualified| qualified.rsplit('.').next().unwrap_or(qualified))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed record and settings store.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
#[derive(Clone)]
pub struct SqliteRecordStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Opens an `SQLite`-backed store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Store("sqlite connection mutex poisoned".to_string()))
    }
}

impl RecordStore for SqliteRecordStore {
    fn begin(&self) -> Result<Box<dyn RecordTx + '_>, StoreError> {
        let connection = self.lock()?;
        connection.execute_batch("BEGIN IMMEDIATE").map_err(|err| db_error(&err))?;
        Ok(Box::new(SqliteTx {
            connection,
            finished: false,
        }))
    }

    fn get(&self, model: &ModelSpec, id: RecordId) -> Result<Option<Record>, StoreError> {
        let connection = self.lock()?;
        get_row(&connection, model, id)
    }

    fn list(&self, model: &ModelSpec, query: &ListQuery) -> Result<RecordPage, StoreError> {
        let connection = self.lock()?;
        list_rows(&connection, model, query)
    }

    fn children(
        &self,
        model: &ModelSpec,
        foreign_key: &str,
        parent: RecordId,
    ) -> Result<Vec<Record>, StoreError> {
        if model.column(foreign_key).is_none() {
            return Err(StoreError::Invalid(format!("unknown column: {foreign_key}")));
        }
        let connection = self.lock()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY \"id\"",
            select_list(model),
            quote(&model.table),
            quote(foreign_key)
        );
        let mut statement = connection.prepare(&sql).map_err(|err| db_error(&err))?;
        let rows = statement
            .query_map(params![parent.get()], |row| row_to_record(model, row))
            .map_err(|err| db_error(&err))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))
    }
}

impl SettingsStore for SqliteRecordStore {
    fn load_settings(&self) -> Result<Vec<SettingsRow>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT path, value FROM settings ORDER BY path")
            .map_err(|err| db_error(&err))?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|err| db_error(&err))?;
        let mut out = Vec::new();
        for row in rows {
            let (path, text) = row.map_err(|err| db_error(&err))?;
            let value = serde_json::from_str(&text).map_err(|err| {
                StoreError::Corrupt(format!("settings value at {path} is not json: {err}"))
            })?;
            out.push((path, value));
        }
        Ok(out)
    }

    fn upsert_settings(&self, rows: &[SettingsRow]) -> Result<(), StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(|err| db_error(&err))?;
        for (path, value) in rows {
            tx.execute(
                "INSERT INTO settings (path, value) VALUES (?1, ?2)
                 ON CONFLICT(path) DO UPDATE SET value = excluded.value",
                params![path, value.to_string()],
            )
            .map_err(|err| db_error(&err))?;
        }
        tx.commit().map_err(|err| db_error(&err))
    }

    fn delete_settings_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let connection = self.lock()?;
        let pattern = format!("{}/%", escape_like(prefix));
        connection
            .execute(
                "DELETE FROM settings WHERE path = ?1 OR path LIKE ?2 ESCAPE '\\'",
                params![prefix, pattern],
            )
            .map_err(|err| db_error(&err))
    }
}

// ============================================================================
// SECTION: Transaction Guard
// ============================================================================

/// Open transaction holding the connection lock.
struct SqliteTx<'a> {
    /// Locked connection.
    connection: MutexGuard<'a, Connection>,
    /// True after commit.
    finished: bool,
}

impl RecordTx for SqliteTx<'_> {
    fn create_table(&mut self, schema: &TableSchema<'_>) -> Result<(), StoreError> {
        for statement in create_table_statements(schema) {
            self.connection.execute_batch(&statement).map_err(|err| db_error(&err))?;
        }
        Ok(())
    }

    fn insert(&mut self, model: &ModelSpec, record: &Record) -> Result<RecordId, StoreError> {
        let columns = present_columns(model, record);
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote(&model.table))
        } else {
            let names: Vec<String> =
                columns.iter().map(|(column, _)| quote(column.name.as_str())).collect();
            let slots: Vec<String> = (1 ..= columns.len()).map(|index| format!("?{index}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(&model.table),
                names.join(", "),
                slots.join(", ")
            )
        };
        let values: Vec<SqlValue> = columns.iter().map(|(_, value)| to_sql(value)).collect();
        self.connection.execute(&sql, params_from_iter(values)).map_err(|err| db_error(&err))?;
        Ok(RecordId::new(self.connection.last_insert_rowid()))
    }

    fn update(&mut self, model: &ModelSpec, id: RecordId, record: &Record) -> Result<(), StoreError> {
        let columns = present_columns(model, record);
        if columns.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(index, (column, _))| format!("{} = ?{}", quote(column.name.as_str()), index + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE \"id\" = ?{}",
            quote(&model.table),
            assignments.join(", "),
            columns.len() + 1
        );
        let mut values: Vec<SqlValue> = columns.iter().map(|(_, value)| to_sql(value)).collect();
        values.push(SqlValue::Integer(id.get()));
        self.connection.execute(&sql, params_from_iter(values)).map_err(|err| db_error(&err))?;
        Ok(())
    }

    fn delete(&mut self, model: &ModelSpec, id: RecordId) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE \"id\" = ?1", quote(&model.table));
        let removed =
            self.connection.execute(&sql, params![id.get()]).map_err(|err| db_error(&err))?;
        Ok(removed > 0)
    }

    fn get(&mut self, model: &ModelSpec, id: RecordId) -> Result<Option<Record>, StoreError> {
        get_row(&self.connection, model, id)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.connection.execute_batch("COMMIT").map_err(|err| db_error(&err))?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.connection.execute_batch("ROLLBACK");
        }
    }
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Loads one row by id.
fn get_row(
    connection: &Connection,
    model: &ModelSpec,
    id: RecordId,
) -> Result<Option<Record>, StoreError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE \"id\" = ?1",
        select_list(model),
        quote(&model.table)
    );
    connection
        .query_row(&sql, params![id.get()], |row| row_to_record(model, row))
        .optional()
        .map_err(|err| db_error(&err))
}

/// Runs a paged, filtered, searched list query.
fn list_rows(
    connection: &Connection,
    model: &ModelSpec,
    query: &ListQuery,
) -> Result<RecordPage, StoreError> {
    let mut clauses = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let searchable: Vec<String> = model
            .columns
            .iter()
            .filter(|column| column.data_type.is_searchable())
            .map(|column| format!("{} LIKE ?{} ESCAPE '\\'", quote(column.name.as_str()), values.len() + 1))
            .collect();
        if searchable.is_empty() {
            clauses.push("0".to_string());
        } else {
            clauses.push(format!("({})", searchable.join(" OR ")));
            values.push(SqlValue::Text(format!("%{}%", escape_like(search))));
        }
    }
    for (column, value) in &query.filters {
        if column != "id" && model.column(column).is_none() {
            return Err(StoreError::Invalid(format!("unknown filter column: {column}")));
        }
        if value.is_null() {
            clauses.push(format!("{} IS NULL", quote(column)));
        } else {
            values.push(filter_value(value));
            clauses.push(format!("{} = ?{}", quote(column), values.len()));
        }
    }
    let order_column = query.order_by.column.as_str();
    if order_column != "id" && model.column(order_column).is_none() {
        return Err(StoreError::Invalid(format!("unknown order column: {order_column}")));
    }
    let where_sql =
        if clauses.is_empty() { String::new() } else { format!(" WHERE {}", clauses.join(" AND ")) };
    let table = quote(&model.table);

    let count_sql = format!("SELECT COUNT(*) FROM {table}{where_sql}");
    let total: i64 = connection
        .query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))
        .map_err(|err| db_error(&err))?;

    let direction = if query.order_by.descending { "DESC" } else { "ASC" };
    let limit = i64::from(query.items_per_page);
    let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);
    let list_sql = format!(
        "SELECT {} FROM {table}{where_sql} ORDER BY {} {direction}, \"id\" {direction} LIMIT {limit} OFFSET {offset}",
        select_list(model),
        quote(order_column),
    );
    let mut statement = connection.prepare(&list_sql).map_err(|err| db_error(&err))?;
    let rows = statement
        .query_map(params_from_iter(values.iter()), |row| row_to_record(model, row))
        .map_err(|err| db_error(&err))?;
    let data = rows.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))?;
    Ok(RecordPage {
        data,
        total: u64::try_from(total).unwrap_or_default(),
    })
}

/// Converts a filter value; numeric strings compare as numbers.
fn filter_value(value: &Value) -> SqlValue {
    match value {
        Value::String(text) => text.trim().parse::<i64>().map_or_else(
            |_| SqlValue::Text(text.clone()),
            SqlValue::Integer,
        ),
        other => to_sql(other),
    }
}

// ============================================================================
// SECTION: Setup
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with pragmas applied.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

/// Creates the metadata and settings tables or validates the stored version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS settings (
                    path TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "expected schema version {SCHEMA_VERSION}, found {other}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
