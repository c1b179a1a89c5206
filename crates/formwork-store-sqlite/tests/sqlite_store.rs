// formwork-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Record, transaction, and settings behavior of the SQLite store.
// Purpose: Validate installs, queries, rollback, constraints, and versioning.
// ============================================================================

//! ## Overview
//! Exercises [`SqliteRecordStore`] against temporary database files:
//! - Table install, inserts, reads, and paged list queries
//! - Rollback of dropped transactions
//! - Unique and foreign key constraints
//! - Settings upsert and prefix deletes
//! - Schema version checks and path safety

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use formwork_core::ColumnName;
use formwork_core::ColumnSpec;
use formwork_core::DataType;
use formwork_core::ListQuery;
use formwork_core::ModelSpec;
use formwork_core::OrderBy;
use formwork_core::Record;
use formwork_core::RecordId;
use formwork_core::RecordStore;
use formwork_core::SettingsStore;
use formwork_core::StoreError;
use formwork_core::TableSchema;
use formwork_store_sqlite::SqliteRecordStore;
use formwork_store_sqlite::SqliteStoreConfig;
use formwork_store_sqlite::SqliteStoreError;
use formwork_store_sqlite::SqliteStoreMode;
use proptest::prelude::*;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn customer_model() -> ModelSpec {
    let mut model = ModelSpec::new("Crm/Customer", "customers")
        .with_column(ColumnSpec::new("name", DataType::Varchar))
        .with_column(ColumnSpec::new("code", DataType::Varchar))
        .with_column(ColumnSpec::new("active", DataType::Boolean))
        .with_column(ColumnSpec::new("meta", DataType::Json));
    model.unique = vec![vec![ColumnName::new("code")]];
    model
}

fn contact_model() -> ModelSpec {
    ModelSpec::new("Crm/Contact", "contacts")
        .with_column(ColumnSpec::new("customer", DataType::Lookup).lookup("Crm/Customer"))
        .with_column(ColumnSpec::new("email", DataType::Varchar))
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("nested").join("formwork.sqlite")
}

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn installed(dir: &TempDir) -> (SqliteRecordStore, ModelSpec, ModelSpec) {
    let store = SqliteRecordStore::new(&SqliteStoreConfig::new(db_path(dir))).unwrap();
    let customers = customer_model();
    let contacts = contact_model();
    let mut tx = store.begin().unwrap();
    tx.create_table(&TableSchema {
        model: &customers,
        lookup_tables: BTreeMap::new(),
    })
    .unwrap();
    tx.create_table(&TableSchema {
        model: &contacts,
        lookup_tables: BTreeMap::from([("customer".to_string(), "customers".to_string())]),
    })
    .unwrap();
    tx.commit().unwrap();
    (store, customers, contacts)
}

fn insert(store: &SqliteRecordStore, model: &ModelSpec, value: Value) -> RecordId {
    let mut tx = store.begin().unwrap();
    let id = tx.insert(model, &record(value)).unwrap();
    tx.commit().unwrap();
    id
}

// ============================================================================
// SECTION: Records
// ============================================================================

#[test]
fn inserted_records_read_back_with_typed_values() {
    let dir = TempDir::new().unwrap();
    let (store, customers, _) = installed(&dir);
    let id = insert(
        &store,
        &customers,
        json!({"name": "Acme", "code": "A1", "active": true, "meta": {"tier": 2}}),
    );
    let loaded = store.get(&customers, id).unwrap().unwrap();
    assert_eq!(loaded["id"], json!(id.get()));
    assert_eq!(loaded["active"], json!(true));
    assert_eq!(loaded["meta"], json!({"tier": 2}));

    let mut tx = store.begin().unwrap();
    tx.update(&customers, id, &record(json!({"name": "Acme Ltd"}))).unwrap();
    tx.commit().unwrap();
    let loaded = store.get(&customers, id).unwrap().unwrap();
    assert_eq!(loaded["name"], json!("Acme Ltd"));
    assert_eq!(loaded["code"], json!("A1"));
}

#[test]
fn list_applies_search_filters_order_and_paging() {
    let dir = TempDir::new().unwrap();
    let (store, customers, _) = installed(&dir);
    for (name, code) in [("Alpha", "a"), ("Beta", "b"), ("Alphabet", "c"), ("Gamma", "d")] {
        insert(&store, &customers, json!({"name": name, "code": code, "active": code != "d"}));
    }

    let searched = store
        .list(
            &customers,
            &ListQuery {
                search: Some("alpha".to_string()),
                order_by: OrderBy {
                    column: "name".to_string(),
                    descending: false,
                },
                ..ListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(searched.total, 2);
    assert_eq!(searched.data[0]["name"], json!("Alpha"));
    assert_eq!(searched.data[1]["name"], json!("Alphabet"));

    let paged = store
        .list(
            &customers,
            &ListQuery {
                page: 2,
                items_per_page: 3,
                ..ListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(paged.total, 4);
    assert_eq!(paged.data.len(), 1);
    assert_eq!(paged.data[0]["name"], json!("Alpha"));

    let mut filters = serde_json::Map::new();
    filters.insert("active".to_string(), json!(false));
    let filtered = store
        .list(
            &customers,
            &ListQuery {
                filters,
                ..ListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.data[0]["code"], json!("d"));
}

#[test]
fn unknown_order_column_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (store, customers, _) = installed(&dir);
    let err = store
        .list(
            &customers,
            &ListQuery {
                order_by: OrderBy {
                    column: "name; DROP TABLE customers".to_string(),
                    descending: false,
                },
                ..ListQuery::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}

// ============================================================================
// SECTION: Transactions and Constraints
// ============================================================================

#[test]
fn dropped_transactions_roll_back() {
    let dir = TempDir::new().unwrap();
    let (store, customers, _) = installed(&dir);
    {
        let mut tx = store.begin().unwrap();
        tx.insert(&customers, &record(json!({"name": "Ghost", "code": "g"}))).unwrap();
    }
    let page = store.list(&customers, &ListQuery::default()).unwrap();
    assert_eq!(page.total, 0);
}

#[test]
fn duplicate_unique_values_report_the_columns() {
    let dir = TempDir::new().unwrap();
    let (store, customers, _) = installed(&dir);
    insert(&store, &customers, json!({"name": "One", "code": "dup"}));
    let mut tx = store.begin().unwrap();
    let err = tx.insert(&customers, &record(json!({"name": "Two", "code": "dup"}))).unwrap_err();
    assert_eq!(err, StoreError::UniqueViolation("code".to_string()));
}

#[test]
fn deleting_a_lookup_target_clears_the_reference() {
    let dir = TempDir::new().unwrap();
    let (store, customers, contacts) = installed(&dir);
    let customer = insert(&store, &customers, json!({"name": "Acme", "code": "a"}));
    let contact =
        insert(&store, &contacts, json!({"customer": customer.get(), "email": "a@b.c"}));

    let children = store.children(&contacts, "customer", customer).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["email"], json!("a@b.c"));

    let mut tx = store.begin().unwrap();
    assert!(tx.delete(&customers, customer).unwrap());
    assert!(!tx.delete(&customers, customer).unwrap());
    tx.commit().unwrap();
    let orphan = store.get(&contacts, contact).unwrap().unwrap();
    assert_eq!(orphan["customer"], Value::Null);
}

#[test]
fn missing_tables_are_reported() {
    let dir = TempDir::new().unwrap();
    let store = SqliteRecordStore::new(&SqliteStoreConfig::new(db_path(&dir))).unwrap();
    let err = store.get(&customer_model(), RecordId::new(1)).unwrap_err();
    assert_eq!(err, StoreError::MissingTable("customers".to_string()));
}

// ============================================================================
// SECTION: Settings
// ============================================================================

#[test]
fn settings_prefix_delete_keeps_siblings() {
    let dir = TempDir::new().unwrap();
    let (store, _, _) = installed(&dir);
    store
        .upsert_settings(&[
            ("mail/host".to_string(), json!("smtp.local")),
            ("mail/port".to_string(), json!(25)),
            ("mailer".to_string(), json!(true)),
        ])
        .unwrap();
    store.upsert_settings(&[("mail/port".to_string(), json!(587))]).unwrap();
    assert_eq!(store.delete_settings_prefix("mail").unwrap(), 2);
    assert_eq!(store.load_settings().unwrap(), vec![("mailer".to_string(), json!(true))]);
}

// ============================================================================
// SECTION: Setup
// ============================================================================

#[test]
fn data_survives_reopen_in_delete_journal_mode() {
    let dir = TempDir::new().unwrap();
    let (store, customers, _) = installed(&dir);
    let id = insert(&store, &customers, json!({"name": "Kept", "code": "k"}));
    drop(store);
    let mut config = SqliteStoreConfig::new(db_path(&dir));
    config.journal_mode = SqliteStoreMode::Delete;
    let reopened = SqliteRecordStore::new(&config).unwrap();
    assert_eq!(reopened.get(&customers, id).unwrap().unwrap()["name"], json!("Kept"));
}

#[test]
fn unknown_schema_versions_fail_closed() {
    let dir = TempDir::new().unwrap();
    drop(SqliteRecordStore::new(&SqliteStoreConfig::new(db_path(&dir))).unwrap());
    let connection = rusqlite::Connection::open(db_path(&dir)).unwrap();
    connection.execute("UPDATE store_meta SET version = 99", []).unwrap();
    drop(connection);
    let err = SqliteRecordStore::new(&SqliteStoreConfig::new(db_path(&dir))).err().unwrap();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn directory_paths_are_rejected() {
    let dir = TempDir::new().unwrap();
    let err = SqliteRecordStore::new(&SqliteStoreConfig::new(dir.path())).err().unwrap();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn search_matches_wildcard_text_literally(name in "[a-y%_]{1,12}") {
        let dir = TempDir::new().unwrap();
        let (store, customers, _) = installed(&dir);
        insert(&store, &customers, json!({"name": name, "code": "x"}));
        insert(&store, &customers, json!({"name": "zzzzzzzzzzzzzz", "code": "y"}));
        let page = store
            .list(&customers, &ListQuery { search: Some(name.clone()), ..ListQuery::default() })
            .unwrap();
        prop_assert_eq!(page.total, 1);
        prop_assert_eq!(&page.data[0]["name"], &json!(name));
    }
}
