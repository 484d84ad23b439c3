//! Cross-backend transaction scenarios and properties.
//!
//! Exercises the `Storage` contract through its public API only, the way
//! the higher-level document store consumes it: generic over the backend,
//! including through trait objects.

use leafdb_storage::{
    Document, FileStorage, MemoryStorage, Snapshot, Storage, StorageError, StorageExt, Table,
};
use proptest::prelude::*;
use serde_json::json;
use tempfile::tempdir;

fn snapshot(table: &str, id: &str, record: serde_json::Value) -> Snapshot {
    let serde_json::Value::Object(document) = record else {
        panic!("record must be a JSON object");
    };
    let mut records = Table::new();
    records.insert(id.to_string(), document);
    let mut tables = Snapshot::new();
    tables.insert(table.to_string(), records);
    tables
}

/// An application-level error the scoped helper must pass through untouched.
#[derive(Debug, PartialEq)]
enum AppError {
    Storage(String),
    Conflict,
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err.to_string())
    }
}

fn rollback_restores_pre_begin_state<S: Storage>(storage: &mut S) {
    let before = snapshot("_default", "1", json!({"name": "a"}));
    let during = snapshot("_default", "1", json!({"name": "b"}));

    storage.write(&before).unwrap();
    storage.begin().unwrap();
    storage.write(&during).unwrap();
    storage.rollback().unwrap();

    assert_eq!(storage.read().unwrap(), Some(before));
    assert!(!storage.in_transaction());
}

#[test]
fn rollback_restores_pre_begin_state_on_both_backends() {
    let dir = tempdir().unwrap();
    let mut file = FileStorage::open(dir.path().join("db.json")).unwrap();
    rollback_restores_pre_begin_state(&mut file);

    let mut memory = MemoryStorage::new();
    rollback_restores_pre_begin_state(&mut memory);
}

#[test]
fn commit_keeps_written_snapshot_and_leaves_no_backup() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.json");
    let mut storage = FileStorage::open(&path).unwrap();

    let mut data = Snapshot::new();
    data.insert("t".to_string(), Table::new());

    storage.begin().unwrap();
    storage.write(&data).unwrap();
    storage.commit().unwrap();

    assert_eq!(storage.read().unwrap(), Some(data));

    let mut backup = path.into_os_string();
    backup.push(".backup");
    assert!(!std::path::PathBuf::from(backup).exists());
}

#[test]
fn memory_commit_then_failed_second_transaction() {
    let mut storage = MemoryStorage::new();
    let committed = snapshot("t", "1", json!({}));

    storage.begin().unwrap();
    storage.write(&committed).unwrap();
    storage.commit().unwrap();

    storage.begin().unwrap();
    let mut emptied = Snapshot::new();
    emptied.insert("t".to_string(), Table::new());
    storage.write(&emptied).unwrap();
    storage.rollback().unwrap();

    assert_eq!(storage.read().unwrap(), Some(committed));
}

#[test]
fn transaction_helper_commits_on_success() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.json");
    let mut storage = FileStorage::open(&path).unwrap();
    let data = snapshot("users", "1", json!({"name": "ada"}));

    storage.transaction(|s| s.write(&data)).unwrap();

    assert!(!storage.in_transaction());
    assert_eq!(storage.read().unwrap(), Some(data));

    // The lock is free again: a fresh instance can begin without blocking.
    let mut fresh = FileStorage::open(&path).unwrap();
    fresh.begin().unwrap();
    fresh.rollback().unwrap();
}

#[test]
fn transaction_helper_rolls_back_and_reraises_on_failure() {
    let dir = tempdir().unwrap();
    let mut storage = FileStorage::open(dir.path().join("db.json")).unwrap();
    let before = snapshot("users", "1", json!({"name": "ada"}));
    storage.write(&before).unwrap();

    let result: Result<(), AppError> = storage.transaction(|s| {
        s.write(&snapshot("users", "1", json!({"name": "eve"})))?;
        Err(AppError::Conflict)
    });

    assert_eq!(result, Err(AppError::Conflict));
    assert!(!storage.in_transaction());
    assert_eq!(storage.read().unwrap(), Some(before));
}

#[test]
fn transaction_helper_works_on_trait_objects() {
    let dir = tempdir().unwrap();
    let file = FileStorage::open(dir.path().join("db.json")).unwrap();
    let backends: Vec<Box<dyn Storage>> =
        vec![Box::new(file), Box::new(MemoryStorage::new())];

    for mut storage in backends {
        let data = snapshot("t", "1", json!({"via": "dyn"}));
        let storage: &mut dyn Storage = storage.as_mut();
        storage.transaction(|s| s.write(&data)).unwrap();
        assert_eq!(storage.read().unwrap(), Some(data));
        storage.close().unwrap();
    }
}

#[test]
fn sequential_transactions_from_separate_instances() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.json");

    {
        let mut writer = FileStorage::open(&path).unwrap();
        writer
            .transaction(|s| s.write(&snapshot("t", "1", json!({"n": 1}))))
            .unwrap();
    }

    let mut second = FileStorage::open(&path).unwrap();
    second
        .transaction(|s| {
            let mut current = s.read()?.unwrap_or_default();
            current
                .entry("t".to_string())
                .or_insert_with(Table::new)
                .insert("2".to_string(), Document::new());
            s.write(&current)
        })
        .unwrap();

    let read = second.read().unwrap().unwrap();
    assert_eq!(read["t"].len(), 2);
}

fn json_value_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-z0-9 ]{0,12}".prop_map(serde_json::Value::from),
    ]
}

fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map("[a-z]{1,8}", json_value_strategy(), 0..4)
        .prop_map(|fields| fields.into_iter().collect())
}

fn table_strategy() -> impl Strategy<Value = Table> {
    prop::collection::btree_map("[0-9]{1,4}", document_strategy(), 0..4)
}

fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    prop::collection::btree_map("[a-z_]{1,8}", table_strategy(), 0..3)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn file_round_trips_any_snapshot(data in snapshot_strategy()) {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path().join("db.json")).unwrap();

        storage.write(&data).unwrap();
        prop_assert_eq!(storage.read().unwrap(), Some(data));
    }

    #[test]
    fn memory_round_trips_any_snapshot(data in snapshot_strategy()) {
        let mut storage = MemoryStorage::new();

        storage.write(&data).unwrap();
        prop_assert_eq!(storage.read().unwrap(), Some(data));
    }

    #[test]
    fn failed_transaction_is_a_no_op(
        before in snapshot_strategy(),
        attempted in snapshot_strategy(),
    ) {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path().join("db.json")).unwrap();
        storage.write(&before).unwrap();

        let result: Result<(), AppError> = storage.transaction(|s| {
            s.write(&attempted)?;
            Err(AppError::Conflict)
        });

        prop_assert_eq!(result, Err(AppError::Conflict));
        prop_assert_eq!(storage.read().unwrap(), Some(before));
    }
}
