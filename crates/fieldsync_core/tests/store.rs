//! On-disk behavior of the record store.

use fieldsync_codec::Value;
use fieldsync_core::{
    CoreError, IntegrityChecker, LogStore, PendingRecord, Priority, RecordKind, RecordStore,
    StoreConfig,
};
use std::fs::OpenOptions;
use std::io::Write;
use tempfile::tempdir;

fn registration(head: &str, at: u64) -> PendingRecord {
    PendingRecord::new(
        RecordKind::HouseholdRegistration,
        Value::map([("head", Value::from(head)), ("members", Value::from(4))]),
        Priority::High,
        at,
    )
    .unwrap()
}

#[test]
fn pending_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::new(dir.path());

    let first = registration("Ana", 10);
    let second = registration("Ben", 20);
    {
        let store = LogStore::open_dir(&config).unwrap();
        store.put(second.clone()).unwrap();
        store.put(first.clone()).unwrap();
        store.mark_synced(&second.id).unwrap();
    }

    let store = LogStore::open_dir(&config).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.pending().unwrap(), vec![first.clone()]);
    assert!(IntegrityChecker::default().verify(&first).valid);
    assert!(store.get(&second.id).unwrap().unwrap().synced);
}

#[test]
fn torn_tail_is_dropped_on_open() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::new(dir.path());
    let kept = registration("Ana", 10);
    {
        let store = LogStore::open_dir(&config).unwrap();
        store.put(kept.clone()).unwrap();
    }
    let intact_len = std::fs::metadata(config.records_path()).unwrap().len();

    // half a frame, as left by a crash mid-append
    let mut file = OpenOptions::new()
        .append(true)
        .open(config.records_path())
        .unwrap();
    file.write_all(&[60, 0, 0, 0, 0, 1, 2, 3]).unwrap();
    drop(file);

    let store = LogStore::open_dir(&config).unwrap();
    assert_eq!(store.pending().unwrap(), vec![kept]);
    assert_eq!(
        std::fs::metadata(config.records_path()).unwrap().len(),
        intact_len
    );

    store.put(registration("Cy", 30)).unwrap();
    drop(store);
    assert_eq!(LogStore::open_dir(&config).unwrap().len(), 2);
}

#[test]
fn version_never_moves_backwards_across_reopen() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::new(dir.path()).sync_on_write(false);
    let mut record = registration("Ana", 10);
    record.version = 4;
    LogStore::open_dir(&config)
        .unwrap()
        .put(record.clone())
        .unwrap();

    let store = LogStore::open_dir(&config).unwrap();
    record.version = 3;
    assert!(matches!(
        store.put(record),
        Err(CoreError::VersionRegression { stored: 4, .. })
    ));
}

#[test]
fn deleted_records_stay_deleted() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::new(dir.path());
    let record = registration("Ana", 10);
    {
        let store = LogStore::open_dir(&config).unwrap();
        store.put(record.clone()).unwrap();
        assert!(store.delete(&record.id).unwrap());
    }
    let store = LogStore::open_dir(&config).unwrap();
    assert!(store.is_empty());
    assert_eq!(store.approx_size_bytes(), 0);
}

#[test]
fn purge_shrinks_the_file_and_survives_reopen() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::new(dir.path()).sync_on_write(false);
    let done = registration("Ana", 10);
    let open = registration("Ben", 20);
    {
        let store = LogStore::open_dir(&config).unwrap();
        store.put(done.clone()).unwrap();
        store.put(open.clone()).unwrap();
        for _ in 0..1_000 {
            store.increment_retry(&done.id).unwrap();
        }
        store.mark_synced(&done.id).unwrap();
        let grown = std::fs::metadata(config.records_path()).unwrap().len();

        assert_eq!(store.purge_synced().unwrap(), 1);
        let shrunk = std::fs::metadata(config.records_path()).unwrap().len();
        assert!(shrunk < grown);
        assert_eq!(shrunk, store.approx_size_bytes());

        // appends after the swap land in the new file
        store.increment_retry(&open.id).unwrap();
    }

    let store = LogStore::open_dir(&config).unwrap();
    assert_eq!(store.len(), 1);
    assert!(store.get(&done.id).unwrap().is_none());
    assert_eq!(store.get(&open.id).unwrap().unwrap().retry_count, 1);
    assert!(!dir.path().join("records.log.compact").exists());
}
