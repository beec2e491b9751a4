//! Shared behavioral tests for every backend variant.
//!
//! Each variant gets its own scratch directory and environment and runs the
//! same suite through the facade, so any translation-layer difference shows
//! up as a failure for that variant only.

use super::BackendKind;
use crate::config::LdbmConfig;
use crate::datum::Datum;
use crate::env::LdbmEnv;
use crate::facade::Ldbm;
use crate::flags::{OpenMode, StoreFlags};
use crate::native::db2::{DB_KEYEXIST, DB_NOTFOUND};
use crate::native::errno;
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

fn open_env(kind: BackendKind, dir: &Path) -> Arc<LdbmEnv> {
    let config = LdbmConfig {
        env_home: Some(dir.join("env")),
        ..LdbmConfig::default()
    }
    .with_backend(kind);
    Arc::new(LdbmEnv::new(config).unwrap())
}

fn open_store(env: &Arc<LdbmEnv>, dir: &Path, name: &str) -> Ldbm {
    env.open(dir.join(name), OpenMode::WRCREAT, 0o600, 0).unwrap()
}

/// Run the full suite against one backend variant.
pub fn run_backend_tests(kind: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let env = open_env(kind, dir.path());
    assert_eq!(env.kind(), kind);

    test_replace_then_fetch(&open_store(&env, dir.path(), "replace"));
    test_fetch_never_stored(&open_store(&env, dir.path(), "miss"));
    test_insert_does_not_overwrite(&open_store(&env, dir.path(), "insert"));
    test_delete(&open_store(&env, dir.path(), "delete"));
    test_iteration_visits_each_key_once(&open_store(&env, dir.path(), "iterate"));
    test_empty_store_iteration(&open_store(&env, dir.path(), "empty"));
    test_zero_byte_key_round_trip(&open_store(&env, dir.path(), "zero"));
    test_binary_values(&open_store(&env, dir.path(), "binary"));
    test_sync_flag(&open_store(&env, dir.path(), "sync"));
    test_empty_key_is_refused(&open_store(&env, dir.path(), "empty-key"));
    test_large_value(&open_store(&env, dir.path(), "large"));
    test_reorganize_keeps_data(&open_store(&env, dir.path(), "reorganize"));
    test_concrete_scenario(&env, dir.path());
    test_reopen_keeps_data(&env, dir.path());
    test_writes_after_torn_log_survive(&env, dir.path());
}

fn test_replace_then_fetch(db: &Ldbm) {
    assert_eq!(db.store("k", "v1", StoreFlags::REPLACE), Ok(()));
    assert_eq!(db.fetch("k"), b"v1");
    assert_eq!(db.store("k", "v2", StoreFlags::REPLACE), Ok(()));
    assert_eq!(db.fetch("k"), b"v2");
}

fn test_fetch_never_stored(db: &Ldbm) {
    let value = db.fetch("never-stored");
    assert!(value.is_empty());
}

fn test_insert_does_not_overwrite(db: &Ldbm) {
    assert_eq!(db.store("k", "v1", StoreFlags::INSERT), Ok(()));
    let failure = db.store("k", "v2", StoreFlags::INSERT).unwrap_err();
    assert_ne!(failure.code, 0);
    assert_eq!(db.fetch("k"), b"v1");
}

fn test_delete(db: &Ldbm) {
    db.store("gone", "soon", StoreFlags::REPLACE).unwrap();
    assert_eq!(db.delete("gone"), Ok(()));
    assert!(db.fetch("gone").is_empty());
    assert!(db.delete("gone").is_err());
    assert!(db.delete("never-there").is_err());
}

fn test_iteration_visits_each_key_once(db: &Ldbm) {
    for key in ["A", "B", "C"] {
        db.store(key, "x", StoreFlags::REPLACE).unwrap();
    }

    let (mut key, mut cursor) = db.first_key();
    let mut seen = Vec::new();
    while !key.is_empty() {
        seen.push(key.clone());
        key = db.next_key(key, &mut cursor);
    }
    assert!(cursor.is_done());

    let unique: BTreeSet<Datum> = seen.iter().cloned().collect();
    assert_eq!(seen.len(), 3);
    let expected: BTreeSet<Datum> = ["A", "B", "C"].into_iter().map(Datum::from).collect();
    assert_eq!(unique, expected);

    let via_iter: BTreeSet<Datum> = db.keys().collect();
    assert_eq!(via_iter, expected);
}

fn test_empty_store_iteration(db: &Ldbm) {
    let (key, cursor) = db.first_key();
    assert!(key.is_empty());
    assert!(cursor.is_done());
    assert_eq!(db.keys().count(), 0);
}

fn test_zero_byte_key_round_trip(db: &Ldbm) {
    let key = [0u8];
    assert_eq!(db.store(key, "zero", StoreFlags::REPLACE), Ok(()));
    assert_eq!(db.fetch(key), b"zero");

    let keys: Vec<Datum> = db.keys().collect();
    assert_eq!(keys, vec![Datum::from(&key[..])]);
}

fn test_binary_values(db: &Ldbm) {
    let value: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    db.store(b"bin", &value, StoreFlags::REPLACE).unwrap();
    assert_eq!(db.fetch(b"bin").into_vec(), value);
}

fn test_sync_flag(db: &Ldbm) {
    assert_eq!(db.store("durable", "yes", StoreFlags::REPLACE | StoreFlags::SYNC), Ok(()));
    assert_eq!(db.sync(), Ok(()));
    assert_eq!(db.fetch("durable"), b"yes");
}

fn test_empty_key_is_refused(db: &Ldbm) {
    for key in ["A", "B", "C"] {
        db.store(key, "x", StoreFlags::REPLACE).unwrap();
    }
    let failure = db.store("", "hidden", StoreFlags::REPLACE).unwrap_err();
    assert_eq!(failure.code, errno::EINVAL);
    assert!(db.fetch("").is_empty());
    assert_eq!(db.keys().count(), 3);
}

fn test_large_value(db: &Ldbm) {
    let value: Vec<u8> = (0..150_000u32).map(|i| (i % 253) as u8).collect();
    assert_eq!(db.store("large", &value, StoreFlags::REPLACE), Ok(()));
    assert_eq!(db.fetch("large").into_vec(), value);

    // Shrinking and growing again reuses the chain correctly
    db.store("large", "tiny", StoreFlags::REPLACE).unwrap();
    assert_eq!(db.fetch("large"), b"tiny");
    db.store("large", &value[..100_001], StoreFlags::REPLACE).unwrap();
    assert_eq!(db.fetch("large").len(), 100_001);
}

fn test_reorganize_keeps_data(db: &Ldbm) {
    for i in 0..10 {
        db.store(format!("r{i}"), "v1", StoreFlags::REPLACE).unwrap();
        db.store(format!("r{i}"), "v2", StoreFlags::REPLACE).unwrap();
    }
    db.delete("r0").unwrap();
    assert_eq!(db.reorganize(), Ok(()));
    assert_eq!(db.keys().count(), 9);
    assert_eq!(db.fetch("r9"), b"v2");
}

fn test_concrete_scenario(env: &Arc<LdbmEnv>, dir: &Path) {
    let h = env.open(dir.join("test.db"), OpenMode::WRCREAT, 0o600, 0).unwrap();
    assert_eq!(h.store("a", "1", StoreFlags::REPLACE), Ok(()));
    assert_eq!(h.fetch("a"), b"1");
    assert_eq!(h.delete("a"), Ok(()));
    assert!(h.fetch("a").is_empty());
    h.close();
}

fn test_reopen_keeps_data(env: &Arc<LdbmEnv>, dir: &Path) {
    let path = dir.join("reopen");
    {
        let db = env.open(&path, OpenMode::WRCREAT, 0o600, 0).unwrap();
        db.store("persist", "me", StoreFlags::REPLACE).unwrap();
        db.store("drop", "me", StoreFlags::REPLACE).unwrap();
        db.delete("drop").unwrap();
    }
    let db = env.open(&path, OpenMode::READER, 0o600, 0).unwrap();
    assert_eq!(db.fetch("persist"), b"me");
    assert!(db.fetch("drop").is_empty());
    assert!(db.store("new", "x", StoreFlags::REPLACE).is_err());
    assert_ne!(db.last_error(), 0);
}

fn test_writes_after_torn_log_survive(env: &Arc<LdbmEnv>, dir: &Path) {
    let path = dir.join("torn");
    env.open(&path, OpenMode::WRCREAT, 0o600, 0)
        .unwrap()
        .store("kept", "1", StoreFlags::REPLACE)
        .unwrap();

    // Half-written batch at the end of the log, as after a crash
    let mut log = OpenOptions::new()
        .append(true)
        .open(path.join("metadata").join("metadata.log"))
        .unwrap();
    log.write_all(&[200, 0, 0, 0, b'{']).unwrap();
    drop(log);

    env.open(&path, OpenMode::WRITER, 0o600, 0)
        .unwrap()
        .store("after", "2", StoreFlags::REPLACE | StoreFlags::SYNC)
        .unwrap();

    let db = env.open(&path, OpenMode::READER, 0o600, 0).unwrap();
    assert_eq!(db.fetch("kept"), b"1");
    assert_eq!(db.fetch("after"), b"2");
    assert_eq!(db.keys().count(), 2);
}

#[test]
fn test_berkeley_v1_backend() {
    run_backend_tests(BackendKind::BerkeleyV1);
}

#[test]
fn test_berkeley_v2_backend() {
    run_backend_tests(BackendKind::BerkeleyV2);
}

#[test]
fn test_gdbm_backend() {
    run_backend_tests(BackendKind::Gdbm);
}

#[test]
fn test_mdbm_backend() {
    run_backend_tests(BackendKind::Mdbm);
}

#[test]
fn test_ndbm_backend() {
    run_backend_tests(BackendKind::Ndbm);
}

#[test]
fn test_mdbm_retry_ceiling_zero_still_grows_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = LdbmConfig {
        max_fetch_retries: 0,
        ..LdbmConfig::default()
    }
    .with_backend(BackendKind::Mdbm);
    let env = Arc::new(LdbmEnv::new(config).unwrap());
    let db = open_store(&env, dir.path(), "retry");

    db.store("k", "value", StoreFlags::REPLACE).unwrap();
    assert_eq!(db.fetch("k"), b"value");
}

#[test]
fn test_berkeley_v2_codes_are_negated() {
    let dir = tempfile::tempdir().unwrap();
    let env = open_env(BackendKind::BerkeleyV2, dir.path());
    let db = open_store(&env, dir.path(), "codes");

    db.store("k", "v", StoreFlags::INSERT).unwrap();
    let failure = db.store("k", "w", StoreFlags::INSERT).unwrap_err();
    assert_eq!(failure.code, -DB_KEYEXIST);
    assert_eq!(db.last_error(), DB_KEYEXIST);

    let failure = db.delete("absent").unwrap_err();
    assert_eq!(failure.code, -DB_NOTFOUND);
    assert_eq!(db.last_error(), DB_NOTFOUND);
}

#[test]
fn test_mdbm_next_ignores_previous_key() {
    let dir = tempfile::tempdir().unwrap();
    let env = open_env(BackendKind::Mdbm, dir.path());
    let db = open_store(&env, dir.path(), "positionless");
    for key in ["a", "b", "c"] {
        db.store(key, "x", StoreFlags::REPLACE).unwrap();
    }

    let (first, mut cursor) = db.first_key();
    assert_eq!(first, b"a");
    // A bogus previous key does not reposition the walk
    assert_eq!(db.next_key(Datum::from("c"), &mut cursor), b"b");
}

#[test]
fn test_gdbm_next_follows_previous_key() {
    let dir = tempfile::tempdir().unwrap();
    let env = open_env(BackendKind::Gdbm, dir.path());
    let db = open_store(&env, dir.path(), "keyed");
    for key in ["a", "b", "c"] {
        db.store(key, "x", StoreFlags::REPLACE).unwrap();
    }

    let (_, mut cursor) = db.first_key();
    assert_eq!(db.next_key(Datum::from("b"), &mut cursor), b"c");
}

#[test]
fn test_delete_without_sync_policy() {
    let dir = tempfile::tempdir().unwrap();
    let config = LdbmConfig {
        sync_on_delete: false,
        ..LdbmConfig::default()
    }
    .with_backend(BackendKind::BerkeleyV1);
    let env = Arc::new(LdbmEnv::new(config).unwrap());
    let db = open_store(&env, dir.path(), "nosync");
    db.store("k", "v", StoreFlags::REPLACE).unwrap();
    assert_eq!(db.delete("k"), Ok(()));
    assert!(db.fetch("k").is_empty());
}
