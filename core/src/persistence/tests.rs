use std::fs;
use std::path::PathBuf;

use crate::test_support::{cleanup, temp_root};
use crate::{IdentityRecord, Registry, RegistryError};

use super::snapshot::temp_path_for;
use super::{load_registry, persist_registry, PersistenceError, RegistryStore};

fn test_paths(prefix: &str) -> (PathBuf, PathBuf) {
    let root = temp_root(prefix);
    let registry_path = root.join("face_registry.json");
    (root, registry_path)
}

fn record(user_id: &str, name: &str, values: [f32; 3]) -> IdentityRecord {
    IdentityRecord::new(user_id, name, values.to_vec()).expect("record must be valid")
}

fn sample_registry() -> Registry {
    Registry::from_records(
        3,
        [
            record("u1", "Alice", [0.125, -0.5, 0.75]),
            record("u2", "Bob", [0.1, 0.2, 0.3]),
        ],
    )
    .expect("registry must be valid")
}

#[test]
fn first_load_creates_empty_registry_file() {
    let (root, registry_path) = test_paths("first_load");

    let registry = load_registry(&registry_path, 3).expect("load must succeed");
    assert!(registry.is_empty());
    assert_eq!(registry.dimension(), 3);
    assert!(registry_path.exists(), "empty registry must be persisted");

    let reloaded = load_registry(&registry_path, 3).expect("reload must succeed");
    assert_eq!(reloaded, registry);

    cleanup(&root);
}

#[test]
fn persist_then_load_roundtrips_records() {
    let (root, registry_path) = test_paths("roundtrip");
    let registry = sample_registry();

    persist_registry(&registry_path, &registry).expect("persist must succeed");
    let loaded = load_registry(&registry_path, 3).expect("load must succeed");

    assert_eq!(loaded, registry);
    let ids: Vec<&str> = loaded.iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(ids, ["u1", "u2"]);
    assert!(!temp_path_for(&registry_path).exists());

    cleanup(&root);
}

#[test]
fn store_insert_persists_before_returning() {
    let (root, registry_path) = test_paths("store_insert");

    let mut store = RegistryStore::open(&registry_path, 3).expect("open must succeed");
    store
        .insert(record("u1", "Alice", [1.0, 2.0, 3.0]))
        .expect("insert must succeed");
    assert!(store.exists("u1"));
    assert!(store.exists("  u1 "));

    let reopened = RegistryStore::open(&registry_path, 3).expect("reopen must succeed");
    assert_eq!(reopened.registry(), store.registry());

    cleanup(&root);
}

#[test]
fn store_persist_rewrites_a_removed_file() {
    let (root, registry_path) = test_paths("store_persist");

    let mut store = RegistryStore::open(&registry_path, 3).expect("open must succeed");
    store
        .insert(record("u1", "Alice", [1.0, 2.0, 3.0]))
        .expect("insert must succeed");
    fs::remove_file(store.path()).expect("registry file should be removable");

    store.persist().expect("persist must succeed");
    let reloaded = load_registry(&registry_path, 3).expect("reload must succeed");
    assert_eq!(&reloaded, store.registry());

    cleanup(&root);
}

#[test]
fn duplicate_insert_does_not_write_the_file() {
    let (root, registry_path) = test_paths("duplicate");

    let mut store = RegistryStore::open(&registry_path, 3).expect("open must succeed");
    store
        .insert(record("u1", "Alice", [1.0, 2.0, 3.0]))
        .expect("insert must succeed");
    let bytes_before = fs::read(&registry_path).expect("registry file must exist");
    let registry_before = store.registry().clone();

    let error = store
        .insert(record("u1", "Impostor", [3.0, 2.0, 1.0]))
        .expect_err("duplicate must fail");

    assert!(error.is_duplicate());
    assert!(matches!(
        error,
        PersistenceError::Registry(RegistryError::DuplicateIdentifier(ref id)) if id == "u1"
    ));
    assert_eq!(store.registry(), &registry_before);
    assert_eq!(
        fs::read(&registry_path).expect("registry file must exist"),
        bytes_before
    );
    assert!(!temp_path_for(&registry_path).exists());

    cleanup(&root);
}

#[test]
fn failed_persist_rolls_back_insert() {
    let (root, registry_path) = test_paths("rollback");

    let mut store = RegistryStore::open(&registry_path, 3).expect("open must succeed");
    store
        .insert(record("u1", "Alice", [1.0, 2.0, 3.0]))
        .expect("insert must succeed");
    let bytes_before = fs::read(&registry_path).expect("registry file must exist");

    // A directory squatting on the temp path makes the next write fail.
    let temp_path = temp_path_for(&registry_path);
    fs::create_dir_all(&temp_path).expect("temp path directory should be creatable");

    let error = store
        .insert(record("u2", "Bob", [3.0, 2.0, 1.0]))
        .expect_err("persist must fail");
    assert!(matches!(error, PersistenceError::Io(_)));
    assert!(!store.exists("u2"));
    assert_eq!(store.registry().len(), 1);
    assert_eq!(
        fs::read(&registry_path).expect("registry file must exist"),
        bytes_before
    );

    fs::remove_dir_all(&temp_path).expect("temp path directory should be removable");
    store
        .insert(record("u2", "Bob", [3.0, 2.0, 1.0]))
        .expect("retry must succeed once storage recovers");
    assert_eq!(store.registry().len(), 2);

    cleanup(&root);
}

#[test]
fn load_rejects_invalid_json_without_touching_it() {
    let (root, registry_path) = test_paths("invalid_json");
    fs::create_dir_all(&root).expect("temp directory should be creatable");
    fs::write(&registry_path, b"{\"records\": [").expect("file should be writable");

    let error = load_registry(&registry_path, 3).expect_err("must fail");
    assert!(error.is_corrupt(), "unexpected error: {error}");
    assert_eq!(
        fs::read(&registry_path).expect("file must still exist"),
        b"{\"records\": ["
    );

    cleanup(&root);
}

#[test]
fn load_rejects_dimension_mismatch() {
    let (root, registry_path) = test_paths("dimension");
    persist_registry(&registry_path, &sample_registry()).expect("persist must succeed");

    let error = load_registry(&registry_path, 128).expect_err("must fail");
    assert!(error.is_corrupt(), "unexpected error: {error}");

    cleanup(&root);
}

#[test]
fn load_rejects_missing_fields() {
    let (root, registry_path) = test_paths("missing_fields");
    fs::create_dir_all(&root).expect("temp directory should be creatable");
    fs::write(
        &registry_path,
        r#"{"version":1,"dimension":3,"checksum":0,"records":[{"user_id":"u1","feature_vector":[1.0,2.0,3.0]}]}"#,
    )
    .expect("file should be writable");

    let error = load_registry(&registry_path, 3).expect_err("must fail");
    assert!(error.is_corrupt(), "unexpected error: {error}");

    cleanup(&root);
}

#[test]
fn load_rejects_tampered_records() {
    let (root, registry_path) = test_paths("tampered");
    persist_registry(&registry_path, &sample_registry()).expect("persist must succeed");

    let raw = fs::read_to_string(&registry_path).expect("file must be readable");
    fs::write(&registry_path, raw.replace("Alice", "Alicia")).expect("file should be writable");

    let error = load_registry(&registry_path, 3).expect_err("must fail");
    assert!(
        error.to_string().contains("checksum mismatch"),
        "unexpected error: {error}"
    );

    cleanup(&root);
}

#[test]
fn load_rejects_unsupported_version() {
    let (root, registry_path) = test_paths("version");
    fs::create_dir_all(&root).expect("temp directory should be creatable");
    fs::write(
        &registry_path,
        r#"{"version":7,"dimension":3,"checksum":0,"records":[]}"#,
    )
    .expect("file should be writable");

    let error = load_registry(&registry_path, 3).expect_err("must fail");
    assert!(
        error.to_string().contains("unsupported registry version 7"),
        "unexpected error: {error}"
    );

    cleanup(&root);
}

#[test]
fn load_imports_legacy_parallel_lists() {
    let (root, registry_path) = test_paths("legacy");
    fs::create_dir_all(&root).expect("temp directory should be creatable");
    fs::write(
        &registry_path,
        r#"{"encodings":[[1.0,2.0,3.0],[3.0,2.0,1.0]],"usernames":["Alice","Bob"],"user_ids":["u1","u2"]}"#,
    )
    .expect("file should be writable");

    let mut store = RegistryStore::open(&registry_path, 3).expect("legacy load must succeed");
    assert_eq!(store.registry().len(), 2);
    assert_eq!(
        store.registry().get("u2").map(|r| r.display_name.as_str()),
        Some("Bob")
    );

    store
        .insert(record("u3", "Carol", [0.0, 0.0, 1.0]))
        .expect("insert must succeed");
    let raw = fs::read_to_string(&registry_path).expect("file must be readable");
    assert!(raw.contains("\"records\""));
    assert!(!raw.contains("\"encodings\""));

    cleanup(&root);
}

#[test]
fn legacy_import_trims_identifiers() {
    let (root, registry_path) = test_paths("legacy_trim");
    fs::create_dir_all(&root).expect("temp directory should be creatable");
    fs::write(
        &registry_path,
        r#"{"encodings":[[1.0,2.0,3.0]],"usernames":[" Alice "],"user_ids":[" u1 "]}"#,
    )
    .expect("file should be writable");

    let mut store = RegistryStore::open(&registry_path, 3).expect("legacy load must succeed");
    assert!(store.exists("u1"));
    assert!(store.exists(" u1 "));
    let error = store
        .insert(record("u1", "Alice", [0.0, 0.0, 1.0]))
        .expect_err("trimmed legacy id must collide");
    assert!(error.is_duplicate());

    cleanup(&root);
}

#[test]
fn load_rejects_legacy_lists_of_unequal_length() {
    let (root, registry_path) = test_paths("legacy_mismatch");
    fs::create_dir_all(&root).expect("temp directory should be creatable");
    fs::write(
        &registry_path,
        r#"{"encodings":[[1.0,2.0,3.0]],"usernames":["Alice","Bob"],"user_ids":["u1","u2"]}"#,
    )
    .expect("file should be writable");

    let error = load_registry(&registry_path, 3).expect_err("must fail");
    assert!(error.is_corrupt(), "unexpected error: {error}");
    assert!(error.to_string().contains("differ in length"));

    cleanup(&root);
}

#[test]
fn load_rejects_unknown_layout() {
    let (root, registry_path) = test_paths("unknown_layout");
    fs::create_dir_all(&root).expect("temp directory should be creatable");
    fs::write(&registry_path, r#"{"faces":[]}"#).expect("file should be writable");

    let error = load_registry(&registry_path, 3).expect_err("must fail");
    assert!(error.is_corrupt(), "unexpected error: {error}");

    cleanup(&root);
}

#[test]
fn temp_path_never_aliases_the_registry_file() {
    let (root, _) = test_paths("temp_alias");
    for name in ["registry.tmp", "registry.json", "registry"] {
        let path = root.join(name);
        let temp_path = temp_path_for(&path);
        assert_ne!(temp_path, path);
        assert_eq!(temp_path.parent(), path.parent());
    }
    assert_ne!(
        temp_path_for(&root.join("reg.json")),
        temp_path_for(&root.join("reg.bin"))
    );
}

#[test]
fn tmp_named_registry_is_replaced_not_rewritten() {
    let root = temp_root("tmp_named");
    let registry_path = root.join("registry.tmp");

    let mut store = RegistryStore::open(&registry_path, 3).expect("open must succeed");
    store
        .insert(record("u1", "Alice", [1.0, 2.0, 3.0]))
        .expect("insert must succeed");
    let witness = root.join("witness");
    fs::hard_link(&registry_path, &witness).expect("hard link should be creatable");
    let witness_before = fs::read(&witness).expect("witness must be readable");

    store
        .insert(record("u2", "Bob", [3.0, 2.0, 1.0]))
        .expect("insert must succeed");

    assert_eq!(
        fs::read(&witness).expect("witness must be readable"),
        witness_before,
        "the previous file must be replaced by rename, not rewritten"
    );
    let reloaded = load_registry(&registry_path, 3).expect("reload must succeed");
    assert_eq!(reloaded.len(), 2);

    cleanup(&root);
}

#[test]
fn failed_directory_sync_keeps_the_committed_record() {
    let (root, registry_path) = test_paths("sync_failure");

    let mut store = RegistryStore::open(&registry_path, 3).expect("open must succeed");
    let error = store
        .insert_with_sync(record("u1", "Alice", [1.0, 2.0, 3.0]), |_| {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "sync refused"))
        })
        .expect_err("sync failure must be reported");

    assert!(error.is_committed());
    assert!(matches!(error, PersistenceError::NotDurable(_)));
    assert!(store.exists("u1"));
    let reloaded = load_registry(&registry_path, 3).expect("reload must succeed");
    assert_eq!(&reloaded, store.registry());

    let duplicate = store
        .insert(record("u1", "Alice", [1.0, 2.0, 3.0]))
        .expect_err("committed id must stay taken");
    assert!(duplicate.is_duplicate());

    store
        .insert(record("u2", "Bob", [3.0, 2.0, 1.0]))
        .expect("next insert must succeed");
    let reloaded = load_registry(&registry_path, 3).expect("reload must succeed");
    assert!(reloaded.exists("u1"), "later writes must not drop the record");
    assert_eq!(reloaded.len(), 2);

    cleanup(&root);
}

#[test]
fn failed_commit_rolls_back_before_sync_runs() {
    let (root, registry_path) = test_paths("commit_failure");

    let mut store = RegistryStore::open(&registry_path, 3).expect("open must succeed");
    fs::create_dir_all(temp_path_for(&registry_path))
        .expect("temp path directory should be creatable");

    let mut synced = false;
    let error = store
        .insert_with_sync(record("u1", "Alice", [1.0, 2.0, 3.0]), |_| {
            synced = true;
            Ok(())
        })
        .expect_err("commit must fail");

    assert!(!error.is_committed());
    assert!(!synced);
    assert!(!store.exists("u1"));
    let reloaded = load_registry(&registry_path, 3).expect("reload must succeed");
    assert!(reloaded.is_empty());

    cleanup(&root);
}
