use super::{context_for, project};
use serde_json::Value;
use twm_cache::{
    CacheStore, CacheStoreOptions, ClearScope, ReadReason, WriteStrategy, CACHE_SCHEMA_VERSION,
};

fn tokens(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).expect("index should be valid json")
}

#[test]
fn write_then_read_is_a_hit_with_the_same_tokens() {
    let tmp = tempfile::tempdir().unwrap();
    let root = project(tmp.path(), "app");
    let store = CacheStore::with_context(
        CacheStoreOptions::file(tmp.path().join("cache").join("index.json")),
        context_for(&root, "3.4.18"),
    );

    let before = store.read_with_meta();
    assert_eq!(before.meta.reason, ReadReason::NotFound);

    store
        .write(tokens(&["bg-red-500/50", "bg-red-500", "font-bold"]))
        .unwrap();
    let after = store.read_with_meta();
    assert!(after.meta.hit);
    assert_eq!(after.meta.reason, ReadReason::Hit);
    assert_eq!(after.meta.fingerprint.as_ref(), store.fingerprint());
    assert_eq!(after.meta.schema_version, Some(CACHE_SCHEMA_VERSION));
    assert_eq!(
        after.data.into_iter().collect::<Vec<_>>(),
        tokens(&["bg-red-500/50", "bg-red-500", "font-bold"])
    );
}

#[test]
fn projects_sharing_one_file_never_see_each_other() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("index.json");
    let a = CacheStore::with_context(
        CacheStoreOptions::file(&path),
        context_for(&project(tmp.path(), "a"), "3.4.18"),
    );
    let b = CacheStore::with_context(
        CacheStoreOptions::file(&path),
        context_for(&project(tmp.path(), "b"), "3.4.18"),
    );

    a.write(["text-a"]).unwrap();
    let b_read = b.read_with_meta();
    assert_eq!(b_read.meta.reason, ReadReason::Miss);
    assert!(b_read.data.is_empty());

    b.write(["text-b"]).unwrap();
    assert_eq!(a.read().into_iter().collect::<Vec<_>>(), tokens(&["text-a"]));
    assert_eq!(b.read().into_iter().collect::<Vec<_>>(), tokens(&["text-b"]));
    assert_eq!(read_json(&path)["contexts"].as_object().unwrap().len(), 2);
}

#[test]
fn changed_upstream_version_is_a_context_mismatch_with_reasons() {
    let tmp = tempfile::tempdir().unwrap();
    let root = project(tmp.path(), "app");
    let path = tmp.path().join("index.json");

    let old = CacheStore::with_context(CacheStoreOptions::file(&path), context_for(&root, "3.4.18"));
    old.write(["px-2"]).unwrap();

    let new = old.scoped(context_for(&root, "3.4.19"));
    let read = new.read_with_meta();
    assert!(!read.meta.hit);
    assert_eq!(read.meta.reason, ReadReason::ContextMismatch);
    assert_eq!(read.meta.details, vec!["tailwind-package version changed"]);
    assert!(read.data.is_empty());
}

#[test]
fn clear_current_removes_one_entry_and_clear_all_removes_the_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("index.json");
    let a = CacheStore::with_context(
        CacheStoreOptions::file(&path),
        context_for(&project(tmp.path(), "a"), "3.4.18"),
    );
    let b = a.scoped(context_for(&project(tmp.path(), "b"), "3.4.18"));
    a.write(["m-1", "m-2"]).unwrap();
    b.write(["p-1"]).unwrap();

    let report = a.clear(ClearScope::Current).unwrap();
    assert_eq!(report.scope, ClearScope::Current);
    assert_eq!(report.contexts_removed, 1);
    assert_eq!(report.entries_removed, 2);
    assert_eq!(report.files_removed, 0);
    assert_eq!(a.read_with_meta().meta.reason, ReadReason::Miss);
    assert!(b.read_with_meta().meta.hit);

    let report = b.clear(ClearScope::All).unwrap();
    assert_eq!(report.scope, ClearScope::All);
    assert_eq!(report.contexts_removed, 1);
    assert_eq!(report.entries_removed, 1);
    assert_eq!(report.files_removed, 1);
    assert!(!path.exists());

    let again = b.clear(ClearScope::All).unwrap();
    assert_eq!(again.files_removed, 0);
}

#[test]
fn clearing_the_last_entry_deletes_the_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("index.json");
    let store = CacheStore::with_context(
        CacheStoreOptions::file(&path),
        context_for(&project(tmp.path(), "app"), "3.4.18"),
    );
    store.write(["gap-4"]).unwrap();

    let report = store.clear(ClearScope::Current).unwrap();
    assert_eq!(report.files_removed, 1);
    assert!(!path.exists());
}

#[test]
fn legacy_array_is_a_miss_and_the_next_write_upgrades_it() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("index.json");
    std::fs::write(&path, r#"["bg-red-500", "font-bold"]"#).unwrap();
    let store = CacheStore::with_context(
        CacheStoreOptions::file(&path),
        context_for(&project(tmp.path(), "app"), "3.4.18"),
    );

    let read = store.read_with_meta();
    assert_eq!(read.meta.reason, ReadReason::LegacySchema);
    assert!(read.data.is_empty());
    assert!(path.exists(), "legacy payloads are replaced by writes, not deleted on read");
    assert!(store.read_index_snapshot().is_none());

    store.write(["bg-red-500"]).unwrap();
    let json = read_json(&path);
    assert_eq!(json["schemaVersion"], CACHE_SCHEMA_VERSION);
    assert!(store.read_with_meta().meta.hit);
}

#[test]
fn corrupt_payload_is_a_read_error_and_is_removed() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("index.json");
    std::fs::write(&path, b"{\"schemaVersion\": 2, \"contexts\": ").unwrap();
    let store = CacheStore::new(CacheStoreOptions::file(&path));

    let read = store.read_with_meta();
    assert_eq!(read.meta.reason, ReadReason::ReadError);
    assert!(!read.meta.hit);
    assert_eq!(read.meta.details.len(), 1);
    assert!(!path.exists(), "corrupt index should be discarded");

    assert_eq!(store.read_with_meta().meta.reason, ReadReason::NotFound);
}

#[test]
fn newer_schema_is_a_miss_and_left_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("index.json");
    std::fs::write(&path, r#"{"schemaVersion": 99, "shards": []}"#).unwrap();
    let store = CacheStore::new(CacheStoreOptions::file(&path));

    let read = store.read_with_meta();
    assert_eq!(read.meta.reason, ReadReason::Miss);
    assert_eq!(read.meta.schema_version, Some(99));
    assert!(path.exists());
}

#[test]
fn overwrite_strategy_replaces_unrelated_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("index.json");
    let merge = CacheStore::with_context(
        CacheStoreOptions::file(&path),
        context_for(&project(tmp.path(), "a"), "3.4.18"),
    );
    merge.write(["w-1"]).unwrap();
    merge.unscoped().write(["w-2"]).unwrap();

    let overwrite = CacheStore::with_context(
        CacheStoreOptions::file(&path).with_strategy(WriteStrategy::Overwrite),
        context_for(&project(tmp.path(), "b"), "3.4.18"),
    );
    overwrite.write(["h-1"]).unwrap();

    let snapshot = overwrite.read_index_snapshot().unwrap();
    assert_eq!(snapshot.contexts.len(), 1);
    assert!(snapshot.unscoped.is_none());
    assert_eq!(merge.read_with_meta().meta.reason, ReadReason::Miss);
    assert!(overwrite.read_with_meta().meta.hit);
}

#[test]
fn memory_driver_shares_state_between_clones_without_touching_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let store = CacheStore::with_context(
        CacheStoreOptions::memory(),
        context_for(&project(tmp.path(), "app"), "3.4.18"),
    );
    assert!(store.path().is_none());

    let clone = store.clone();
    store.write(["flex-1", "flex-1", "grow-0"]).unwrap();
    let read = clone.read_with_meta();
    assert!(read.meta.hit);
    assert_eq!(read.data.len(), 2);

    let report = clone.clear(ClearScope::All).unwrap();
    assert_eq!(report.contexts_removed, 1);
    assert_eq!(report.entries_removed, 2);
    assert_eq!(report.files_removed, 0);
    assert_eq!(store.read_with_meta().meta.reason, ReadReason::NotFound);

    let separate = CacheStore::new(CacheStoreOptions::memory());
    store.write(["flex-1"]).unwrap();
    assert_eq!(separate.read_with_meta().meta.reason, ReadReason::NotFound);
}

#[test]
fn snapshot_is_independent_of_the_store() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("index.json");
    let store = CacheStore::with_context(
        CacheStoreOptions::file(&path),
        context_for(&project(tmp.path(), "app"), "3.4.18"),
    );
    assert!(store.read_index_snapshot().is_none());
    store.write(["ring-2"]).unwrap();

    let mut snapshot = store.read_index_snapshot().unwrap();
    snapshot.contexts.clear();
    snapshot.unscoped = None;

    assert!(store.read_with_meta().meta.hit);
    assert_eq!(store.read_index_snapshot().unwrap().contexts.len(), 1);

    let memory = CacheStore::new(CacheStoreOptions::memory());
    memory.write(["ring-2"]).unwrap();
    let mut snapshot = memory.read_index_snapshot().unwrap();
    snapshot.unscoped = None;
    assert!(memory.read_with_meta().meta.hit);
}
