use std::fs;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use modulair_domain::Scope;
use tempfile::TempDir;

use super::*;
use crate::core::testing::{env_error, sample_record};

fn handle(temp: &TempDir) -> RegistryHandle {
    RegistryHandle::open(
        Scope::Personal,
        temp.path().join(METADATA_FILENAME),
        Duration::from_secs(5),
    )
}

#[test]
fn missing_document_reads_as_empty() {
    let temp = TempDir::new().expect("tempdir");
    let registry = handle(&temp);
    assert!(registry.list().expect("list").is_empty());
    assert!(registry.find("a").expect("find").is_none());
    assert!(!registry.path().exists());
}

#[test]
fn insert_then_get_roundtrips_through_disk() {
    let temp = TempDir::new().expect("tempdir");
    let registry = handle(&temp);
    let record = sample_record("a", temp.path());
    registry.insert(record.clone()).expect("insert");

    let reopened = handle(&temp);
    assert_eq!(reopened.get("a").expect("get"), record);
    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(registry.path()).expect("read")).expect("json");
    assert_eq!(raw["environments"][0]["name"], "a");
}

#[test]
fn insert_existing_name_conflicts_and_leaves_document() {
    let temp = TempDir::new().expect("tempdir");
    let registry = handle(&temp);
    registry.insert(sample_record("a", temp.path())).expect("insert");
    let before = fs::read_to_string(registry.path()).expect("read");

    let err = registry
        .insert(sample_record("a", temp.path()))
        .expect_err("duplicate");
    assert!(matches!(env_error(&err), EnvError::NameConflict { path: None, .. }));
    assert_eq!(fs::read_to_string(registry.path()).expect("read"), before);
}

#[test]
fn remove_missing_name_is_not_found() {
    let temp = TempDir::new().expect("tempdir");
    let registry = handle(&temp);
    registry.insert(sample_record("a", temp.path())).expect("insert");

    let err = registry.remove("b").expect_err("missing");
    assert!(matches!(env_error(&err), EnvError::NotFound { .. }));

    let removed = registry.remove("a").expect("remove");
    assert_eq!(removed.name, "a");
    assert!(registry.list().expect("list").is_empty());
}

#[test]
fn malformed_documents_are_reported_and_not_rewritten() {
    let temp = TempDir::new().expect("tempdir");
    let registry = handle(&temp);
    for contents in ["", "   \n", "{not json", "[]"] {
        fs::write(registry.path(), contents).expect("write");
        let err = registry.list().expect_err("malformed");
        assert!(
            matches!(env_error(&err), EnvError::MalformedRegistry { .. }),
            "{contents:?}: {err}"
        );
        let err = registry
            .insert(sample_record("a", temp.path()))
            .expect_err("malformed insert");
        assert!(matches!(env_error(&err), EnvError::MalformedRegistry { .. }));
        assert_eq!(fs::read_to_string(registry.path()).expect("read"), contents);
    }
}

#[test]
fn duplicate_names_on_disk_are_malformed() {
    let temp = TempDir::new().expect("tempdir");
    let registry = handle(&temp);
    let record = serde_json::to_value(sample_record("a", temp.path())).expect("value");
    let doc = serde_json::json!({ "environments": [record.clone(), record] });
    fs::write(registry.path(), doc.to_string()).expect("write");

    let err = registry.get("a").expect_err("duplicate");
    assert!(matches!(env_error(&err), EnvError::MalformedRegistry { .. }));
}

#[test]
fn unknown_fields_survive_a_rewrite() {
    let temp = TempDir::new().expect("tempdir");
    let registry = handle(&temp);
    let mut record = serde_json::to_value(sample_record("a", temp.path())).expect("value");
    record["site_note"] = serde_json::json!("keep me");
    let doc = serde_json::json!({ "environments": [record], "schema": 2 });
    fs::write(registry.path(), doc.to_string()).expect("write");

    registry.insert(sample_record("b", temp.path())).expect("insert");

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(registry.path()).expect("read")).expect("json");
    assert_eq!(raw["schema"], 2);
    assert_eq!(raw["environments"][0]["site_note"], "keep me");
    assert_eq!(raw["environments"][1]["name"], "b");
}

#[test]
fn concurrent_inserts_of_distinct_names_both_land() {
    let temp = TempDir::new().expect("tempdir");
    let registry = handle(&temp);
    let names: Vec<String> = (0..8).map(|idx| format!("env{idx}")).collect();
    let barrier = Barrier::new(names.len());

    thread::scope(|scope| {
        for name in &names {
            let registry = registry.clone();
            let barrier = &barrier;
            let root = temp.path();
            scope.spawn(move || {
                barrier.wait();
                registry.insert(sample_record(name, root)).expect("insert");
            });
        }
    });

    let mut listed: Vec<String> = registry
        .list()
        .expect("list")
        .into_iter()
        .map(|record| record.name)
        .collect();
    listed.sort();
    assert_eq!(listed, names);
}

#[test]
fn concurrent_inserts_of_same_name_admit_exactly_one() {
    let temp = TempDir::new().expect("tempdir");
    let registry = handle(&temp);
    let barrier = Barrier::new(4);

    let results: Vec<Result<()>> = thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let barrier = &barrier;
                let root = temp.path();
                scope.spawn(move || {
                    barrier.wait();
                    registry.insert(sample_record("shared", root))
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("join"))
            .collect()
    });

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    for err in results.iter().filter_map(|result| result.as_ref().err()) {
        assert!(matches!(env_error(err), EnvError::NameConflict { .. }));
    }
    assert_eq!(registry.list().expect("list").len(), 1);
}

#[test]
fn held_lock_times_out_writers_but_not_readers() {
    let temp = TempDir::new().expect("tempdir");
    let registry = RegistryHandle::open(
        Scope::Personal,
        temp.path().join(METADATA_FILENAME),
        Duration::from_millis(150),
    );
    registry.insert(sample_record("a", temp.path())).expect("insert");

    let held = RegistryLock::acquire(
        &registry.lock_path(),
        registry.path(),
        registry.scope(),
        Duration::from_secs(1),
    )
    .expect("lock");

    let err = registry
        .insert(sample_record("b", temp.path()))
        .expect_err("locked");
    assert!(matches!(env_error(&err), EnvError::RegistryLocked { .. }));
    assert_eq!(registry.list().expect("list").len(), 1);

    drop(held);
    registry.insert(sample_record("b", temp.path())).expect("insert after release");
}

#[cfg(unix)]
#[test]
fn new_group_documents_are_group_writable() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().expect("tempdir");
    let registry = RegistryHandle::open(
        Scope::Group("lab".into()),
        temp.path().join(METADATA_FILENAME),
        Duration::from_secs(5),
    );
    registry.insert(sample_record("a", temp.path())).expect("insert");
    let mode = fs::metadata(registry.path()).expect("meta").permissions().mode();
    assert_eq!(mode & 0o777, 0o664);
    let lock_mode = fs::metadata(registry.lock_path()).expect("meta").permissions().mode();
    assert_eq!(lock_mode & 0o777, 0o664);
}

#[cfg(unix)]
#[test]
fn read_only_lock_file_still_serializes_writers() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().expect("tempdir");
    let registry = handle(&temp);
    fs::write(registry.lock_path(), b"").expect("lock file");
    fs::set_permissions(registry.lock_path(), fs::Permissions::from_mode(0o444)).expect("chmod");

    registry.insert(sample_record("a", temp.path())).expect("insert");
    registry.insert(sample_record("b", temp.path())).expect("insert");
    assert_eq!(registry.list().expect("list").len(), 2);
    let mode = fs::metadata(registry.lock_path()).expect("meta").permissions().mode();
    assert_eq!(mode & 0o777, 0o444);
}
