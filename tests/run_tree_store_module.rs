use flowconf::config::{ErrorKind, FlowConfigKey, FlowModule, ResolvedConfig};
use flowconf::run_tree::{FsRunConfigStore, RunConfigStore, RunStoreError};
use flowconf::shared::ids::{FlowName, RunId};
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

fn run_id(raw: &str) -> RunId {
    RunId::parse(raw).expect("run id")
}

fn record(raw: &str) -> ResolvedConfig {
    ResolvedConfig::from_document(serde_yaml::from_str(raw).expect("yaml")).expect("record")
}

fn flow_key(module: &str, flow: &str) -> FlowConfigKey {
    let module = FlowModule::new(module, "/srv").expect("module");
    FlowConfigKey::derive(&module, &FlowName::parse(flow).expect("flow"))
}

#[test]
fn run_store_module_persists_and_rereads_records() {
    let temp = tempdir().expect("tempdir");
    let store = FsRunConfigStore::new(Some(temp.path().to_path_buf()));
    let config = record(
        r#"
wigos_id: "0-22000-0-56001"
global:
  region: AU
overrides:
  buoys.WIS2-buoys-APOLLO_BAY:
    retries: 5
"#,
    );

    store.persist(&run_id("parent-1"), &config).expect("persist");
    assert_eq!(
        store.record_location(&run_id("parent-1")),
        Some(temp.path().join("parent-1.yaml"))
    );

    let first = store
        .load_ancestor(Some(&run_id("parent-1")))
        .expect("first read");
    let second = store
        .load_ancestor(Some(&run_id("parent-1")))
        .expect("second read");
    assert_eq!(first, config);
    assert_eq!(first, second);
}

#[test]
fn run_store_module_root_lookup_never_touches_the_filesystem() {
    let temp = tempdir().expect("tempdir");
    let missing_root = temp.path().join("never-created");
    let store = FsRunConfigStore::new(Some(missing_root.clone()));

    let config = store.load_ancestor(None).expect("root lookup");
    assert!(config.is_empty());
    assert!(!missing_root.exists());

    let unset = FsRunConfigStore::new(None);
    assert!(unset.load_ancestor(None).expect("root lookup").is_empty());
}

#[test]
fn run_store_module_rejects_ambiguous_parent_records() {
    let temp = tempdir().expect("tempdir");
    let store = FsRunConfigStore::new(Some(temp.path().to_path_buf()));
    store
        .persist(&run_id("parent-1"), &record("a: 1\n"))
        .expect("persist");
    fs::write(temp.path().join("parent-1.stale"), "a: 2\n").expect("write stale record");

    let err = store
        .load_ancestor(Some(&run_id("parent-1")))
        .expect_err("ambiguous lookup");
    assert_eq!(err.kind(), ErrorKind::AncestorConfigMissing);
    match err {
        RunStoreError::AncestorConfigMissing { matches, .. } => assert_eq!(matches, 2),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn run_store_module_reports_missing_parent_records() {
    let temp = tempdir().expect("tempdir");
    let store = FsRunConfigStore::new(Some(temp.path().to_path_buf()));
    store
        .persist(&run_id("parent-10"), &record("a: 1\n"))
        .expect("persist");

    let err = store
        .load_ancestor(Some(&run_id("parent-1")))
        .expect_err("prefix must include the dot");
    match err {
        RunStoreError::AncestorConfigMissing { matches, .. } => assert_eq!(matches, 0),
        other => panic!("unexpected error: {other:?}"),
    }

    let unset = FsRunConfigStore::new(None);
    let err = unset
        .load_ancestor(Some(&run_id("parent-1")))
        .expect_err("no temp root");
    assert_eq!(err.kind(), ErrorKind::AncestorConfigMissing);
}

#[test]
fn run_store_module_persist_requires_a_reachable_temp_root() {
    let err = FsRunConfigStore::new(None)
        .persist(&run_id("run-1"), &record("a: 1\n"))
        .expect_err("unknown temp root");
    assert_eq!(err.kind(), ErrorKind::Persistence);

    let temp = tempdir().expect("tempdir");
    let gone = temp.path().join("removed");
    let err = FsRunConfigStore::new(Some(gone))
        .persist(&run_id("run-1"), &record("a: 1\n"))
        .expect_err("unreachable temp root");
    assert!(matches!(err, RunStoreError::Write { .. }));
}

#[test]
fn run_store_module_records_are_never_rewritten() {
    let temp = tempdir().expect("tempdir");
    let store = FsRunConfigStore::new(Some(temp.path().to_path_buf()));
    store
        .persist(&run_id("run-1"), &record("a: 1\n"))
        .expect("persist");
    store
        .persist(&run_id("run-1"), &record("a: 1\n"))
        .expect("identical persist is a no-op");

    let err = store
        .persist(&run_id("run-1"), &record("a: 2\n"))
        .expect_err("conflicting persist");
    assert!(matches!(err, RunStoreError::RecordConflict { .. }));
    assert_eq!(
        store
            .load_ancestor(Some(&run_id("run-1")))
            .expect("read")
            .get("a"),
        Some(&serde_yaml::Value::from(1))
    );
}

#[test]
fn run_store_module_rejects_malformed_records() {
    let temp = tempdir().expect("tempdir");
    fs::write(temp.path().join("parent-1.yaml"), "global: 3\n").expect("write record");
    let store = FsRunConfigStore::new(Some(temp.path().to_path_buf()));

    let err = store
        .load_ancestor(Some(&run_id("parent-1")))
        .expect_err("scalar global");
    assert_eq!(err.kind(), ErrorKind::ConfigFormat);
}

#[test]
fn run_store_module_detects_flow_key_collisions() {
    let temp = tempdir().expect("tempdir");
    let store = FsRunConfigStore::new(Some(temp.path().to_path_buf()));
    let key = flow_key("pkg_a.buoys", "ingest");

    store.claim_flow_key(&key, "pkg_a.buoys").expect("first claim");
    store
        .claim_flow_key(&key, "pkg_a.buoys")
        .expect("same module claims again");

    let err = store
        .claim_flow_key(&flow_key("pkg_b.buoys", "ingest"), "pkg_b.buoys")
        .expect_err("collision");
    assert_eq!(err.kind(), ErrorKind::Configuration);
    match err {
        RunStoreError::FlowKeyCollision {
            flow_key,
            claimed_by,
            requested_by,
        } => {
            assert_eq!(flow_key, "buoys.ingest");
            assert_eq!(claimed_by, "pkg_a.buoys");
            assert_eq!(requested_by, "pkg_b.buoys");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn run_store_module_concurrent_claims_by_one_module_all_succeed() {
    for _ in 0..50 {
        let temp = tempdir().expect("tempdir");
        let barrier = Arc::new(Barrier::new(8));
        let handles = (0..8)
            .map(|_| {
                let temp_root = temp.path().to_path_buf();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let store = FsRunConfigStore::new(Some(temp_root));
                    let key = flow_key("flows.buoys", "WIS2-buoys");
                    barrier.wait();
                    store.claim_flow_key(&key, "flows.buoys")
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().expect("join").expect("sibling claim");
        }

        let claims = fs::read_dir(temp.path().join(".flow-keys"))
            .expect("claims dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect::<Vec<_>>();
        assert_eq!(claims.len(), 1);
    }
}
