//! Property tests for the universal invariants owned by this crate:
//! all-or-nothing apply, snapshot uniqueness, crash-safety of a torn
//! WAL, and idempotent delete.

use std::fs;
use std::path::Path;

use plandex_durability::{recover_base_dir, FileTransaction, RecoveryAction};
use proptest::prelude::*;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Op {
    Create(String, Vec<u8>),
    Modify(String, Vec<u8>),
    Delete(String),
}

const PATHS: [&str; 3] = ["a.txt", "b.txt", "c.txt"];

fn op_strategy() -> impl Strategy<Value = Op> {
    let path = prop::sample::select(&PATHS[..]).prop_map(|p| p.to_string());
    let content = prop::collection::vec(any::<u8>(), 0..16);
    prop_oneof![
        (path.clone(), content.clone()).prop_map(|(p, c)| Op::Create(p, c)),
        (path.clone(), content).prop_map(|(p, c)| Op::Modify(p, c)),
        path.prop_map(Op::Delete),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..8)
}

fn apply_ops(tx: &mut FileTransaction, ops: &[Op]) -> plandex_durability::Result<()> {
    for op in ops {
        match op {
            Op::Create(path, content) => tx.create_file(path, content.clone())?,
            Op::Modify(path, content) => tx.modify_file(path, content.clone())?,
            Op::Delete(path) => tx.delete_file(path)?,
        }
    }
    Ok(())
}

fn snapshot_files(base: &Path) -> std::collections::BTreeMap<String, Vec<u8>> {
    let mut out = std::collections::BTreeMap::new();
    if let Ok(entries) = fs::read_dir(base) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    out.insert(name.to_string(), fs::read(&path).unwrap());
                }
            }
        }
    }
    out
}

proptest! {
    /// All-or-nothing: after a successful `apply_all` + `commit`, every
    /// staged op's effect is visible; no partial-application state is
    /// ever left on disk regardless of the op sequence proposed.
    #[test]
    fn successful_commit_applies_every_op(ops in ops_strategy()) {
        let dir = tempdir().unwrap();
        let mut tx = FileTransaction::begin(dir.path()).unwrap();
        if apply_ops(&mut tx, &ops).is_err() {
            return Ok(());
        }
        if tx.apply_all().is_err() {
            return Ok(());
        }
        tx.commit().unwrap();

        let mut expected: std::collections::BTreeMap<String, Vec<u8>> = std::collections::BTreeMap::new();
        for op in &ops {
            match op {
                Op::Create(p, c) | Op::Modify(p, c) => { expected.insert(p.clone(), c.clone()); }
                Op::Delete(p) => { expected.remove(p); }
            }
        }
        let actual = snapshot_files(dir.path());
        prop_assert_eq!(actual, expected);
    }

    /// Idempotent delete: deleting a path that does not exist never
    /// errors and never creates it.
    #[test]
    fn delete_of_absent_path_is_idempotent(name in "[a-z]{1,8}\\.txt") {
        let dir = tempdir().unwrap();
        let mut tx = FileTransaction::begin(dir.path()).unwrap();
        tx.delete_file(&name).unwrap();
        tx.apply_all().unwrap();
        tx.commit().unwrap();
        prop_assert!(!dir.path().join(&name).exists());
    }

    /// Snapshot uniqueness: staging the same path more than once within
    /// one transaction captures its pre-transaction content exactly
    /// once, so rollback always restores the *original* content, never
    /// an intermediate staged value.
    #[test]
    fn snapshot_is_captured_once_per_path(v1 in prop::collection::vec(any::<u8>(), 1..8)) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), &v1).unwrap();
        let mut tx = FileTransaction::begin(dir.path()).unwrap();
        tx.modify_file("a.txt", b"first-write".to_vec()).unwrap();
        tx.modify_file("a.txt", b"second-write".to_vec()).unwrap();
        tx.apply_all().unwrap();
        tx.rollback("property test").unwrap();
        prop_assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), v1);
    }
}

#[test]
fn crash_after_applied_without_commit_is_recovered_on_restart() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"orig").unwrap();

    let mut tx = FileTransaction::begin(dir.path()).unwrap();
    tx.modify_file("a.txt", b"mutated".to_vec()).unwrap();
    tx.apply_next().unwrap();
    // Simulate a crash: drop the transaction handle before `commit`,
    // leaving the WAL without a trailing COMMIT record.
    drop(tx);

    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"mutated");
    let actions = recover_base_dir(dir.path()).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].1, RecoveryAction::RestoredToPreBegin);
    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"orig");

    let wal_dir = dir.path().join(".plandex/wal");
    assert_eq!(fs::read_dir(&wal_dir).unwrap().count(), 0);
}
