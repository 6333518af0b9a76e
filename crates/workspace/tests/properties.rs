//! Property test for the invariant this crate owns: a workspace's
//! `modified_files`, `created_files`, and `deleted_files` tracking maps
//! are always disjoint, for any sequence of staged changes.

use plandex_core_types::{BranchName, CoreConfig, PlanId};
use plandex_workspace::{StagedChanges, WorkspaceManager};
use proptest::prelude::*;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Change {
    Create(String, Vec<u8>),
    Modify(String, Vec<u8>),
    Delete(String),
}

const PATHS: [&str; 4] = ["a.txt", "b.txt", "c.txt", "sub/d.txt"];

fn change_strategy() -> impl Strategy<Value = Change> {
    let path = prop::sample::select(&PATHS[..]).prop_map(|p| p.to_string());
    let content = prop::collection::vec(any::<u8>(), 0..12);
    prop_oneof![
        (path.clone(), content.clone()).prop_map(|(p, c)| Change::Create(p, c)),
        (path.clone(), content).prop_map(|(p, c)| Change::Modify(p, c)),
        path.prop_map(Change::Delete),
    ]
}

fn assert_disjoint(ws: &plandex_workspace::Workspace) {
    for path in ws.created_files.keys() {
        assert!(!ws.modified_files.contains_key(path));
        assert!(!ws.deleted_files.contains(path));
    }
    for path in ws.modified_files.keys() {
        assert!(!ws.deleted_files.contains(path));
    }
}

proptest! {
    #[test]
    fn tracking_maps_stay_disjoint_after_any_change_sequence(changes in prop::collection::vec(change_strategy(), 1..10)) {
        let project = tempdir().unwrap();
        let home = tempdir().unwrap();
        let config = CoreConfig::new(project.path()).with_home_dir(home.path());
        let manager = WorkspaceManager::new(config);
        let plan = PlanId::new();
        let mut ws = manager.get_or_create(plan, BranchName::root(), "proj").unwrap();
        manager.activate(&mut ws).unwrap();

        for change in changes {
            let staged = match change {
                Change::Create(p, c) => StagedChanges::default().with_create(p, c),
                Change::Modify(p, c) => StagedChanges::default().with_modify(p, c),
                Change::Delete(p) => StagedChanges::default().with_delete(p),
            };
            // Individual stage calls may fail only on I/O; never on a
            // disjointness violation, so we assert post-state
            // unconditionally after attempting each one.
            let _ = manager.stage_changes(&mut ws, staged);
            assert_disjoint(&ws);
        }
    }
}
