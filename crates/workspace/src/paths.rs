//! On-disk layout helpers: where a plan/branch's workspace id is
//! registered, and where a workspace's own directory lives.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use plandex_core_types::{atomic_write, BranchName, Error as CoreError, PlanId, WorkspaceId};

use crate::error::Result;

/// `<project>/.plandex/workspaces-v2.json`: maps `(plan, branch)` to the
/// currently registered workspace id for that pair.
pub fn reference_file_path(project_root: &Path) -> PathBuf {
    project_root.join(".plandex").join("workspaces-v2.json")
}

/// `<home>/.plandex-home/workspaces/<id>`.
pub fn workspace_dir(home_dir: &Path, id: WorkspaceId) -> PathBuf {
    home_dir.join("workspaces").join(id.to_string())
}

fn ref_key(plan: PlanId, branch: &BranchName) -> String {
    format!("{plan}:{}", branch.as_str())
}

/// Load the `(plan, branch) -> workspace-id` map, or an empty map if the
/// reference file does not exist yet.
pub fn load_references(project_root: &Path) -> Result<BTreeMap<String, WorkspaceId>> {
    let path = reference_file_path(project_root);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let bytes = fs::read(&path).map_err(|e| CoreError::io(&path, e))?;
    let map = serde_json::from_slice(&bytes).map_err(CoreError::Serialization)?;
    Ok(map)
}

fn save_references(project_root: &Path, map: &BTreeMap<String, WorkspaceId>) -> Result<()> {
    let path = reference_file_path(project_root);
    let bytes = serde_json::to_vec_pretty(map).map_err(CoreError::Serialization)?;
    atomic_write(&path, &bytes, 0o644)?;
    Ok(())
}

/// Look up the workspace id registered for `(plan, branch)`, if any.
pub fn lookup(project_root: &Path, plan: PlanId, branch: &BranchName) -> Result<Option<WorkspaceId>> {
    let map = load_references(project_root)?;
    Ok(map.get(&ref_key(plan, branch)).copied())
}

/// Register `(plan, branch) -> id`.
pub fn register(project_root: &Path, plan: PlanId, branch: &BranchName, id: WorkspaceId) -> Result<()> {
    let mut map = load_references(project_root)?;
    map.insert(ref_key(plan, branch), id);
    save_references(project_root, &map)
}

/// Remove the `(plan, branch)` entry, if present.
pub fn unregister(project_root: &Path, plan: PlanId, branch: &BranchName) -> Result<()> {
    let mut map = load_references(project_root)?;
    map.remove(&ref_key(plan, branch));
    save_references(project_root, &map)
}
