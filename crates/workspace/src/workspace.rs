//! [`WorkspaceManager`]: the public surface for creating, staging into,
//! checkpointing, and tearing down workspaces.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use plandex_core_types::{
    atomic_write, now_micros, BranchName, CoreConfig, Error as CoreError, PlanId, WorkspaceId,
};
use plandex_durability::FileTransaction;

use crate::error::{Result, WorkspaceError};
use crate::model::{Checkpoint, CreatedEntry, ModifiedEntry, Workspace, WorkspaceState};
use crate::paths;
use crate::recovery_marker::{RecoveryMarker, RiskyOp};

fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// A caller-supplied batch of file changes to stage via
/// [`WorkspaceManager::stage_changes`].
#[derive(Debug, Clone, Default)]
pub struct StagedChanges {
    creates: BTreeMap<String, Vec<u8>>,
    modifies: BTreeMap<String, Vec<u8>>,
    deletes: Vec<String>,
}

impl StagedChanges {
    /// Stage a file creation.
    pub fn with_create(mut self, path: impl Into<String>, content: Vec<u8>) -> Self {
        self.creates.insert(path.into(), content);
        self
    }

    /// Stage a file modification.
    pub fn with_modify(mut self, path: impl Into<String>, content: Vec<u8>) -> Self {
        self.modifies.insert(path.into(), content);
        self
    }

    /// Stage a file deletion.
    pub fn with_delete(mut self, path: impl Into<String>) -> Self {
        self.deletes.push(path.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.modifies.is_empty() && self.deletes.is_empty()
    }
}

fn append_op_log(ws: &Workspace, op: &str, detail: &str) {
    let path = ws.operations_log_path();
    let record = serde_json::json!({ "op": op, "at": now_micros(), "detail": detail });
    let Ok(mut line) = serde_json::to_vec(&record) else {
        return;
    };
    line.push(b'\n');
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            tracing::warn!(op, "failed to create workspace log directory");
            return;
        }
    }
    use std::io::Write;
    match fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(mut file) => {
            if let Err(e) = file.write_all(&line) {
                tracing::warn!(op, error = %e, "failed to append workspace operations log");
            }
        }
        Err(e) => tracing::warn!(op, error = %e, "failed to open workspace operations log"),
    }
}

/// Entry point for creating, staging, checkpointing, and tearing down
/// per-`(plan, branch)` workspaces.
pub struct WorkspaceManager {
    config: CoreConfig,
}

impl WorkspaceManager {
    /// Build a manager rooted at `config.project_root`/`config.home_dir`.
    pub fn new(config: CoreConfig) -> Self {
        Self { config }
    }

    /// Return the existing workspace registered for `(plan, branch)`, or
    /// create a new `PENDING` one. If the found workspace has a
    /// `recovery.json` marker, it is loaded in `RECOVERING` state instead
    /// of being handed back ready to use.
    pub fn get_or_create(
        &self,
        plan: PlanId,
        branch: BranchName,
        project_id: impl Into<String>,
    ) -> Result<Workspace> {
        if let Some(id) = paths::lookup(&self.config.project_root, plan, &branch)? {
            return self.load(id);
        }
        let project_id = project_id.into();
        let id = WorkspaceId::new();
        let workspace_dir = paths::workspace_dir(&self.config.home_dir, id);
        let mut ws = Workspace::new(
            plan,
            branch.clone(),
            project_id,
            self.config.project_root.clone(),
            workspace_dir,
        );
        ws.id = id;
        self.persist(&ws)?;
        paths::register(&self.config.project_root, plan, &branch, id)?;
        Ok(ws)
    }

    /// Load a workspace by id from its `workspace.json` record. If a
    /// `recovery.json` marker is present, the returned workspace has
    /// state `RECOVERING` regardless of what was persisted.
    pub fn load(&self, id: WorkspaceId) -> Result<Workspace> {
        let workspace_dir = paths::workspace_dir(&self.config.home_dir, id);
        let record_path = workspace_dir.join("workspace.json");
        if !record_path.exists() {
            return Err(WorkspaceError::NotFound(id));
        }
        let bytes = fs::read(&record_path).map_err(|e| CoreError::io(&record_path, e))?;
        let mut ws: Workspace = serde_json::from_slice(&bytes).map_err(CoreError::Serialization)?;
        if RecoveryMarker::load(&ws.recovery_marker_path())?.is_some() {
            ws.state = WorkspaceState::Recovering;
        }
        Ok(ws)
    }

    /// Alias for [`Self::load`], matching the operational-interface name
    /// (`Resume`).
    pub fn resume(&self, id: WorkspaceId) -> Result<Workspace> {
        self.load(id)
    }

    /// Scan every registered workspace and, for any whose `recovery.json`
    /// marker is present, flip it to `RECOVERING` and persist that
    /// immediately. Returns the workspaces marked this way.
    ///
    /// This is the eager half of `RecoverOnStartup` (spec.md §6):
    /// [`Self::load`] only notices an interrupted workspace lazily, the
    /// next time that particular id is resumed, so a caller sweeping all
    /// workspaces at process startup needs this instead.
    pub fn mark_interrupted_workspaces(&self) -> Result<Vec<Workspace>> {
        let workspaces_root = self.config.home_dir.join("workspaces");
        if !workspaces_root.exists() {
            return Ok(Vec::new());
        }
        let mut recovering = Vec::new();
        for entry in fs::read_dir(&workspaces_root).map_err(|e| CoreError::io(&workspaces_root, e))? {
            let entry = entry.map_err(|e| CoreError::io(&workspaces_root, e))?;
            let record_path = entry.path().join("workspace.json");
            let Ok(bytes) = fs::read(&record_path) else {
                continue;
            };
            let Ok(mut ws) = serde_json::from_slice::<Workspace>(&bytes) else {
                continue;
            };
            if RecoveryMarker::load(&ws.recovery_marker_path())?.is_none() {
                continue;
            }
            ws.state = WorkspaceState::Recovering;
            self.persist(&ws)?;
            recovering.push(ws);
        }
        Ok(recovering)
    }

    fn persist(&self, ws: &Workspace) -> Result<()> {
        fs::create_dir_all(&ws.workspace_dir).map_err(|e| CoreError::io(&ws.workspace_dir, e))?;
        fs::create_dir_all(ws.files_dir()).map_err(|e| CoreError::io(ws.files_dir(), e))?;
        fs::create_dir_all(ws.checkpoints_dir()).map_err(|e| CoreError::io(ws.checkpoints_dir(), e))?;
        let bytes = serde_json::to_vec_pretty(ws).map_err(CoreError::Serialization)?;
        atomic_write(&ws.record_path(), &bytes, 0o644)?;
        Ok(())
    }

    /// `PENDING -> ACTIVE`, and touch `last_accessed_at`.
    pub fn activate(&self, ws: &mut Workspace) -> Result<()> {
        if ws.state == WorkspaceState::Recovering {
            return Err(WorkspaceError::RecoveryRequired {
                id: ws.id,
                reason: "recovery marker present".into(),
            });
        }
        ws.state = WorkspaceState::Active;
        ws.last_accessed_at = now_micros();
        self.persist(ws)
    }

    /// Stage a batch of creates/modifies/deletes through a
    /// [`FileTransaction`] rooted at the workspace's `files/` directory,
    /// then update the tracking maps. A `recovery.json` marker is
    /// written before staging begins and removed once the tracking maps
    /// have been durably saved; on transaction failure the tracking maps
    /// are left unchanged.
    pub fn stage_changes(&self, ws: &mut Workspace, changes: StagedChanges) -> Result<()> {
        if ws.state != WorkspaceState::Active {
            return Err(WorkspaceError::InvalidState {
                id: ws.id,
                expected: "ACTIVE",
                actual: state_name(ws.state),
            });
        }
        if changes.is_empty() {
            return Ok(());
        }

        let mut pending_paths: Vec<String> = changes.creates.keys().cloned().collect();
        pending_paths.extend(changes.modifies.keys().cloned());
        pending_paths.extend(changes.deletes.iter().cloned());
        let marker = RecoveryMarker::new(ws.id.to_string(), RiskyOp::StageChanges, pending_paths);
        marker.write(&ws.recovery_marker_path())?;

        let stage_result = self.stage_changes_inner(ws, &changes);
        match stage_result {
            Ok(()) => {
                RecoveryMarker::remove(&ws.recovery_marker_path())?;
                append_op_log(ws, "stage_changes", "ok");
                Ok(())
            }
            Err(e) => {
                // Tracking maps untouched; leave the marker so a future
                // `Resume` surfaces RECOVERING for an operator.
                append_op_log(ws, "stage_changes", &format!("failed: {e}"));
                Err(e)
            }
        }
    }

    fn stage_changes_inner(&self, ws: &mut Workspace, changes: &StagedChanges) -> Result<()> {
        let files_dir = ws.files_dir();
        let mut tx = FileTransaction::begin(&files_dir)?;

        for (path, content) in &changes.creates {
            if same_content_already_staged(ws, path, content) {
                continue;
            }
            tx.create_file(path, content.clone())?;
        }
        for (path, content) in &changes.modifies {
            if same_content_already_staged(ws, path, content) {
                continue;
            }
            tx.modify_file(path, content.clone())?;
        }
        for path in &changes.deletes {
            tx.delete_file(path)?;
        }
        tx.apply_all()?;
        tx.commit()?;

        // Durable write to files/ succeeded; now update tracking maps.
        for (path, content) in &changes.creates {
            ws.deleted_files.remove(path);
            ws.modified_files.remove(path);
            ws.created_files.insert(
                path.clone(),
                CreatedEntry {
                    hash: hash_bytes(content),
                    mode: plandex_core_types::DEFAULT_FILE_MODE,
                },
            );
        }
        for (path, content) in &changes.modifies {
            let original_hash = self.real_project_hash(ws, path);
            ws.deleted_files.remove(path);
            ws.created_files.remove(path);
            ws.modified_files.insert(
                path.clone(),
                ModifiedEntry {
                    original_hash,
                    new_hash: hash_bytes(content),
                    mode: plandex_core_types::DEFAULT_FILE_MODE,
                },
            );
        }
        for path in &changes.deletes {
            ws.created_files.remove(path);
            ws.modified_files.remove(path);
            ws.deleted_files.insert(path.clone());
        }
        ws.updated_at = now_micros();
        self.persist(ws)
    }

    fn real_project_hash(&self, ws: &Workspace, relpath: &str) -> String {
        let real_path = ws.base_dir.join(relpath);
        match fs::read(&real_path) {
            Ok(content) => hash_bytes(&content),
            Err(_) => String::new(),
        }
    }

    /// Mark a workspace `DISCARDED`, unregister its `(plan, branch)`
    /// entry, and — unless `retain_discarded` is set — remove its files
    /// directory.
    pub fn discard(&self, ws: &mut Workspace) -> Result<()> {
        ws.state = WorkspaceState::Discarded;
        self.persist(ws)?;
        paths::unregister(&self.config.project_root, ws.plan, &ws.branch)?;
        if !self.config.workspace_cleanup.retain_discarded {
            let files_dir = ws.files_dir();
            if files_dir.exists() {
                fs::remove_dir_all(&files_dir).map_err(|e| CoreError::io(&files_dir, e))?;
            }
        }
        append_op_log(ws, "discard", "ok");
        Ok(())
    }

    /// Snapshot the tracking maps into `checkpoints/<name>.json`. Does
    /// not touch `files/`.
    pub fn checkpoint(&self, ws: &Workspace, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let checkpoint = Checkpoint {
            name: name.clone(),
            modified_files: ws.modified_files.clone(),
            created_files: ws.created_files.clone(),
            deleted_files: ws.deleted_files.clone(),
            updated_at: ws.updated_at,
        };
        let path = ws.checkpoints_dir().join(format!("{name}.json"));
        let bytes = serde_json::to_vec_pretty(&checkpoint).map_err(CoreError::Serialization)?;
        atomic_write(&path, &bytes, 0o644)?;
        append_op_log(ws, "checkpoint", &name);
        Ok(())
    }

    /// Replace the in-memory tracking maps with a named checkpoint's.
    /// Requires state `ACTIVE`. `files/` is left as-is: content the
    /// checkpoint no longer tracks for a path becomes orphaned until the
    /// next cleanup or a future `stage_changes` overwrites it.
    pub fn restore_checkpoint(&self, ws: &mut Workspace, name: &str) -> Result<()> {
        if ws.state != WorkspaceState::Active {
            return Err(WorkspaceError::InvalidState {
                id: ws.id,
                expected: "ACTIVE",
                actual: state_name(ws.state),
            });
        }
        let path = ws.checkpoints_dir().join(format!("{name}.json"));
        if !path.exists() {
            return Err(WorkspaceError::CheckpointNotFound(name.to_string()));
        }
        let bytes = fs::read(&path).map_err(|e| CoreError::io(&path, e))?;
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes).map_err(CoreError::Serialization)?;
        ws.modified_files = checkpoint.modified_files;
        ws.created_files = checkpoint.created_files;
        ws.deleted_files = checkpoint.deleted_files;
        ws.updated_at = now_micros();
        self.persist(ws)
    }

    /// Enumerate checkpoint names.
    pub fn list_checkpoints(&self, ws: &Workspace) -> Result<Vec<String>> {
        let dir = ws.checkpoints_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| CoreError::io(&dir, e))? {
            let entry = entry.map_err(|e| CoreError::io(&dir, e))?;
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove workspaces in terminal states (`COMMITTED`/`DISCARDED`)
    /// whose `last_accessed_at` is older than the configured staleness
    /// threshold, plus any `PENDING`/`ACTIVE` workspace idle past the
    /// same threshold. Never removes `RECOVERING` workspaces. Returns the
    /// number of workspaces removed, capped at `batch_size`.
    pub fn cleanup(&self) -> Result<usize> {
        let workspaces_root = self.config.home_dir.join("workspaces");
        if !workspaces_root.exists() {
            return Ok(0);
        }
        let threshold_micros =
            self.config.workspace_cleanup.stale_after_days as u64 * 24 * 3600 * 1_000_000;
        let now = now_micros();
        let mut removed = 0usize;

        for entry in fs::read_dir(&workspaces_root).map_err(|e| CoreError::io(&workspaces_root, e))? {
            if removed >= self.config.workspace_cleanup.batch_size {
                break;
            }
            let entry = entry.map_err(|e| CoreError::io(&workspaces_root, e))?;
            let dir = entry.path();
            let record_path = dir.join("workspace.json");
            let Ok(bytes) = fs::read(&record_path) else {
                continue;
            };
            let Ok(ws) = serde_json::from_slice::<Workspace>(&bytes) else {
                continue;
            };
            if ws.state == WorkspaceState::Recovering {
                continue;
            }
            if dir.join("recovery.json").exists() {
                continue;
            }
            let eligible = match ws.state {
                WorkspaceState::Committed | WorkspaceState::Discarded => true,
                WorkspaceState::Pending | WorkspaceState::Active => {
                    now.saturating_sub(ws.last_accessed_at) > threshold_micros
                }
                WorkspaceState::Recovering => false,
            };
            if eligible {
                fs::remove_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// The workspace directory path for `id`, without requiring the
    /// workspace to be loaded.
    pub fn workspace_dir(&self, id: WorkspaceId) -> PathBuf {
        paths::workspace_dir(&self.config.home_dir, id)
    }

    /// Enumerate every workspace registered under `home_dir/workspaces`,
    /// optionally restricted to one project id. Entries whose
    /// `workspace.json` is missing or unreadable are skipped rather than
    /// failing the whole listing.
    pub fn list(&self, project_id: Option<&str>) -> Result<Vec<Workspace>> {
        let workspaces_root = self.config.home_dir.join("workspaces");
        if !workspaces_root.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&workspaces_root).map_err(|e| CoreError::io(&workspaces_root, e))? {
            let entry = entry.map_err(|e| CoreError::io(&workspaces_root, e))?;
            let record_path = entry.path().join("workspace.json");
            let Ok(bytes) = fs::read(&record_path) else {
                continue;
            };
            let Ok(ws) = serde_json::from_slice::<Workspace>(&bytes) else {
                continue;
            };
            if project_id.map_or(true, |p| ws.project_id == p) {
                out.push(ws);
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }
}

fn same_content_already_staged(ws: &Workspace, path: &str, content: &[u8]) -> bool {
    let hash = hash_bytes(content);
    if let Some(entry) = ws.created_files.get(path) {
        return entry.hash == hash;
    }
    if let Some(entry) = ws.modified_files.get(path) {
        return entry.new_hash == hash;
    }
    false
}

fn state_name(state: WorkspaceState) -> &'static str {
    match state {
        WorkspaceState::Pending => "PENDING",
        WorkspaceState::Active => "ACTIVE",
        WorkspaceState::Committed => "COMMITTED",
        WorkspaceState::Discarded => "DISCARDED",
        WorkspaceState::Recovering => "RECOVERING",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plandex_core_types::BranchName;
    use tempfile::tempdir;

    fn manager(dir: &std::path::Path) -> WorkspaceManager {
        let config = CoreConfig::new(dir).with_home_dir(dir.join("home"));
        WorkspaceManager::new(config)
    }

    #[test]
    fn get_or_create_then_load_returns_same_workspace() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let plan = PlanId::new();
        let ws = mgr.get_or_create(plan, BranchName::root(), "proj").unwrap();
        let reloaded = mgr.get_or_create(plan, BranchName::root(), "proj").unwrap();
        assert_eq!(ws.id, reloaded.id);
    }

    #[test]
    fn stage_changes_tracks_disjoint_paths() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let plan = PlanId::new();
        let mut ws = mgr.get_or_create(plan, BranchName::root(), "proj").unwrap();
        mgr.activate(&mut ws).unwrap();

        mgr.stage_changes(
            &mut ws,
            StagedChanges::default().with_create("a.txt", b"hello".to_vec()),
        )
        .unwrap();
        assert!(ws.created_files.contains_key("a.txt"));

        // Deleting a previously-created path evicts it from created_files.
        mgr.stage_changes(&mut ws, StagedChanges::default().with_delete("a.txt"))
            .unwrap();
        assert!(!ws.created_files.contains_key("a.txt"));
        assert!(ws.deleted_files.contains("a.txt"));
    }

    #[test]
    fn checkpoint_round_trips_tracking_maps() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let plan = PlanId::new();
        let mut ws = mgr.get_or_create(plan, BranchName::root(), "proj").unwrap();
        mgr.activate(&mut ws).unwrap();
        mgr.stage_changes(
            &mut ws,
            StagedChanges::default().with_create("a.txt", b"v1".to_vec()),
        )
        .unwrap();
        mgr.checkpoint(&ws, "before-b").unwrap();
        mgr.stage_changes(
            &mut ws,
            StagedChanges::default().with_create("b.txt", b"v1".to_vec()),
        )
        .unwrap();
        assert!(ws.created_files.contains_key("b.txt"));
        mgr.restore_checkpoint(&mut ws, "before-b").unwrap();
        assert!(!ws.created_files.contains_key("b.txt"));
        assert!(ws.created_files.contains_key("a.txt"));
    }
}
