//! On-disk and in-memory shape of a [`Workspace`] record.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use plandex_core_types::{now_micros, BranchName, PlanId, TxnId, WorkspaceId};

/// Lifecycle state of a [`Workspace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceState {
    /// Registered but never activated.
    Pending,
    /// In use; `StageChanges` and `Commit` are permitted.
    Active,
    /// Successfully committed to the real project.
    Committed,
    /// Discarded; real project left untouched.
    Discarded,
    /// A `recovery.json` marker was found on load; read-only until an
    /// operator resolves it.
    Recovering,
}

/// Tracking entry for a path the workspace has modified (was present in
/// the real project, now has different content staged in `files/`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifiedEntry {
    /// Hash of the real project's content at the time this path was
    /// first staged (read from the *real project*, not the workspace).
    pub original_hash: String,
    /// Hash of the content now staged in the workspace's `files/` tree.
    pub new_hash: String,
    /// Unix mode bits to apply on commit.
    pub mode: u32,
}

/// Tracking entry for a path the workspace has newly created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedEntry {
    /// Hash of the staged content.
    pub hash: String,
    /// Unix mode bits to apply on commit.
    pub mode: u32,
}

/// A copy-on-write sandbox for one `(plan, branch)`. Buffers proposed
/// file changes until [`crate::commit_workspace`] drains them into the
/// real project, or [`crate::WorkspaceManager::discard`] throws them
/// away.
///
/// Invariant: a path appears in at most one of `modified_files`,
/// `created_files`, `deleted_files` — `StageChanges` enforces this by
/// evicting from the other two whenever one is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique identifier.
    pub id: WorkspaceId,
    /// Plan this workspace belongs to.
    pub plan: PlanId,
    /// Branch this workspace belongs to.
    pub branch: BranchName,
    /// Opaque identifier of the real project this workspace commits
    /// into.
    pub project_id: String,
    /// The real project's root directory.
    pub base_dir: std::path::PathBuf,
    /// This workspace's own directory (`<home>/.plandex-home/workspaces/<id>`).
    pub workspace_dir: std::path::PathBuf,
    /// Current lifecycle state.
    pub state: WorkspaceState,
    /// Paths modified relative to the real project, keyed by path
    /// relative to `base_dir`.
    pub modified_files: BTreeMap<String, ModifiedEntry>,
    /// Paths newly created, keyed by relative path.
    pub created_files: BTreeMap<String, CreatedEntry>,
    /// Paths to delete on commit, relative to `base_dir`.
    pub deleted_files: BTreeSet<String>,
    /// Creation timestamp (micros since epoch).
    pub created_at: u64,
    /// Last time any tracking map was mutated.
    pub updated_at: u64,
    /// Last time this workspace was touched by any operation.
    pub last_accessed_at: u64,
    /// The transaction id of an in-flight `StageChanges`/commit
    /// transaction, if any.
    pub active_tx_id: Option<TxnId>,
}

impl Workspace {
    /// Construct a brand new `PENDING` workspace.
    pub fn new(
        plan: PlanId,
        branch: BranchName,
        project_id: impl Into<String>,
        base_dir: impl Into<std::path::PathBuf>,
        workspace_dir: impl Into<std::path::PathBuf>,
    ) -> Self {
        let now = now_micros();
        Self {
            id: WorkspaceId::new(),
            plan,
            branch,
            project_id: project_id.into(),
            base_dir: base_dir.into(),
            workspace_dir: workspace_dir.into(),
            state: WorkspaceState::Pending,
            modified_files: BTreeMap::new(),
            created_files: BTreeMap::new(),
            deleted_files: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            active_tx_id: None,
        }
    }

    /// This workspace's CoW file tree.
    pub fn files_dir(&self) -> std::path::PathBuf {
        self.workspace_dir.join("files")
    }

    /// Directory named checkpoints are written under.
    pub fn checkpoints_dir(&self) -> std::path::PathBuf {
        self.workspace_dir.join("checkpoints")
    }

    /// Append-only operations audit log.
    pub fn operations_log_path(&self) -> std::path::PathBuf {
        self.workspace_dir.join("logs").join("operations.log")
    }

    /// Path of the recovery marker, present only during a risky op.
    pub fn recovery_marker_path(&self) -> std::path::PathBuf {
        self.workspace_dir.join("recovery.json")
    }

    /// Path of the `workspace.json` record file.
    pub fn record_path(&self) -> std::path::PathBuf {
        self.workspace_dir.join("workspace.json")
    }

    /// True if no path is tracked in any of the three maps.
    pub fn has_no_changes(&self) -> bool {
        self.modified_files.is_empty() && self.created_files.is_empty() && self.deleted_files.is_empty()
    }
}

/// A named, in-memory snapshot of a workspace's tracking maps, persisted
/// under `checkpoints/<name>.json`. Restoring a checkpoint never touches
/// `files/` — it is a bookkeeping operation only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint name.
    pub name: String,
    /// Modified-files map at checkpoint time.
    pub modified_files: BTreeMap<String, ModifiedEntry>,
    /// Created-files map at checkpoint time.
    pub created_files: BTreeMap<String, CreatedEntry>,
    /// Deleted-files set at checkpoint time.
    pub deleted_files: BTreeSet<String>,
    /// `updated_at` at checkpoint time.
    pub updated_at: u64,
}
