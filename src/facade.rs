//! [`PlandexCore`]: the single entry point an embedding process
//! constructs, wiring the operation queue, file transaction engine, and
//! workspace manager together behind one `CoreConfig`.

use std::fs;
use std::sync::Arc;

use plandex_core_types::{BranchName, CoreConfig, Error as CoreError, PlanId, WorkspaceId};
use plandex_concurrency::{LockRequest, LockSnapshot, OperationContext, RepoQueue};
use plandex_durability::{recover_base_dir, RecoveryAction, TransactionError};
use plandex_workspace::{commit_workspace, StagedChanges, Workspace, WorkspaceManager};

use crate::error::Result;

/// A content diff between a workspace's tracking maps and the real
/// project: the paths it would create, modify, and delete on commit.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceDiff {
    /// Paths the workspace would create.
    pub created: Vec<String>,
    /// Paths the workspace would modify.
    pub modified: Vec<String>,
    /// Paths the workspace would delete.
    pub deleted: Vec<String>,
}

/// The result of [`PlandexCore::recover_on_startup`]: every interrupted
/// file transaction it finished or undid, plus every workspace it found
/// still carrying a `recovery.json` marker and flipped to `RECOVERING`.
#[derive(Debug, Default)]
pub struct StartupRecovery {
    /// One entry per interrupted transaction found under `project_root`
    /// or a workspace's `files/` tree.
    pub transactions: Vec<(plandex_core_types::TxnId, RecoveryAction)>,
    /// Workspaces marked `RECOVERING` because their `recovery.json`
    /// marker was still present at startup.
    pub recovering_workspaces: Vec<Workspace>,
}

/// Entry point wiring the operation queue ([`plandex_concurrency`]),
/// file transaction engine ([`plandex_durability`]), and workspace
/// manager ([`plandex_workspace`]) together behind a single
/// [`CoreConfig`].
///
/// Cheap to clone-by-reference: hold it behind an `Arc` to share across
/// the sessions and background tasks of an embedding process.
pub struct PlandexCore {
    config: CoreConfig,
    queue: Arc<RepoQueue>,
    workspaces: WorkspaceManager,
}

impl PlandexCore {
    /// Build the facade over `config`, creating `config.project_root`
    /// and `config.home_dir` if they don't already exist. Does not start
    /// the background reaper — call [`Self::start_reaper`] separately if
    /// the embedding process wants one.
    pub fn open(config: CoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.project_root).map_err(|e| CoreError::io(&config.project_root, e))?;
        fs::create_dir_all(&config.home_dir).map_err(|e| CoreError::io(&config.home_dir, e))?;
        let queue = Arc::new(RepoQueue::new(config.clone()));
        let workspaces = WorkspaceManager::new(config.clone());
        Ok(Self {
            config,
            queue,
            workspaces,
        })
    }

    /// The configuration this facade was opened with.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // ---- Operation Queue -------------------------------------------------

    /// Run `f` once `request`'s lock has been acquired for `plan`. See
    /// [`RepoQueue::submit`].
    pub fn submit<T, F>(
        &self,
        plan: PlanId,
        request: LockRequest,
        context: OperationContext,
        owner_session: impl Into<String>,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        Ok(self.queue.submit(plan, request, context, owner_session, f)?)
    }

    /// List active locks, optionally restricted to one plan.
    pub fn list_locks(&self, plan: Option<PlanId>) -> Vec<LockSnapshot> {
        self.queue.list_locks(plan)
    }

    /// Reap every lock whose heartbeat has lapsed past the stale
    /// threshold. Returns the number reclaimed.
    pub fn clear_stale_locks(&self) -> usize {
        self.queue.clear_stale_locks()
    }

    /// Start the background reaper thread, sweeping at
    /// `config().reaper_interval`. Dropping or stopping the returned
    /// handle stops the thread.
    pub fn start_reaper(self: &Arc<Self>) -> plandex_concurrency::Reaper {
        plandex_concurrency::Reaper::start(self.queue.clone(), self.config.reaper_interval)
    }

    // ---- Workspace ---------------------------------------------------

    /// Return the workspace registered for `(plan, branch)`, creating a
    /// new `PENDING` one if none is registered yet.
    pub fn get_or_create_workspace(
        &self,
        plan: PlanId,
        branch: BranchName,
        project_id: impl Into<String>,
    ) -> Result<Workspace> {
        Ok(self.workspaces.get_or_create(plan, branch, project_id)?)
    }

    /// Resume a workspace by id (surfaces `RECOVERING` if its
    /// `recovery.json` marker is present).
    pub fn resume_workspace(&self, id: WorkspaceId) -> Result<Workspace> {
        Ok(self.workspaces.resume(id)?)
    }

    /// Enumerate every registered workspace, optionally restricted to one
    /// project id.
    pub fn list_workspaces(&self, project_id: Option<&str>) -> Result<Vec<Workspace>> {
        Ok(self.workspaces.list(project_id)?)
    }

    /// `PENDING -> ACTIVE`.
    pub fn activate_workspace(&self, ws: &mut Workspace) -> Result<()> {
        Ok(self.workspaces.activate(ws)?)
    }

    /// Stage a batch of creates/modifies/deletes into `ws`'s copy-on-write
    /// tree.
    pub fn stage_changes(&self, ws: &mut Workspace, changes: StagedChanges) -> Result<()> {
        Ok(self.workspaces.stage_changes(ws, changes)?)
    }

    /// Drain `ws`'s tracking maps into the real project. See
    /// [`plandex_workspace::commit_workspace`].
    pub fn commit_workspace(&self, ws: &mut Workspace) -> Result<()> {
        Ok(commit_workspace(ws)?)
    }

    /// Mark `ws` `DISCARDED` and unregister its `(plan, branch)` entry.
    pub fn discard_workspace(&self, ws: &mut Workspace) -> Result<()> {
        Ok(self.workspaces.discard(ws)?)
    }

    /// Snapshot `ws`'s tracking maps as a named checkpoint.
    pub fn checkpoint_workspace(&self, ws: &Workspace, name: impl Into<String>) -> Result<()> {
        Ok(self.workspaces.checkpoint(ws, name)?)
    }

    /// Replace `ws`'s tracking maps with a named checkpoint's.
    pub fn restore_checkpoint(&self, ws: &mut Workspace, name: &str) -> Result<()> {
        Ok(self.workspaces.restore_checkpoint(ws, name)?)
    }

    /// Enumerate `ws`'s checkpoint names.
    pub fn list_checkpoints(&self, ws: &Workspace) -> Result<Vec<String>> {
        Ok(self.workspaces.list_checkpoints(ws)?)
    }

    /// The paths `ws` would create, modify, and delete if committed now.
    pub fn diff_workspace(&self, ws: &Workspace) -> WorkspaceDiff {
        WorkspaceDiff {
            created: ws.created_files.keys().cloned().collect(),
            modified: ws.modified_files.keys().cloned().collect(),
            deleted: ws.deleted_files.iter().cloned().collect(),
        }
    }

    /// Remove workspaces eligible under `config().workspace_cleanup`.
    /// Returns the number removed.
    pub fn cleanup_workspaces(&self) -> Result<usize> {
        Ok(self.workspaces.cleanup()?)
    }

    // ---- Crash recovery -------------------------------------------------

    /// Finish or undo every interrupted transaction found under
    /// `config().project_root` (a commit that never reached a trailing
    /// `COMMIT` WAL record) and under every registered workspace's
    /// `files/` tree (an interrupted `StageChanges`), then eagerly scan
    /// every registered workspace for a `recovery.json` marker and mark
    /// it `RECOVERING`. Call once at process startup, before serving any
    /// request.
    pub fn recover_on_startup(&self) -> Result<StartupRecovery> {
        let mut transactions = recover_base_dir(&self.config.project_root)
            .map_err(crate::error::Error::Transaction)?;

        let workspaces_root = self.config.home_dir.join("workspaces");
        if workspaces_root.exists() {
            for entry in fs::read_dir(&workspaces_root).map_err(|e| CoreError::io(&workspaces_root, e))? {
                let entry = entry.map_err(|e| CoreError::io(&workspaces_root, e))?;
                let files_dir = entry.path().join("files");
                if !files_dir.exists() {
                    continue;
                }
                match recover_base_dir(&files_dir) {
                    Ok(mut more) => transactions.append(&mut more),
                    Err(TransactionError::Core(CoreError::Io { .. })) => continue,
                    Err(e) => return Err(crate::error::Error::Transaction(e)),
                }
            }
        }

        let recovering_workspaces = self.workspaces.mark_interrupted_workspaces()?;

        Ok(StartupRecovery {
            transactions,
            recovering_workspaces,
        })
    }
}
