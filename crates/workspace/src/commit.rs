//! The Workspace Commit Driver: drains a workspace's tracking maps into
//! the real project through a [`plandex_durability::FileTransaction`]
//! rooted at `workspace.base_dir`.

use std::fs;

use plandex_core_types::{now_micros, Error as CoreError};
use plandex_durability::FileTransaction;

use crate::error::{Result, WorkspaceError};
use crate::model::{Workspace, WorkspaceState};
use crate::paths;
use crate::recovery_marker::{RecoveryMarker, RiskyOp};

/// Commit `workspace` into the real project.
///
/// Requires state `ACTIVE`. Reads staged content from
/// `workspace.files_dir()`, stages it into a [`FileTransaction`] rooted
/// at `workspace.base_dir`, and applies all ops atomically:
///
/// 1. A `recovery.json` marker is written, naming every path this commit
///    is about to touch.
/// 2. Every `modified_files`/`created_files` entry is read from
///    `files/<path>` and staged as a modify/create.
/// 3. Every `deleted_files` entry is staged as a delete.
/// 4. `apply_all` runs; on any failure the transaction rolls itself back
///    and this function returns [`WorkspaceError::ConflictAtCommit`]
///    with the workspace left `ACTIVE` and its tracking maps untouched,
///    so the caller may retry or discard.
/// 5. On success the transaction commits, the workspace is marked
///    `COMMITTED`, its `(plan, branch)` reference is unregistered, and
///    the marker is removed. `files/` itself is left on disk for a
///    later cleanup pass to reap.
pub fn commit_workspace(workspace: &mut Workspace) -> Result<()> {
    if workspace.state != WorkspaceState::Active {
        return Err(WorkspaceError::InvalidState {
            id: workspace.id,
            expected: "ACTIVE",
            actual: state_name(workspace.state),
        });
    }
    if workspace.has_no_changes() {
        workspace.state = WorkspaceState::Committed;
        workspace.updated_at = now_micros();
        persist(workspace)?;
        paths::unregister(&workspace.base_dir, workspace.plan, &workspace.branch)?;
        return Ok(());
    }

    let mut pending_paths: Vec<String> = workspace.created_files.keys().cloned().collect();
    pending_paths.extend(workspace.modified_files.keys().cloned());
    pending_paths.extend(workspace.deleted_files.iter().cloned());
    let marker = RecoveryMarker::new(
        workspace.id.to_string(),
        RiskyOp::Commit,
        pending_paths,
    );
    marker.write(&workspace.recovery_marker_path())?;

    match run_commit(workspace) {
        Ok(()) => {
            workspace.state = WorkspaceState::Committed;
            workspace.updated_at = now_micros();
            persist(workspace)?;
            paths::unregister(&workspace.base_dir, workspace.plan, &workspace.branch)?;
            RecoveryMarker::remove(&workspace.recovery_marker_path())?;
            tracing::info!(workspace = %workspace.id, "workspace committed");
            Ok(())
        }
        Err(source) => {
            // Transaction rolled itself back; tracking maps describe
            // exactly what is still staged. Workspace stays ACTIVE so a
            // caller can retry the commit or discard outright.
            tracing::warn!(workspace = %workspace.id, error = %source, "workspace commit failed, left ACTIVE");
            Err(WorkspaceError::ConflictAtCommit {
                id: workspace.id,
                source,
            })
        }
    }
}

fn run_commit(workspace: &Workspace) -> std::result::Result<(), plandex_durability::TransactionError> {
    let files_dir = workspace.files_dir();
    let mut tx = FileTransaction::begin(&workspace.base_dir)?;

    for path in workspace.created_files.keys() {
        let abs = files_dir.join(path);
        let content = fs::read(&abs).map_err(|e| CoreError::io(&abs, e))?;
        tx.create_file(path, content)?;
    }
    for path in workspace.modified_files.keys() {
        let abs = files_dir.join(path);
        let content = fs::read(&abs).map_err(|e| CoreError::io(&abs, e))?;
        tx.modify_file(path, content)?;
    }
    for path in &workspace.deleted_files {
        tx.delete_file(path)?;
    }

    tx.apply_all()?;
    tx.commit()?;
    Ok(())
}

fn persist(ws: &Workspace) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(ws).map_err(CoreError::Serialization)?;
    plandex_core_types::atomic_write(&ws.record_path(), &bytes, 0o644)?;
    Ok(())
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
