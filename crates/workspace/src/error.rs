//! Error taxonomy for workspace isolation and commit.

use plandex_core_types::WorkspaceId;

/// Convenience alias.
pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Failure modes surfaced by [`crate::WorkspaceManager`] and
/// [`crate::commit_workspace`].
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// No workspace is registered under the requested id.
    #[error("workspace {0} not found")]
    NotFound(WorkspaceId),

    /// The workspace was not in the state an operation required (e.g.
    /// `Commit` on a `DISCARDED` workspace).
    #[error("workspace {id} is {actual}, expected {expected}")]
    InvalidState {
        /// Workspace the caller was operating on.
        id: WorkspaceId,
        /// State the operation required.
        expected: &'static str,
        /// State the workspace was actually in.
        actual: &'static str,
    },

    /// A `recovery.json` marker was found on load; the workspace is
    /// `RECOVERING` and read-only until explicit user intervention.
    #[error("workspace {id} requires recovery: {reason}")]
    RecoveryRequired {
        /// The affected workspace.
        id: WorkspaceId,
        /// What the marker indicated was interrupted.
        reason: String,
    },

    /// The underlying commit transaction failed; the workspace is left
    /// `ACTIVE` with its tracking maps untouched, so the caller may
    /// retry or discard.
    #[error("commit of workspace {id} failed, workspace left ACTIVE: {source}")]
    ConflictAtCommit {
        /// The workspace whose commit failed.
        id: WorkspaceId,
        /// Underlying transaction failure.
        #[source]
        source: plandex_durability::TransactionError,
    },

    /// No named checkpoint exists under that name.
    #[error("checkpoint {0:?} not found")]
    CheckpointNotFound(String),

    /// Propagated from the file transaction engine for everything other
    /// than a commit-time conflict (staging or snapshot failures while
    /// writing into the workspace's own `files/` tree).
    #[error(transparent)]
    Transaction(#[from] plandex_durability::TransactionError),

    /// Propagated from the shared core crate (I/O, serialization, path
    /// validation).
    #[error(transparent)]
    Core(#[from] plandex_core_types::Error),
}

impl WorkspaceError {
    /// True for failures that leave the workspace exactly as it was
    /// before the call, so the caller may safely retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkspaceError::ConflictAtCommit { .. })
    }

    /// True for failures that require a human (or the operational
    /// interface) to intervene before the workspace can be used again.
    pub fn is_serious(&self) -> bool {
        matches!(self, WorkspaceError::RecoveryRequired { .. })
    }
}
