//! Error taxonomy for the lock registry and operation queue.

use plandex_core_types::{BranchName, LockId, PlanId, Scope};

/// Convenience alias.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Failure modes surfaced by [`crate::RepoQueue`] and [`crate::LockRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A lock record referenced by id no longer exists (already released
    /// or reaped).
    #[error("lock {0} not found")]
    LockNotFound(LockId),

    /// The caller's cancellation token fired while queued or while
    /// waiting for a conflicting lock to clear.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation's `OperationContext` deadline passed before a lock
    /// could be acquired. Distinct from `LockExhausted`: this can fire
    /// on the very first attempt, before any retry budget is spent.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// Lock acquisition exhausted its retry budget. Carries enough
    /// context for an operator to find and, if appropriate, clear the
    /// conflicting lock by hand.
    #[error(
        "lock exhausted after {attempts} attempts: plan={plan} branch={branch} scope={scope} \
         held-for={held_for_secs}s reason={reason}"
    )]
    LockExhausted {
        /// Plan that could not acquire its lock.
        plan: PlanId,
        /// Branch the lock was requested on.
        branch: BranchName,
        /// Scope that was requested.
        scope: Scope,
        /// How long the conflicting lock has been held, in seconds.
        held_for_secs: u64,
        /// The conflicting lock's recorded reason.
        reason: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The dispatcher thread for a plan terminated before completing a
    /// queued operation (e.g. a panic inside the operation's closure).
    #[error("internal error: {0}")]
    Internal(String),

    /// Propagated from the shared core crate (I/O, serialization, path
    /// validation).
    #[error(transparent)]
    Core(#[from] plandex_core_types::Error),
}

impl QueueError {
    /// True for conflicts an operator could resolve by waiting or
    /// clearing a stale lock.
    pub fn is_conflict(&self) -> bool {
        matches!(self, QueueError::LockExhausted { .. })
    }

    /// True if simply resubmitting the same operation later has a chance
    /// of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::LockExhausted { .. })
    }
}
