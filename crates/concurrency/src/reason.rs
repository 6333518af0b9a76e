//! Human-readable reasons attached to lock records, surfaced back to
//! operators via `ListLocks` and lock-exhaustion diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a caller is requesting a lock. Purely diagnostic — never affects
/// conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockReason {
    /// A file inside the plan's branch is being created, modified, or
    /// deleted.
    FileEdit {
        /// Path relative to the workspace root.
        path: String,
    },
    /// The plan's state is being synchronized with its parent.
    PlanSync,
    /// A workspace commit/discard is in flight.
    Commit,
    /// A branch rebase against an updated parent is in flight.
    Rebase,
    /// Anything not covered by the above.
    Other(String),
}

impl LockReason {
    /// Build a [`LockReason::FileEdit`].
    pub fn file_edit(path: impl Into<String>) -> Self {
        LockReason::FileEdit { path: path.into() }
    }

    /// Build a [`LockReason::Other`].
    pub fn other(msg: impl Into<String>) -> Self {
        LockReason::Other(msg.into())
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockReason::FileEdit { path } => write!(f, "file-edit({path})"),
            LockReason::PlanSync => write!(f, "plan-sync"),
            LockReason::Commit => write!(f, "commit"),
            LockReason::Rebase => write!(f, "rebase"),
            LockReason::Other(msg) => write!(f, "other({msg})"),
        }
    }
}
