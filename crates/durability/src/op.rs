//! A single staged file operation inside a [`crate::FileTransaction`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The kind of change a [`FileOperation`] makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOpKind {
    /// Create a file that must not already exist in the target tree in a
    /// meaningful way (the apply step tolerates one already being
    /// there — it is simply overwritten, matching `ModifyFile`'s write).
    Create,
    /// Overwrite an existing (or not-yet-existing) file's content.
    Modify,
    /// Remove a file. Idempotent: staging or applying against an absent
    /// path is not an error.
    Delete,
}

/// Lifecycle of a single [`FileOperation`] within its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpStatus {
    /// Staged, not yet applied.
    Pending,
    /// Applied to the target directory.
    Applied,
    /// Apply attempt failed; the op did not advance.
    Failed,
    /// Reverted against its snapshot during rollback.
    RolledBack,
}

/// One staged create/modify/delete. `seq` is strictly monotonic within a
/// transaction and is the rollback order key (reverse).
#[derive(Debug, Clone)]
pub struct FileOperation {
    /// Monotonic sequence number, assigned at staging time.
    pub seq: u64,
    /// What kind of change this is.
    pub kind: FileOpKind,
    /// Path relative to the transaction's base directory.
    pub path: PathBuf,
    /// New content for `Create`/`Modify`; `None` for `Delete`.
    pub content: Option<Vec<u8>>,
    /// Current lifecycle state.
    pub status: OpStatus,
}
