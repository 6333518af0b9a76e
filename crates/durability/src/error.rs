//! Error taxonomy for the file transaction engine.

use std::path::PathBuf;

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TransactionError>;

/// Failure modes surfaced by [`crate::FileTransaction`] and
/// [`crate::snapshot::SnapshotStore`].
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Capturing a snapshot, or recording a WAL entry, failed before any
    /// write happened. Terminal for this transaction.
    #[error("staging failed for {path}: {reason}")]
    Staging {
        /// Path being staged when the failure occurred.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A file write failed mid-transaction. Always triggers a rollback
    /// attempt; this variant carries only the original apply failure,
    /// the rollback outcome (if it also failed) is reported separately
    /// via [`TransactionError::Rollback`].
    #[error("apply failed for {path}: {source}")]
    Apply {
        /// Path the failing op targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// One or more restores failed during rollback. The transaction is
    /// still considered `ROLLED_BACK`; this is reported, non-fatal to the
    /// process, but the caller should surface it to an operator.
    #[error("rollback had {} error(s): {}", .errors.len(), .errors.join("; "))]
    Rollback {
        /// One message per path whose restore failed.
        errors: Vec<String>,
    },

    /// The transaction was asked to do something invalid for its current
    /// state (e.g. `Commit` before every op is `APPLIED`, or `Commit`
    /// after `Rollback`).
    #[error("invalid transaction state: expected {expected}, was {actual}")]
    InvalidState {
        /// State the operation required.
        expected: &'static str,
        /// State the transaction was actually in.
        actual: &'static str,
    },

    /// A base directory was found in an interrupted state on load (a WAL
    /// without a trailing `COMMIT`). The caller must run
    /// [`crate::recover_base_dir`] before reusing it.
    #[error("recovery required for {base_dir}: {reason}")]
    RecoveryRequired {
        /// Directory the interrupted transaction targeted.
        base_dir: PathBuf,
        /// Human-readable description of what was found.
        reason: String,
    },

    /// Propagated from the shared core crate (I/O, serialization, path
    /// validation).
    #[error(transparent)]
    Core(#[from] plandex_core_types::Error),
}

impl TransactionError {
    /// Build a [`TransactionError::Staging`] for `path`.
    pub fn staging(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TransactionError::Staging {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True if the transaction is still internally consistent and a
    /// caller could reasonably retry the whole operation from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransactionError::Apply { .. })
    }

    /// True for failures that leave disk state requiring operator
    /// attention rather than a transparent retry.
    pub fn is_serious(&self) -> bool {
        matches!(
            self,
            TransactionError::Rollback { .. } | TransactionError::RecoveryRequired { .. }
        )
    }
}
