//! Base error taxonomy shared by every crate in the workspace.
//!
//! Each downstream crate defines its own `thiserror` enum for its own
//! concerns (lock conflicts, WAL corruption, workspace state) and converts
//! into or wraps this one at its boundary.

use std::io;
use std::path::PathBuf;

/// Convenience alias for this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors common to every layer of the stack: I/O, serialization, and
/// the handful of failure modes that don't belong to any one subsystem.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem operation failed.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path the operation was performed against.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// JSON encode/decode failure (config, WAL records, sidecar metadata).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A path escapes the project root / workspace root it was resolved
    /// against.
    #[error("path {path} is outside of root {root}")]
    PathEscapesRoot {
        /// The offending path.
        path: PathBuf,
        /// The root it was checked against.
        root: PathBuf,
    },

    /// An operation was asked to act on something that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration value outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal invariant violated. These indicate a bug, not a normal
    /// operating condition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an [`Error::Io`] tagged with the path that was being operated
    /// on, so callers never have to guess which path an `io::Error` refers
    /// to.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True if retrying the same operation unchanged has a chance of
    /// succeeding (transient I/O, not a logic or data error).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_carries_path() {
        let err = Error::io("/tmp/missing", io::Error::new(io::ErrorKind::NotFound, "nope"));
        match &err {
            Error::Io { path, .. } => assert_eq!(path, std::path::Path::new("/tmp/missing")),
            _ => panic!("expected Io variant"),
        }
        assert!(err.is_retryable());
    }

    #[test]
    fn non_io_errors_are_not_retryable() {
        assert!(!Error::NotFound("x".into()).is_retryable());
        assert!(!Error::Internal("bug".into()).is_retryable());
    }
}
