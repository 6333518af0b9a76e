//! Facade-level error type: a thin union over the three subsystem error
//! enums, so a caller holding any one subsystem's error can `?`-propagate
//! through a function returning this one without manual matching.

/// Convenience alias for this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Everything [`crate::PlandexCore`] can fail with. Each variant wraps
/// one subsystem's own error type unchanged, so callers who only care
/// about one subsystem can match through to it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation queue / lock registry failure.
    #[error(transparent)]
    Queue(#[from] plandex_concurrency::QueueError),

    /// File transaction engine failure (surfaced directly only from
    /// [`crate::PlandexCore::recover_on_startup`]; workspace operations
    /// surface transaction failures wrapped in [`Error::Workspace`]).
    #[error(transparent)]
    Transaction(#[from] plandex_durability::TransactionError),

    /// Workspace isolation / commit failure.
    #[error(transparent)]
    Workspace(#[from] plandex_workspace::WorkspaceError),

    /// Propagated from the shared core crate (I/O, serialization, path
    /// validation).
    #[error(transparent)]
    Core(#[from] plandex_core_types::Error),
}

impl Error {
    /// True for failures a caller could resolve by retrying later
    /// (lock contention, a commit conflict) rather than by fixing a bug
    /// or escalating to an operator.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Queue(e) => e.is_retryable(),
            Error::Transaction(e) => e.is_retryable(),
            Error::Workspace(e) => e.is_retryable(),
            Error::Core(e) => e.is_retryable(),
        }
    }

    /// True for failures that require operator intervention (a
    /// recovery marker, an exhausted rollback) rather than a transparent
    /// retry or a user-facing message.
    pub fn is_serious(&self) -> bool {
        match self {
            Error::Queue(_) => false,
            Error::Transaction(e) => e.is_serious(),
            Error::Workspace(e) => e.is_serious(),
            Error::Core(_) => false,
        }
    }
}
