//! Per-repository operation queue: a fair reader/writer scheduler with
//! locking, batching, retry, and stale-lock recovery.
//!
//! The [`RepoQueue`] is the entry point. It owns a [`LockRegistry`]
//! (durable record of active locks per `(plan, branch, scope)`) and,
//! lazily, one dispatcher thread per plan that drains a FIFO of
//! [`LockRequest`]-bearing closures, batching consecutive compatible
//! operations so unrelated branches never wait on each other.
//!
//! ```no_run
//! use plandex_concurrency::{LockRequest, LockReason, OperationContext, RepoQueue};
//! use plandex_core_types::{CancellationToken, BranchName, CoreConfig, PlanId};
//!
//! let queue = RepoQueue::new(CoreConfig::new("/repo"));
//! let plan = PlanId::new();
//! let result = queue.submit(
//!     plan,
//!     LockRequest::write(BranchName::root(), LockReason::Commit),
//!     OperationContext::new(CancellationToken::new()),
//!     "session-1",
//!     || "applied",
//! );
//! assert!(result.is_ok());
//! ```

#![warn(clippy::all)]

mod error;
mod heartbeat;
mod lock_registry;
mod manager;
mod operation;
mod queue;
mod reason;
mod retry;

pub use error::{QueueError, Result};
pub use lock_registry::{LockRegistry, LockSnapshot};
pub use manager::{Reaper, RepoQueue};
pub use operation::{LockRequest, OperationContext};
pub use reason::LockReason;
