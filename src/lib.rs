//! # plandex-core
//!
//! Concurrency and durability machinery for a multi-user AI coding
//! assistant server: a per-repository operation queue that serializes
//! conflicting branch writes, a crash-safe file transaction engine, and
//! copy-on-write workspace isolation so in-flight AI edits never touch a
//! user's real files until an explicit commit.
//!
//! Three components, re-exported from their own crates and wired
//! together behind [`PlandexCore`], the single entry point an embedding
//! process constructs:
//!
//! - [`plandex_concurrency`]: lock registry and operation queue (`A`/`B`
//!   in the system overview).
//! - [`plandex_durability`]: snapshot store and file transaction engine
//!   (`C`/`D`).
//! - [`plandex_workspace`]: per-`(plan, branch)` workspace and commit
//!   driver (`E`/`F`).
//!
//! Internal layering (which crate calls which) is not part of the public
//! surface; only the re-exports below and [`PlandexCore`] are stable.
//!
//! ```no_run
//! use plandex_core::{CoreConfig, PlandexCore};
//!
//! let config = CoreConfig::new("/path/to/project");
//! let core = PlandexCore::open(config).unwrap();
//! let locks = core.list_locks(None);
//! assert!(locks.is_empty());
//! ```

#![warn(clippy::all)]

mod error;
mod facade;

pub use error::{Error, Result};
pub use facade::{PlandexCore, StartupRecovery, WorkspaceDiff};

pub use plandex_concurrency::{
    LockReason, LockRequest, LockSnapshot, OperationContext, QueueError, Reaper,
};
pub use plandex_core_types::{
    BranchName, CancellationToken, CoreConfig, PlanId, RetryConfig, Scope, TxnId,
    WorkspaceCleanupPolicy, WorkspaceId,
};
pub use plandex_durability::RecoveryAction;
pub use plandex_workspace::{
    CreatedEntry, ModifiedEntry, StagedChanges, Workspace, WorkspaceError, WorkspaceState,
};
