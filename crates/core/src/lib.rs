//! Shared types for the plandex-core concurrency/durability/workspace stack.
//!
//! This crate defines the vocabulary every other crate in the workspace
//! builds on:
//! - [`PlanId`], [`BranchName`], [`Scope`]: the `(P, B, S)` lock key from
//!   the data model.
//! - [`Error`]/[`Result`]: the base error type, extended by each
//!   downstream crate with its own variants.
//! - [`CoreConfig`]: every tunable the embedding process may override
//!   (stale-lock threshold, heartbeat interval, retry parameters,
//!   workspace cleanup policy).
//! - [`CancellationToken`]: the cooperative-cancellation primitive shared
//!   by the Operation Queue and the File Transaction engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod fs;
pub mod ids;
pub mod time;

pub use cancel::CancellationToken;
pub use config::{CoreConfig, RetryConfig, WorkspaceCleanupPolicy};
pub use error::{Error, Result};
pub use fs::{atomic_write, file_mode, DEFAULT_FILE_MODE};
pub use ids::{BranchName, LockId, OperationId, PlanId, Scope, TxnId, WorkspaceId};
pub use time::now_micros;
