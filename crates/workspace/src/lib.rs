//! Copy-on-write sandbox per `(plan, branch)`: AI-proposed edits are
//! staged here and never touch the real project until an explicit
//! commit, driven through a [`plandex_durability::FileTransaction`].
//!
//! ```no_run
//! use plandex_core_types::{BranchName, CoreConfig, PlanId};
//! use plandex_workspace::{commit_workspace, StagedChanges, WorkspaceManager};
//!
//! let config = CoreConfig::new("/path/to/project");
//! let manager = WorkspaceManager::new(config);
//! let mut ws = manager.get_or_create(PlanId::new(), BranchName::root(), "proj-1").unwrap();
//! manager.activate(&mut ws).unwrap();
//! manager
//!     .stage_changes(
//!         &mut ws,
//!         StagedChanges::default().with_create("docs/a.md", b"hello".to_vec()),
//!     )
//!     .unwrap();
//! commit_workspace(&mut ws).unwrap();
//! ```

#![warn(clippy::all)]

mod commit;
mod error;
mod model;
mod paths;
mod recovery_marker;
mod workspace;

pub use commit::commit_workspace;
pub use error::{Result, WorkspaceError};
pub use model::{CreatedEntry, ModifiedEntry, Workspace, WorkspaceState};
pub use recovery_marker::{RecoveryMarker, RiskyOp};
pub use workspace::{StagedChanges, WorkspaceManager};
