//! File transaction engine: the only path through which files in either
//! the user's real project or a workspace's files directory are ever
//! mutated.
//!
//! A [`FileTransaction`] stages a set of create/modify/delete operations,
//! captures a pre-write [`snapshot::SnapshotStore`] entry for every path
//! it touches, applies them sequentially, and either commits (discarding
//! the snapshots and WAL) or rolls back to the pre-`begin` state. The
//! on-disk WAL lets [`recovery::recover_base_dir`] finish or undo an
//! interrupted transaction after a crash.
//!
//! ```no_run
//! use plandex_durability::FileTransaction;
//!
//! let mut tx = FileTransaction::begin("/path/to/project").unwrap();
//! tx.modify_file("a.txt", b"new content".to_vec()).unwrap();
//! tx.create_file("b.txt", b"brand new".to_vec()).unwrap();
//! tx.apply_all().unwrap();
//! tx.commit().unwrap();
//! ```

#![warn(clippy::all)]

mod error;
mod op;
pub mod recovery;
pub mod snapshot;
mod transaction;
mod wal;

pub use error::{Result, TransactionError};
pub use op::{FileOpKind, FileOperation, OpStatus};
pub use recovery::{recover_base_dir, RecoveryAction};
pub use snapshot::SnapshotStore;
pub use transaction::{FileTransaction, TxnState};
pub use wal::{WalKind, WalRecord};
