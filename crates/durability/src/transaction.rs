//! Stage → apply-sequentially → commit-or-rollback transaction over a set
//! of paths under a base directory.

use std::fs;
use std::path::{Path, PathBuf};

use plandex_core_types::{atomic_write, Error as CoreError, TxnId};

use crate::error::{Result, TransactionError};
use crate::op::{FileOpKind, FileOperation, OpStatus};
use crate::snapshot::SnapshotStore;
use crate::wal::{self, WalKind, WalWriter};

/// Lifecycle state of a [`FileTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Constructed but not yet begun (not directly observable — `begin`
    /// performs the `INIT -> STAGING` transition in one call).
    Init,
    /// Accepting `create_file`/`modify_file`/`delete_file` calls.
    Staging,
    /// `apply_next`/`apply_all` is running.
    Applying,
    /// Every op is `APPLIED`; snapshots and WAL have been removed.
    Committed,
    /// Every previously `APPLIED` op has been restored; sticky — a
    /// rolled-back transaction may never be committed.
    RolledBack,
}

impl TxnState {
    fn name(self) -> &'static str {
        match self {
            TxnState::Init => "INIT",
            TxnState::Staging => "STAGING",
            TxnState::Applying => "APPLYING",
            TxnState::Committed => "COMMITTED",
            TxnState::RolledBack => "ROLLED_BACK",
        }
    }
}

/// A staged set of file create/modify/delete operations applied
/// sequentially against `base_dir`, with all-or-nothing guarantees.
///
/// Only one transaction at a time may target a given base directory —
/// enforced externally by the operation queue's WRITE lock, not by this
/// type.
pub struct FileTransaction {
    id: TxnId,
    base_dir: PathBuf,
    state: TxnState,
    ops: Vec<FileOperation>,
    snapshots: SnapshotStore,
    wal: WalWriter,
    next_seq: u64,
    apply_cursor: usize,
}

impl FileTransaction {
    /// Canonicalize `base_dir` once (so relative paths resolve
    /// consistently even if the process's cwd changes mid-transaction),
    /// open or create the transaction's WAL and snapshot directories
    /// under `<base-dir>/.plandex/…`, and write the `BEGIN` record.
    pub fn begin(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| CoreError::io(&base_dir, e))?;
        let base_dir = base_dir
            .canonicalize()
            .map_err(|e| CoreError::io(&base_dir, e))?;
        let id = TxnId::new();
        let tx_root = base_dir.join(".plandex");
        let wal_dir = tx_root.join("wal");
        let snapshot_dir = tx_root.join("snapshots").join(id.to_string());

        let mut wal = WalWriter::create(&wal_dir, id)?;
        wal.append(WalKind::Begin, None, None, true)?;
        let snapshots = SnapshotStore::open(&snapshot_dir)?;

        Ok(Self {
            id,
            base_dir,
            state: TxnState::Staging,
            ops: Vec::new(),
            snapshots,
            wal,
            next_seq: 0,
            apply_cursor: 0,
        })
    }

    /// This transaction's id.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Canonicalized base directory this transaction targets.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// The staged operations, in sequence order.
    pub fn operations(&self) -> &[FileOperation] {
        &self.ops
    }

    fn require_state(&self, expected: TxnState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TransactionError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }

    fn abs_path(&self, relpath: &Path) -> PathBuf {
        self.base_dir.join(relpath)
    }

    fn stage(&mut self, kind: FileOpKind, relpath: PathBuf, content: Option<Vec<u8>>) -> Result<()> {
        self.require_state(TxnState::Staging)?;
        let abs = self.abs_path(&relpath);
        self.snapshots.capture(&abs).map_err(|e| {
            TransactionError::staging(relpath.clone(), format!("snapshot capture failed: {e}"))
        })?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.wal.append(
            WalKind::Stage,
            Some(kind),
            Some(relpath.to_string_lossy().into_owned()),
            false,
        )?;
        self.ops.push(FileOperation {
            seq,
            kind,
            path: relpath,
            content,
            status: OpStatus::Pending,
        });
        Ok(())
    }

    /// Stage a file creation. Content is opaque to the transaction; any
    /// normalization is the caller's responsibility.
    pub fn create_file(&mut self, relpath: impl Into<PathBuf>, content: Vec<u8>) -> Result<()> {
        self.stage(FileOpKind::Create, relpath.into(), Some(content))
    }

    /// Stage a file modification.
    pub fn modify_file(&mut self, relpath: impl Into<PathBuf>, content: Vec<u8>) -> Result<()> {
        self.stage(FileOpKind::Modify, relpath.into(), Some(content))
    }

    /// Stage a file deletion. Staging against a missing file is allowed.
    pub fn delete_file(&mut self, relpath: impl Into<PathBuf>) -> Result<()> {
        self.stage(FileOpKind::Delete, relpath.into(), None)
    }

    fn write_one(op: &FileOperation, abs: &Path) -> std::result::Result<(), std::io::Error> {
        match op.kind {
            FileOpKind::Create | FileOpKind::Modify => {
                let content = op.content.as_deref().unwrap_or(&[]);
                atomic_write(abs, content, plandex_core_types::DEFAULT_FILE_MODE)
                    .map_err(io_from_core)?;
            }
            FileOpKind::Delete => {
                if abs.exists() {
                    fs::remove_file(abs)?;
                }
            }
        }
        Ok(())
    }

    fn apply_at(&mut self, index: usize) -> Result<()> {
        let abs = self.abs_path(&self.ops[index].path.clone());
        let result = Self::write_one(&self.ops[index], &abs);
        match result {
            Ok(()) => {
                self.ops[index].status = OpStatus::Applied;
                let (kind, path) = {
                    let op = &self.ops[index];
                    (op.kind, op.path.to_string_lossy().into_owned())
                };
                self.wal
                    .append(WalKind::Applied, Some(kind), Some(path), false)?;
                Ok(())
            }
            Err(source) => {
                self.ops[index].status = OpStatus::Failed;
                Err(TransactionError::Apply {
                    path: self.ops[index].path.clone(),
                    source,
                })
            }
        }
    }

    /// Apply the next `PENDING` op. Returns `Ok(None)` once no pending
    /// ops remain. On failure the op becomes `FAILED` and the error is
    /// returned without advancing the cursor.
    pub fn apply_next(&mut self) -> Result<Option<FileOperation>> {
        if self.state == TxnState::Staging {
            self.state = TxnState::Applying;
        }
        self.require_state(TxnState::Applying)?;
        while self.apply_cursor < self.ops.len() {
            let idx = self.apply_cursor;
            if self.ops[idx].status != OpStatus::Pending {
                self.apply_cursor += 1;
                continue;
            }
            self.apply_at(idx)?;
            self.apply_cursor += 1;
            return Ok(Some(self.ops[idx].clone()));
        }
        Ok(None)
    }

    /// Repeatedly call [`Self::apply_next`]; on the first error, roll
    /// back and return that error.
    pub fn apply_all(&mut self) -> Result<()> {
        self.apply_all_with_progress(|_, _, _| {})
    }

    /// Like [`Self::apply_all`], invoking `callback(&op, current_index,
    /// total)` synchronously *before* each write.
    pub fn apply_all_with_progress(
        &mut self,
        mut callback: impl FnMut(&FileOperation, usize, usize),
    ) -> Result<()> {
        if self.state == TxnState::Staging {
            self.state = TxnState::Applying;
        }
        self.require_state(TxnState::Applying)?;
        let total = self.ops.len();
        loop {
            let idx = self.apply_cursor;
            if idx >= self.ops.len() {
                break;
            }
            if self.ops[idx].status != OpStatus::Pending {
                self.apply_cursor += 1;
                continue;
            }
            callback(&self.ops[idx], idx, total);
            if let Err(e) = self.apply_at(idx) {
                let _ = self.rollback(format!("apply failed: {e}"));
                return Err(e);
            }
            self.apply_cursor += 1;
        }
        Ok(())
    }

    /// Commit: requires every op `APPLIED` (no `PENDING`, no `FAILED`).
    /// Writes the `COMMIT` record, fsyncs, then removes the snapshot
    /// directory and WAL.
    pub fn commit(&mut self) -> Result<()> {
        if self.state != TxnState::Applying && self.state != TxnState::Staging {
            return Err(TransactionError::InvalidState {
                expected: "APPLYING",
                actual: self.state.name(),
            });
        }
        if let Some(bad) = self
            .ops
            .iter()
            .find(|op| op.status != OpStatus::Applied)
        {
            return Err(TransactionError::InvalidState {
                expected: "all ops APPLIED",
                actual: match bad.status {
                    OpStatus::Pending => "some op PENDING",
                    OpStatus::Failed => "some op FAILED",
                    OpStatus::RolledBack => "some op ROLLED_BACK",
                    OpStatus::Applied => unreachable!(),
                },
            });
        }
        self.wal.append(WalKind::Commit, None, None, true)?;
        self.snapshots.remove_all()?;
        wal::remove(self.wal.path())?;
        self.state = TxnState::Committed;
        tracing::info!(tx = %self.id, ops = self.ops.len(), "transaction committed");
        Ok(())
    }

    /// Roll back: restore every `APPLIED` op in reverse sequence order.
    /// Continues past individual restore errors so a partial restore is
    /// better than a stopped one; the aggregate error is returned but the
    /// transaction becomes `ROLLED_BACK` regardless.
    pub fn rollback(&mut self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        tracing::warn!(tx = %self.id, %reason, "rolling back transaction");
        let mut errors = Vec::new();
        let mut applied_indices: Vec<usize> = self
            .ops
            .iter()
            .enumerate()
            .filter(|(_, op)| op.status == OpStatus::Applied)
            .map(|(i, _)| i)
            .collect();
        applied_indices.sort_by_key(|&i| std::cmp::Reverse(self.ops[i].seq));

        for idx in applied_indices {
            let abs = self.abs_path(&self.ops[idx].path.clone());
            match self.snapshots.restore(&abs) {
                Ok(()) => self.ops[idx].status = OpStatus::RolledBack,
                Err(e) => errors.push(format!("{}: {e}", self.ops[idx].path.display())),
            }
        }
        self.wal.append(WalKind::Rollback, None, None, true)?;
        self.snapshots.remove_all()?;
        wal::remove(self.wal.path())?;
        self.state = TxnState::RolledBack;

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TransactionError::Rollback { errors })
        }
    }
}

fn io_from_core(e: CoreError) -> std::io::Error {
    match e {
        CoreError::Io { source, .. } => source,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn s1_atomic_success() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"orig-a").unwrap();
        fs::write(dir.path().join("b.txt"), b"orig-b").unwrap();

        let mut tx = FileTransaction::begin(dir.path()).unwrap();
        tx.modify_file("a.txt", b"mod-a".to_vec()).unwrap();
        tx.create_file("c.txt", b"new-c".to_vec()).unwrap();
        tx.apply_all().unwrap();
        tx.commit().unwrap();

        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"mod-a");
        assert_eq!(fs::read(dir.path().join("b.txt")).unwrap(), b"orig-b");
        assert_eq!(fs::read(dir.path().join("c.txt")).unwrap(), b"new-c");
        let wal_dir = dir.path().join(".plandex/wal");
        assert_eq!(fs::read_dir(&wal_dir).unwrap().count(), 0);
        let snapshots_dir = dir.path().join(".plandex/snapshots");
        assert!(!snapshots_dir.exists() || fs::read_dir(&snapshots_dir).unwrap().count() == 0);
    }

    #[test]
    fn s2_atomic_rollback_on_write_failure() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f1.txt"), b"o1").unwrap();
        fs::write(dir.path().join("f2.txt"), b"o2").unwrap();
        fs::write(dir.path().join("f3.txt"), b"o3").unwrap();
        let ro_dir = dir.path().join("ro");
        fs::create_dir(&ro_dir).unwrap();

        let mut tx = FileTransaction::begin(dir.path()).unwrap();
        tx.modify_file("f1.txt", b"m1".to_vec()).unwrap();
        tx.modify_file("f2.txt", b"m2".to_vec()).unwrap();
        tx.modify_file("f3.txt", b"m3".to_vec()).unwrap();
        tx.create_file("ro/x.txt", b"x".to_vec()).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&ro_dir, fs::Permissions::from_mode(0o500)).unwrap();
            let result = tx.apply_all();
            // restore perms before assertions so tempdir cleanup succeeds
            fs::set_permissions(&ro_dir, fs::Permissions::from_mode(0o700)).unwrap();
            assert!(result.is_err());
            assert_eq!(fs::read(dir.path().join("f1.txt")).unwrap(), b"o1");
            assert_eq!(fs::read(dir.path().join("f2.txt")).unwrap(), b"o2");
            assert_eq!(fs::read(dir.path().join("f3.txt")).unwrap(), b"o3");
            assert!(!dir.path().join("ro/x.txt").exists());
            assert_eq!(tx.state(), TxnState::RolledBack);
        }
    }

    #[test]
    fn idempotent_delete_of_absent_path_commits_cleanly() {
        let dir = tempdir().unwrap();
        let mut tx = FileTransaction::begin(dir.path()).unwrap();
        tx.delete_file("never-existed.txt").unwrap();
        tx.apply_all().unwrap();
        tx.commit().unwrap();
        assert!(!dir.path().join("never-existed.txt").exists());
    }

    #[test]
    fn rolled_back_transaction_cannot_be_committed() {
        let dir = tempdir().unwrap();
        let mut tx = FileTransaction::begin(dir.path()).unwrap();
        tx.create_file("a.txt", b"a".to_vec()).unwrap();
        tx.apply_all().unwrap();
        tx.rollback("test").unwrap();
        let err = tx.commit().unwrap_err();
        assert!(matches!(err, TransactionError::InvalidState { .. }));
    }
}
