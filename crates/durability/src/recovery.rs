//! Crash recovery: on startup, finish or undo any transaction whose WAL
//! lacks a trailing `COMMIT` record.
//!
//! Procedure:
//! 1. Read the WAL tail.
//! 2. If the last record is `APPLIED` or `STAGE`, replay (restore)
//!    snapshots for every `APPLIED` op in reverse order, then delete
//!    snapshots + WAL.
//! 3. If the last record is `ROLLBACK` without completion, re-run
//!    restores for any `APPLIED` ops still present, then delete the WAL.
//! 4. If the last record is `COMMIT` with residual snapshots, just
//!    delete snapshots + WAL (the prior shutdown died after commit but
//!    before cleanup).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use plandex_core_types::{Error as CoreError, TxnId};

use crate::error::Result;
use crate::snapshot::SnapshotStore;
use crate::wal::{self, WalKind};

/// What [`recover_base_dir`] did for a given interrupted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// No WAL found, or the WAL was empty; nothing to do.
    NoneFound,
    /// Applied ops were restored to their pre-transaction content.
    RestoredToPreBegin,
    /// A partially completed rollback was finished.
    RollbackCompleted,
    /// A committed transaction's leftover snapshots/WAL were cleaned up.
    CleanedAfterCommit,
}

/// Scan `base_dir/.plandex/wal` for interrupted transactions and recover
/// each one. Returns one [`RecoveryAction`] per WAL file found (in
/// arbitrary order); an empty vec means nothing needed recovery.
///
/// Canonicalizes `base_dir` first, mirroring `FileTransaction::begin`
/// (transaction.rs) — snapshots are keyed by a digest of the *canonical*
/// absolute path, so recovering against a non-canonical `base_dir` (a
/// symlinked project/home directory, a path containing `..`) would never
/// find the snapshots the original transaction wrote.
pub fn recover_base_dir(base_dir: &Path) -> Result<Vec<(TxnId, RecoveryAction)>> {
    if !base_dir.exists() {
        return Ok(Vec::new());
    }
    let base_dir = base_dir
        .canonicalize()
        .map_err(|e| CoreError::io(base_dir, e))?;
    let wal_dir = base_dir.join(".plandex").join("wal");
    if !wal_dir.exists() {
        return Ok(Vec::new());
    }
    let mut results = Vec::new();
    for entry in fs::read_dir(&wal_dir).map_err(|e| CoreError::io(&wal_dir, e))? {
        let entry = entry.map_err(|e| CoreError::io(&wal_dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(uuid) = uuid::Uuid::parse_str(stem) else {
            continue;
        };
        let tx_id = TxnId::from_uuid(uuid);
        let action = recover_one(&base_dir, &wal_dir, tx_id)?;
        results.push((tx_id, action));
    }
    Ok(results)
}

fn recover_one(base_dir: &Path, wal_dir: &Path, tx_id: TxnId) -> Result<RecoveryAction> {
    let wal_path = wal_dir.join(format!("{tx_id}.log"));
    let records = wal::read_all(&wal_path)?;
    let snapshot_dir = base_dir.join(".plandex").join("snapshots").join(tx_id.to_string());

    if records.is_empty() {
        wal::remove(&wal_path)?;
        remove_snapshot_dir(&snapshot_dir)?;
        return Ok(RecoveryAction::NoneFound);
    }

    // Which (path -> last-seen-kind) pairs does the WAL record as
    // APPLIED? That is the set of ops that made it to disk and whose
    // pre-transaction content we must restore.
    let mut applied_paths: Vec<String> = Vec::new();
    let mut seen: HashMap<String, ()> = HashMap::new();
    for record in &records {
        if record.kind == WalKind::Applied {
            if let Some(path) = &record.path {
                if seen.insert(path.clone(), ()).is_none() {
                    applied_paths.push(path.clone());
                }
            }
        }
    }
    // Reverse order: later-applied ops are restored first.
    applied_paths.reverse();

    let last_kind = records.last().map(|r| r.kind);
    let store = SnapshotStore::open(&snapshot_dir)?;

    match last_kind {
        Some(WalKind::Commit) => {
            // Committed but cleanup never finished: just clean up.
            store.remove_all()?;
            wal::remove(&wal_path)?;
            Ok(RecoveryAction::CleanedAfterCommit)
        }
        Some(WalKind::Rollback) | Some(WalKind::Applied) | Some(WalKind::Stage) => {
            for relpath in &applied_paths {
                let abs = base_dir.join(relpath);
                store.restore(&abs)?;
            }
            store.remove_all()?;
            wal::remove(&wal_path)?;
            if last_kind == Some(WalKind::Rollback) {
                Ok(RecoveryAction::RollbackCompleted)
            } else {
                Ok(RecoveryAction::RestoredToPreBegin)
            }
        }
        Some(WalKind::Begin) | None => {
            // Nothing was ever staged or applied.
            store.remove_all()?;
            wal::remove(&wal_path)?;
            Ok(RecoveryAction::NoneFound)
        }
    }
}

fn remove_snapshot_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;
    }
    Ok(())
}
