//! Content-and-mode capture for a single path before any write.
//!
//! Adapted from a KV-record snapshot/WAL pairing to whole-file
//! snapshots: content is stored as a raw byte blob at
//! `snapshots/<tx-id>/<sha256-of-path-hex>`, with a sidecar
//! `<...>.meta.json` holding `{existed, mode}`, serialized as
//! human-readable JSON rather than a compact binary format.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use plandex_core_types::{atomic_write, file_mode, Error as CoreError, DEFAULT_FILE_MODE};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotMeta {
    existed: bool,
    mode: u32,
}

fn path_digest(abs_path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(abs_path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Pre-transaction state of every path a [`crate::FileTransaction`] has
/// touched, keyed by absolute path. At most one snapshot per absolute
/// path is ever captured for a given store — later [`Self::capture`]
/// calls for an already-captured path are no-ops.
pub struct SnapshotStore {
    dir: PathBuf,
    captured: HashSet<PathBuf>,
}

impl SnapshotStore {
    /// Open (creating if necessary) the snapshot directory for a
    /// transaction. Used both when starting a fresh transaction and when
    /// recovery re-opens an existing snapshot directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;
        Ok(Self {
            dir,
            captured: HashSet::new(),
        })
    }

    /// The directory this store persists snapshots under.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True if `abs_path` already has a snapshot in this store.
    pub fn is_captured(&self, abs_path: &Path) -> bool {
        self.captured.contains(abs_path)
    }

    fn paths_for(&self, abs_path: &Path) -> (PathBuf, PathBuf) {
        let digest = path_digest(abs_path);
        (
            self.dir.join(&digest),
            self.dir.join(format!("{digest}.meta.json")),
        )
    }

    /// Capture `abs_path`'s current content and mode, or record
    /// `existed = false` if nothing is there. No-op if already captured.
    pub fn capture(&mut self, abs_path: &Path) -> Result<()> {
        if self.captured.contains(abs_path) {
            return Ok(());
        }
        let (content_path, meta_path) = self.paths_for(abs_path);
        let meta = if abs_path.exists() {
            let content = fs::read(abs_path).map_err(|e| CoreError::io(abs_path, e))?;
            let mode = file_mode(abs_path)?;
            atomic_write(&content_path, &content, 0o600)?;
            SnapshotMeta { existed: true, mode }
        } else {
            SnapshotMeta {
                existed: false,
                mode: DEFAULT_FILE_MODE,
            }
        };
        let meta_json = serde_json::to_vec(&meta).map_err(CoreError::Serialization)?;
        atomic_write(&meta_path, &meta_json, 0o600)?;
        self.captured.insert(abs_path.to_path_buf());
        Ok(())
    }

    /// Write the captured content back to `abs_path` with its original
    /// mode, or delete `abs_path` if it did not exist at capture time.
    /// Works against any snapshot directory, including one reopened
    /// during crash recovery (it does not require `capture` to have run
    /// in this process).
    pub fn restore(&self, abs_path: &Path) -> Result<()> {
        let (content_path, meta_path) = self.paths_for(abs_path);
        let meta_bytes = fs::read(&meta_path).map_err(|e| CoreError::io(&meta_path, e))?;
        let meta: SnapshotMeta =
            serde_json::from_slice(&meta_bytes).map_err(CoreError::Serialization)?;
        if meta.existed {
            let content = fs::read(&content_path).map_err(|e| CoreError::io(&content_path, e))?;
            atomic_write(abs_path, &content, meta.mode)?;
        } else if abs_path.exists() {
            fs::remove_file(abs_path).map_err(|e| CoreError::io(abs_path, e))?;
        }
        Ok(())
    }

    /// Remove this snapshot directory and everything in it. Called after
    /// a clean commit and after every rollback restore has completed.
    pub fn remove_all(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).map_err(|e| CoreError::io(&self.dir, e))?;
        }
        Ok(())
    }
}
