//! The marker written before any risky workspace operation, whose
//! presence on load signals interrupted work.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use plandex_core_types::{now_micros, atomic_write, Error as CoreError};

use crate::error::Result;

/// The kind of risky operation a [`RecoveryMarker`] protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskyOp {
    /// `StageChanges` is writing into `files/` and updating tracking
    /// maps.
    StageChanges,
    /// A commit into the real project is in flight.
    Commit,
}

/// Persisted at `workspace-dir/recovery.json` at the start of a risky
/// operation and removed on clean completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryMarker {
    /// Workspace this marker protects.
    pub workspace_id: String,
    /// What kind of operation was in flight.
    pub op_type: RiskyOp,
    /// When the operation started (micros since epoch).
    pub started_at: u64,
    /// Paths the operation was in the middle of writing.
    pub pending_paths: Vec<String>,
    /// Free-form extra context.
    pub metadata: serde_json::Value,
}

impl RecoveryMarker {
    /// Build a marker for `op_type` touching `pending_paths`.
    pub fn new(workspace_id: impl Into<String>, op_type: RiskyOp, pending_paths: Vec<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            op_type,
            started_at: now_micros(),
            pending_paths,
            metadata: serde_json::Value::Null,
        }
    }

    /// Write this marker to `path`, durably.
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(CoreError::Serialization)?;
        atomic_write(path, &bytes, 0o600)?;
        Ok(())
    }

    /// Load the marker at `path`, if present.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path).map_err(|e| CoreError::io(path, e))?;
        let marker = serde_json::from_slice(&bytes).map_err(CoreError::Serialization)?;
        Ok(Some(marker))
    }

    /// Remove the marker at `path`, if present.
    pub fn remove(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).map_err(|e| CoreError::io(path, e))?;
        }
        Ok(())
    }
}
