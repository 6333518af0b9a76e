//! Append-only, JSON-per-line write-ahead log for a single transaction.
//!
//! One file per transaction: `<base-dir>/.plandex/wal/<tx-id>.log`.
//! `COMMIT`/`ROLLBACK` records are the durability points and are
//! `fsync`'d; intermediate `STAGE`/`APPLIED` records may be buffered.
//! Readers tolerate a truncated final line at the tail of the file: a
//! record that doesn't parse cleanly is treated as never written, not as
//! corruption.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use plandex_core_types::{now_micros, Error as CoreError, TxnId};

use crate::error::Result;
use crate::op::FileOpKind;

/// Kind of a single WAL record, in the order a transaction's lifecycle
/// produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalKind {
    /// Transaction started.
    Begin,
    /// An operation was staged.
    Stage,
    /// An operation was applied.
    Applied,
    /// Transaction committed.
    Commit,
    /// Transaction rolled back.
    Rollback,
}

/// One line of the write-ahead log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalRecord {
    /// Transaction this record belongs to.
    pub tx: TxnId,
    /// Monotonic sequence number within the transaction's WAL.
    pub seq: u64,
    /// What happened.
    pub kind: WalKind,
    /// Operation kind, present on `STAGE`/`APPLIED` records.
    pub op: Option<FileOpKind>,
    /// Path (relative to the base directory), present on `STAGE`/`APPLIED`.
    pub path: Option<String>,
    /// Microseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Appends [`WalRecord`]s to a transaction's log file.
pub struct WalWriter {
    path: PathBuf,
    file: File,
    tx: TxnId,
    next_seq: u64,
}

impl WalWriter {
    /// Open (creating) the WAL file for `tx` under `wal_dir`.
    pub fn create(wal_dir: &Path, tx: TxnId) -> Result<Self> {
        std::fs::create_dir_all(wal_dir).map_err(|e| CoreError::io(wal_dir, e))?;
        let path = wal_dir.join(format!("{tx}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CoreError::io(&path, e))?;
        Ok(Self {
            path,
            file,
            tx,
            next_seq: 0,
        })
    }

    /// Path of the log file this writer appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record. `fsync` must be `true` for `COMMIT`/`ROLLBACK`
    /// boundary records and may be `false` for intermediate records.
    pub fn append(
        &mut self,
        kind: WalKind,
        op: Option<FileOpKind>,
        path: Option<String>,
        fsync: bool,
    ) -> Result<WalRecord> {
        let record = WalRecord {
            tx: self.tx,
            seq: self.next_seq,
            kind,
            op,
            path,
            timestamp: now_micros(),
        };
        self.next_seq += 1;
        let mut line = serde_json::to_vec(&record).map_err(CoreError::Serialization)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .map_err(|e| CoreError::io(&self.path, e))?;
        if fsync {
            self.file
                .sync_all()
                .map_err(|e| CoreError::io(&self.path, e))?;
        }
        Ok(record)
    }
}

/// Read every well-formed record from a WAL file, tolerating a truncated
/// final line. Returns an empty vec if the file does not exist.
pub fn read_all(path: &Path) -> Result<Vec<WalRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).map_err(|e| CoreError::io(path, e))?;
    let lines: Vec<String> = BufReader::new(file)
        .lines()
        .collect::<std::io::Result<_>>()
        .map_err(|e| CoreError::io(path, e))?;
    let mut records = Vec::with_capacity(lines.len());
    let last_index = lines.len().saturating_sub(1);
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WalRecord>(line) {
            Ok(record) => records.push(record),
            Err(_) if i == last_index => {
                // Torn write at the tail: treat as never written.
                break;
            }
            Err(e) => return Err(CoreError::Serialization(e).into()),
        }
    }
    Ok(records)
}

/// Remove a WAL file if it exists. Missing files are not an error.
pub fn remove(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| CoreError::io(path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let tx = TxnId::new();
        let mut writer = WalWriter::create(dir.path(), tx).unwrap();
        writer.append(WalKind::Begin, None, None, true).unwrap();
        writer
            .append(
                WalKind::Stage,
                Some(FileOpKind::Create),
                Some("a.txt".into()),
                false,
            )
            .unwrap();
        let records = read_all(&writer.path().to_path_buf()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, WalKind::Begin);
        assert_eq!(records[1].seq, 1);
    }

    #[test]
    fn truncated_final_line_is_tolerated() {
        let dir = tempdir().unwrap();
        let tx = TxnId::new();
        let path = dir.path().join(format!("{tx}.log"));
        let mut writer = WalWriter::create(dir.path(), tx).unwrap();
        writer.append(WalKind::Begin, None, None, true).unwrap();
        drop(writer);
        // simulate a torn write: append a truncated JSON fragment
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"tx\":\"broken").unwrap();
        let records = read_all(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, WalKind::Begin);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let records = read_all(&dir.path().join("nope.log")).unwrap();
        assert!(records.is_empty());
    }
}
