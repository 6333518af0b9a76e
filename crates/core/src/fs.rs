//! Crash-safe file write helper shared by the snapshot store, the file
//! transaction engine, and the workspace's copy-on-write tree.
//!
//! Generalizes a write-temp / fsync / rename-over pattern from a
//! snapshot-specific writer to "durably write these bytes at this path
//! with this mode".

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::Error;

#[cfg(unix)]
fn set_mode(file: &fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Default mode for newly created files when no prior mode is known.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Write `content` to `path` atomically: write to a sibling temp file,
/// fsync it, then rename over `path`. Creates parent directories as
/// needed. On any failure the target path is left untouched.
pub fn atomic_write(path: &Path, content: &[u8], mode: u32) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string()),
        crate::now_micros()
    );
    let tmp_path = path.with_file_name(tmp_name);
    let write_result = (|| -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        set_mode(&file, mode)?;
        Ok(())
    })();
    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(Error::io(&tmp_path, e));
    }
    fs::rename(&tmp_path, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Unix file mode bits for `path`, or [`DEFAULT_FILE_MODE`] on platforms
/// without POSIX permissions.
pub fn file_mode(path: &Path) -> Result<u32, Error> {
    let meta = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    Ok(mode_of(&meta))
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(_meta: &fs::Metadata) -> u32 {
    DEFAULT_FILE_MODE
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_creates_parent_dirs_and_content() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a/b/c.txt");
        atomic_write(&target, b"hello", 0o644).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"hello");
    }

    #[test]
    fn atomic_write_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("f.txt");
        atomic_write(&target, b"first", 0o644).unwrap();
        atomic_write(&target, b"second", 0o644).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "no leftover temp file");
    }
}
