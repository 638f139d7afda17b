//! Atomic file writes for the file-backed store
//!
//! 1. Write to a temporary file (.tmp)
//! 2. Call sync_all() to flush to disk
//! 3. Rename temp file to final path (atomic on most filesystems)
//!
//! A reader sees either the previous record file or the new one, never a
//! partially written file.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Atomically replace `path` with `content`
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &str) -> io::Result<()> {
    let path = path.as_ref();
    let temp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = File::create(&temp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Remove `.tmp` files left behind by a crash between write and rename
pub fn cleanup_temp_files<P: AsRef<Path>>(dir: P) -> io::Result<usize> {
    let dir = dir.as_ref();
    let mut cleaned = 0;

    if !dir.exists() {
        return Ok(0);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "tmp").unwrap_or(false) {
            fs::remove_file(&path)?;
            cleaned += 1;
        }
    }

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.json");

        atomic_write(&path, "{\"a\":1}").unwrap();
        atomic_write(&path, "{\"a\":2}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":2}");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("agents").join("sub1").join("records.json");

        atomic_write(&path, "{}").unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_cleanup_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("records.tmp"), "partial").unwrap();
        fs::write(temp_dir.path().join("records.json"), "{}").unwrap();

        assert_eq!(cleanup_temp_files(temp_dir.path()).unwrap(), 1);
        assert!(!temp_dir.path().join("records.tmp").exists());
        assert!(temp_dir.path().join("records.json").exists());
    }
}
