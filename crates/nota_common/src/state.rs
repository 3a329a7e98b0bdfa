//! Atomic file operations for persisted state.
//!
//! Temp file + rename so a reader never observes a partially written value.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Write data to a file atomically using temp file + rename.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Temp file in the same directory, so the rename stays on one filesystem
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)
}

/// Write string data atomically.
pub fn atomic_write_str(path: &Path, data: &str) -> io::Result<()> {
    atomic_write(path, data.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("value.json");

        atomic_write_str(&path, "first").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");

        atomic_write_str(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");

        // no temp file left behind
        assert!(!path.with_extension("tmp").exists());
    }
}
