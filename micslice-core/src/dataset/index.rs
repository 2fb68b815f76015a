//! Persistent recording counter.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// Value an erased store reads back as.
pub const UNSET_INDEX: u32 = u32::MAX;

/// Non-volatile counter that numbers recordings across runs.
pub trait IndexStore {
    /// Current index; an unset store reads as 1.
    fn read_index(&self) -> Result<u32>;

    fn write_index(&mut self, index: u32) -> Result<()>;

    /// Mark `used` as taken by persisting [`next_index`] of it.
    fn commit(&mut self, used: u32) -> Result<()> {
        self.write_index(next_index(used))
    }

    /// Return the current index and persist its successor.
    fn advance(&mut self) -> Result<u32> {
        let current = self.read_index()?;
        self.commit(current)?;
        Ok(current)
    }
}

/// Index after `used`. Wraps to 1 instead of reaching the unset sentinel.
pub fn next_index(used: u32) -> u32 {
    match used.checked_add(1) {
        Some(next) if next != UNSET_INDEX => next,
        _ => 1,
    }
}

/// Counter kept as a 4-byte little-endian file.
#[derive(Debug, Clone)]
pub struct FileIndexStore {
    path: PathBuf,
}

impl FileIndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexStore for FileIndexStore {
    fn read_index(&self) -> Result<u32> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(1),
            Err(e) => return Err(e.into()),
        };
        let value = match <[u8; 4]>::try_from(bytes.as_slice()) {
            Ok(word) => u32::from_le_bytes(word),
            Err(_) => {
                debug!(path = %self.path.display(), len = bytes.len(), "malformed index file");
                UNSET_INDEX
            }
        };
        Ok(if value == UNSET_INDEX { 1 } else { value })
    }

    fn write_index(&mut self, index: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, index.to_le_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIndexStore::new(dir.path().join("index.bin"));
        assert_eq!(store.read_index().unwrap(), 1);
    }

    #[test]
    fn erased_sentinel_reads_as_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        fs::write(&path, [0xFF; 4]).unwrap();
        assert_eq!(FileIndexStore::new(&path).read_index().unwrap(), 1);
    }

    #[test]
    fn successor_skips_the_sentinel() {
        assert_eq!(next_index(1), 2);
        assert_eq!(next_index(u32::MAX - 2), u32::MAX - 1);
        assert_eq!(next_index(u32::MAX - 1), 1);
        assert_eq!(next_index(u32::MAX), 1);
    }

    #[test]
    fn commit_near_the_top_wraps_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileIndexStore::new(dir.path().join("index.bin"));
        store.write_index(u32::MAX - 1).unwrap();
        assert_eq!(store.advance().unwrap(), u32::MAX - 1);
        assert_eq!(store.read_index().unwrap(), 1);
    }

    #[test]
    fn advance_persists_successor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.bin");
        let mut store = FileIndexStore::new(&path);
        assert_eq!(store.advance().unwrap(), 1);
        assert_eq!(store.advance().unwrap(), 2);
        assert_eq!(fs::read(&path).unwrap(), 3u32.to_le_bytes());
    }
}
