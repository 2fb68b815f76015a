//! Storage medium boundary.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Minimal file operations the exporter needs. Paths are relative to the
/// storage root.
pub trait Storage: Send {
    fn exists(&self, path: &Path) -> bool;

    fn create_dir(&self, path: &Path) -> Result<()>;

    fn remove(&self, path: &Path) -> Result<()>;

    /// Open `path` for writing, truncating anything already there.
    fn open_for_write(&self, path: &Path) -> Result<Box<dyn Write + '_>>;

    /// Create `path` unless it already exists.
    fn ensure_dir(&self, path: &Path) -> Result<()> {
        if !self.exists(path) {
            self.create_dir(path)?;
        }
        Ok(())
    }
}

/// Local filesystem storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl Storage for FsStorage {
    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(self.resolve(path))?;
        Ok(())
    }

    fn open_for_write(&self, path: &Path) -> Result<Box<dyn Write + '_>> {
        let file = File::create(self.resolve(path))?;
        Ok(Box::new(BufWriter::new(file)))
    }
}
