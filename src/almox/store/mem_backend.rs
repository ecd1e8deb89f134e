use super::backend::StorageBackend;
use crate::error::{AlmoxError, Result};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Clone)]
struct FileEntry {
    bytes: Vec<u8>,
    mtime: DateTime<Utc>,
}

/// In-memory storage backend for testing.
///
/// Uses `RefCell` for interior mutability since almox is single-threaded.
/// This keeps every `StorageBackend` method on `&self`, same as the
/// filesystem backend.
#[derive(Default)]
pub struct MemBackend {
    files: RefCell<BTreeMap<PathBuf, FileEntry>>,
    dirs: RefCell<BTreeSet<PathBuf>>,
    simulate_write_error: RefCell<bool>,
    failing_paths: RefCell<BTreeSet<PathBuf>>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable write error simulation for every path.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        *self.simulate_write_error.borrow_mut() = simulate;
    }

    /// Make writes to one path fail, leaving the others working.
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.failing_paths.borrow_mut().insert(path.into());
    }

    /// Test helper to set mtime directly for retention testing.
    /// Returns true if the file existed and was updated.
    pub fn set_modified(&self, path: &Path, mtime: DateTime<Utc>) -> bool {
        match self.files.borrow_mut().get_mut(path) {
            Some(entry) => {
                entry.mtime = mtime;
                true
            }
            None => false,
        }
    }

    /// Raw file content, for byte-for-byte assertions.
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.borrow().get(path).map(|e| e.bytes.clone())
    }

    fn check_writable(&self, path: &Path) -> Result<()> {
        if *self.simulate_write_error.borrow() || self.failing_paths.borrow().contains(path) {
            return Err(AlmoxError::Store(format!(
                "Simulated write error: {}",
                path.display()
            )));
        }
        Ok(())
    }

    fn put(&self, path: &Path, bytes: Vec<u8>) {
        self.files.borrow_mut().insert(
            path.to_path_buf(),
            FileEntry {
                bytes,
                mtime: Utc::now(),
            },
        );
    }
}

impl StorageBackend for MemBackend {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        Ok(self.contents(path))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.check_writable(path)?;
        self.put(path, bytes.to_vec());
        Ok(())
    }

    fn append(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.check_writable(path)?;
        let mut content = self.contents(path).unwrap_or_default();
        content.extend_from_slice(bytes);
        self.put(path, content);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        self.check_writable(to)?;
        let bytes = self.contents(from).ok_or_else(|| {
            AlmoxError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", from.display()),
            ))
        })?;
        self.put(to, bytes);
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.check_writable(path)?;
        match self.files.borrow_mut().remove(path) {
            Some(_) => Ok(()),
            None => Err(AlmoxError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.dirs.borrow().contains(path) || self.files.borrow().keys().any(|f| f.starts_with(path))
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        self.dirs.borrow_mut().insert(path.to_path_buf());
        Ok(())
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|f| f.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn modified(&self, path: &Path) -> Result<Option<DateTime<Utc>>> {
        Ok(self.files.borrow().get(path).map(|e| e.mtime))
    }

    fn location(&self, path: &Path) -> PathBuf {
        PathBuf::from("memory://").join(path)
    }
}
