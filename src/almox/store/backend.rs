use crate::error::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Abstract interface for raw file I/O under the data directory.
///
/// All paths are relative to the backend root (`Planilhas/Estoque.csv`,
/// `Backups/...`). This trait handles the "how" of storage (filesystem vs
/// memory), while [`super::Store`] handles the "what" (encoding, backups,
/// refusing to clobber unreadable tables).
pub trait StorageBackend {
    /// Read a whole file. `Ok(None)` if it does not exist.
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Replace a file, creating parent folders as needed.
    /// MUST be atomic (write to tmp then rename) to avoid partial writes.
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Append to a file, creating it (and its folders) when missing.
    fn append(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    fn remove(&self, path: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn dir_exists(&self, path: &Path) -> bool;

    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Files directly inside `dir` (relative paths). Empty if `dir` is missing.
    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Modification time of a file, `None` if it does not exist.
    fn modified(&self, path: &Path) -> Result<Option<DateTime<Utc>>>;

    /// Where a relative path lives, for messages shown to the operator.
    fn location(&self, path: &Path) -> PathBuf;
}
