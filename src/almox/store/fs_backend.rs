use super::backend::StorageBackend;
use crate::error::{AlmoxError, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Production backend rooted at the data directory.
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    fn ensure_parent(&self, full: &Path) -> Result<()> {
        if let Some(parent) = full.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(AlmoxError::Io)?;
            }
        }
        Ok(())
    }
}

impl StorageBackend for FsBackend {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(self.resolve(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AlmoxError::Io(e)),
        }
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path);
        self.ensure_parent(&target)?;

        let dir = target.parent().unwrap_or(self.root.as_path());
        let tmp = dir.join(format!(".almox-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, bytes).map_err(AlmoxError::Io)?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(AlmoxError::Io(e));
        }
        Ok(())
    }

    fn append(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path);
        self.ensure_parent(&target)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(target)
            .map_err(AlmoxError::Io)?;
        file.write_all(bytes).map_err(AlmoxError::Io)?;
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let target = self.resolve(to);
        self.ensure_parent(&target)?;
        fs::copy(self.resolve(from), target).map_err(AlmoxError::Io)?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(self.resolve(path)).map_err(AlmoxError::Io)
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.resolve(path).is_dir()
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(self.resolve(path)).map_err(AlmoxError::Io)
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let full = self.resolve(dir);
        if !full.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&full).map_err(AlmoxError::Io)? {
            let entry = entry.map_err(AlmoxError::Io)?;
            if entry.path().is_file() {
                files.push(dir.join(entry.file_name()));
            }
        }
        files.sort();
        Ok(files)
    }

    fn modified(&self, path: &Path) -> Result<Option<DateTime<Utc>>> {
        match fs::metadata(self.resolve(path)) {
            Ok(meta) => {
                let modified = meta.modified().map_err(AlmoxError::Io)?;
                Ok(Some(modified.into()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AlmoxError::Io(e)),
        }
    }

    fn location(&self, path: &Path) -> PathBuf {
        self.resolve(path)
    }
}
