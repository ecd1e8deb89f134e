//! # Storage Layer
//!
//! Every table is a flat CSV file under the data directory. There is no
//! database and no transaction: each operation reads the whole file, changes
//! it in memory and writes the whole file back.
//!
//! ## Layout
//!
//! ```text
//! <data dir>/
//! ├── Planilhas/
//! │   ├── Estoque.csv          # stock ledger, keyed by CODIGO
//! │   ├── Estoque_backup.csv   # copy taken right before the last rewrite
//! │   ├── Entrada.csv          # stock-in journal (append-only)
//! │   ├── Saida.csv            # stock-out journal (append-only)
//! │   └── Epis.csv             # EPI ledger, keyed by CA / description
//! ├── Colaboradores/<NAME>/<NAME>_<YYYY_MM>.csv
//! ├── Backups/                 # timestamped snapshots + last sweep marker
//! ├── Relatorios/              # spreadsheet and text exports
//! └── almox.json               # configuration
//! ```
//!
//! ## Layers
//!
//! - [`backend::StorageBackend`]: raw bytes in and out
//!   ([`fs_backend::FsBackend`] in production, [`mem_backend::MemBackend`]
//!   in tests)
//! - [`Store`]: typed tables on top of a backend
//!
//! ## Write discipline
//!
//! - Full rewrites first copy the live file to `<name>_backup.csv`, then
//!   replace it atomically.
//! - A table whose read came back degraded is never rewritten; the operation
//!   fails instead.
//! - Appends go straight to the end of the file when its header already starts
//!   with the canonical columns; older layouts are realigned first.
//!
//! The discipline is single-writer: a second process finishing after a first
//! one started silently wins.

use crate::codec::{self, Record, TableData, TableRecord};
use crate::error::{AlmoxError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub mod backend;
pub mod fs_backend;
pub mod mem_backend;

use backend::StorageBackend;

pub struct Store<B: StorageBackend> {
    /// The underlying storage backend.
    /// Exposed as pub(crate) for testing and internal access only.
    pub(crate) backend: B,
}

impl<B: StorageBackend> Store<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Load one of the fixed tables. Never fails; see [`codec::decode`].
    pub fn load<T: TableRecord>(&self) -> TableData<T> {
        self.load_at(&T::TABLE.path())
    }

    pub fn load_at<T: Record>(&self, path: &Path) -> TableData<T> {
        let data = match self.backend.read(path) {
            Ok(bytes) => codec::decode(bytes.as_deref()),
            Err(e) => TableData::unreadable(format!("cannot read file: {}", e)),
        };
        for warning in &data.warnings {
            warn!(path = %path.display(), "{}", warning);
        }
        data
    }

    /// Load a table that is about to be rewritten.
    ///
    /// Fails when the file exists but could not be read, so that a corrupt
    /// table is never replaced by an empty one.
    pub fn load_for_update<T: TableRecord>(&self) -> Result<TableData<T>> {
        let path = T::TABLE.path();
        let data = self.load_at::<T>(&path);
        if data.degraded {
            return Err(AlmoxError::Store(format!(
                "{} could not be read ({}); refusing to overwrite it",
                path.display(),
                data.warnings.join("; ")
            )));
        }
        Ok(data)
    }

    /// Rewrite a whole table, keeping a copy of the previous file.
    pub fn save<T: TableRecord>(&self, rows: &[T]) -> Result<()> {
        let path = T::TABLE.path();
        self.snapshot_before_write(&path)?;
        let bytes = codec::encode(rows)?;
        self.backend.write(&path, &bytes)?;
        debug!(path = %path.display(), rows = rows.len(), "table rewritten");
        Ok(())
    }

    pub fn append<T: TableRecord>(&self, row: &T) -> Result<()> {
        self.append_at(&T::TABLE.path(), row)
    }

    /// Append one row, writing the header first when the file is new.
    pub fn append_at<T: Record>(&self, path: &Path, row: &T) -> Result<()> {
        let line = codec::encode_line(row)?;

        let existing = self
            .backend
            .read(path)?
            .filter(|bytes| !bytes.iter().all(u8::is_ascii_whitespace));

        match existing {
            None => {
                let mut bytes = codec::encode::<T>(&[])?;
                bytes.extend(line);
                self.backend.write(path, &bytes)?;
            }
            Some(bytes) if codec::has_canonical_prefix::<T>(&bytes) => {
                let mut chunk = Vec::with_capacity(line.len() + 1);
                if !bytes.ends_with(b"\n") {
                    chunk.push(b'\n');
                }
                chunk.extend(line);
                self.backend.append(path, &chunk)?;
            }
            Some(bytes) => {
                let mut realigned = codec::normalize_columns(&bytes, T::COLUMNS, "")?
                    .unwrap_or(bytes);
                if !realigned.ends_with(b"\n") {
                    realigned.push(b'\n');
                }
                realigned.extend(line);
                self.snapshot_before_write(path)?;
                self.backend.write(path, &realigned)?;
                debug!(path = %path.display(), "legacy header realigned before append");
            }
        }

        debug!(path = %path.display(), "row appended");
        Ok(())
    }

    /// Rewrite a table so its header starts with the canonical columns,
    /// filling the missing ones with `placeholder`. Returns whether the file
    /// changed.
    pub fn realign<T: TableRecord>(&self, placeholder: &str) -> Result<bool> {
        let path = T::TABLE.path();
        let Some(bytes) = self.backend.read(&path)? else {
            return Ok(false);
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(false);
        }
        let Some(fixed) = codec::normalize_columns(&bytes, T::COLUMNS, placeholder)? else {
            return Ok(false);
        };
        self.snapshot_before_write(&path)?;
        self.backend.write(&path, &fixed)?;
        debug!(path = %path.display(), "columns realigned");
        Ok(true)
    }

    fn snapshot_before_write(&self, path: &Path) -> Result<()> {
        if self.backend.exists(path) {
            self.backend.copy(path, &backup_path(path))?;
        }
        Ok(())
    }

    /// Where a relative path lives, for messages shown to the operator.
    pub fn location(&self, path: &Path) -> PathBuf {
        self.backend.location(path)
    }
}

/// `Planilhas/Estoque.csv` -> `Planilhas/Estoque_backup.csv`
pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}_backup.csv", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EpiItem, Table};
    use mem_backend::MemBackend;

    fn epi(ca: &str, description: &str, quantity: f64) -> EpiItem {
        EpiItem {
            ca: ca.into(),
            description: description.into(),
            quantity,
        }
    }

    #[test]
    fn append_creates_file_with_header() {
        let store = Store::with_backend(MemBackend::new());
        store.append(&epi("1", "LUVA", 2.0)).unwrap();
        store.append(&epi("2", "BOTA", 1.0)).unwrap();

        let raw = store.backend.contents(&Table::Epis.path()).unwrap();
        assert_eq!(
            String::from_utf8(raw).unwrap(),
            "CA,DESCRICAO,QUANTIDADE\n1,LUVA,2\n2,BOTA,1\n"
        );
    }

    #[test]
    fn append_realigns_legacy_layout() {
        let store = Store::with_backend(MemBackend::new());
        store
            .backend
            .write(&Table::Epis.path(), b"DESCRICAO,CA\nLUVA,1")
            .unwrap();

        store.append(&epi("2", "BOTA", 1.0)).unwrap();

        let data = store.load::<EpiItem>();
        assert_eq!(data.rows, vec![epi("1", "LUVA", 0.0), epi("2", "BOTA", 1.0)]);
        assert!(store.backend.exists(Path::new("Planilhas/Epis_backup.csv")));
    }

    #[test]
    fn save_keeps_previous_copy() {
        let store = Store::with_backend(MemBackend::new());
        store.save(&[epi("1", "LUVA", 2.0)]).unwrap();
        store.save(&[epi("1", "LUVA", 5.0)]).unwrap();

        let backup = store.load_at::<EpiItem>(&backup_path(&Table::Epis.path()));
        assert_eq!(backup.rows, vec![epi("1", "LUVA", 2.0)]);
    }

    #[test]
    fn refuses_to_overwrite_unreadable_table() {
        let store = Store::with_backend(MemBackend::new());
        store
            .backend
            .write(&Table::Epis.path(), b"CA,DESCRICAO\n\xff,LUVA\n")
            .unwrap();

        let read = store.load::<EpiItem>();
        assert!(read.degraded);
        assert!(store.load_for_update::<EpiItem>().is_err());
    }

    #[test]
    fn failed_write_is_reported() {
        let store = Store::with_backend(MemBackend::new());
        store.backend.set_simulate_write_error(true);
        assert!(store.append(&epi("1", "LUVA", 1.0)).is_err());
    }

    #[test]
    fn backup_path_sits_next_to_table() {
        assert_eq!(
            backup_path(Path::new("Planilhas/Saida.csv")),
            PathBuf::from("Planilhas/Saida_backup.csv")
        );
    }
}
