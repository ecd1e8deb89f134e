//! Periodic snapshots of the data tables into `Backups/`.
//!
//! The sweeper is driven from outside: the CLI calls [`BackupSweeper::tick`]
//! before every command, and `backup --watch` calls it on a fixed interval.
//! Old snapshots are pruned on every tick, whether or not a new sweep is due.

use super::{CmdMessage, CmdResult};
use crate::error::Result;
use crate::model::{Table, BACKUPS_DIR};
use crate::store::backend::StorageBackend;
use crate::store::Store;
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Epoch seconds of the last successful sweep.
pub const MARKER_FILE: &str = "ultimo_backup_timestamp.txt";

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(3 * 60 * 60);
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Sweeping,
}

#[derive(Debug)]
pub struct BackupSweeper {
    period: Duration,
    retention: Duration,
    state: SweepState,
}

impl Default for BackupSweeper {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD, DEFAULT_RETENTION)
    }
}

impl BackupSweeper {
    pub fn new(period: Duration, retention: Duration) -> Self {
        Self {
            period,
            retention,
            state: SweepState::Idle,
        }
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Prunes, then sweeps when at least `period` has passed since the last
    /// successful sweep.
    pub fn tick<B: StorageBackend>(
        &mut self,
        store: &Store<B>,
        now: DateTime<Local>,
    ) -> Result<CmdResult> {
        let mut result = prune(store, now, self.retention)?;

        if let Some(last) = last_sweep(store) {
            let elapsed = epoch_seconds(&now) - last;
            if elapsed < self.period.as_secs_f64() {
                debug!(elapsed, "backup not due yet");
                return Ok(result);
            }
        }

        self.sweep(store, now, true, &mut result)?;
        Ok(result)
    }

    /// Manual backup, regardless of when the last sweep ran.
    pub fn sweep_now<B: StorageBackend>(
        &mut self,
        store: &Store<B>,
        now: DateTime<Local>,
    ) -> Result<CmdResult> {
        let mut result = CmdResult::default();
        self.sweep(store, now, false, &mut result)?;
        Ok(result)
    }

    fn sweep<B: StorageBackend>(
        &mut self,
        store: &Store<B>,
        now: DateTime<Local>,
        automatic: bool,
        result: &mut CmdResult,
    ) -> Result<()> {
        self.state = SweepState::Sweeping;

        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let mut copied = 0;
        for table in Table::ALL {
            let source = table.path();
            if !store.backend().exists(&source) {
                continue;
            }
            let target = snapshot_path(table, &stamp, automatic);
            if result.record_step(table.name(), store.backend().copy(&source, &target)) {
                copied += 1;
                result.paths.push(store.location(&target));
            }
        }

        if copied == 0 {
            self.state = SweepState::Idle;
            if result.has_failed_steps() {
                result.add_message(CmdMessage::error("Backup failed: no table could be copied."));
            } else {
                result.add_message(CmdMessage::info("Nothing to back up yet."));
            }
            return Ok(());
        }

        let marker = format!("{}", epoch_seconds(&now));
        let marked = store
            .backend()
            .write(&marker_path(), marker.as_bytes());
        self.state = SweepState::Idle;
        marked?;

        info!(copied, automatic, "backup sweep finished");
        result.add_message(CmdMessage::success(format!(
            "Backup done: {} table(s) copied to {}",
            copied,
            store.location(Path::new(BACKUPS_DIR)).display()
        )));
        Ok(())
    }
}

/// `Backups/Estoque_20250301_100000_auto.csv`
pub fn snapshot_path(table: Table, stamp: &str, automatic: bool) -> PathBuf {
    let suffix = if automatic { "_auto" } else { "" };
    PathBuf::from(BACKUPS_DIR).join(format!("{}_{}{}.csv", table.name(), stamp, suffix))
}

pub fn marker_path() -> PathBuf {
    PathBuf::from(BACKUPS_DIR).join(MARKER_FILE)
}

fn epoch_seconds(at: &DateTime<Local>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// Epoch seconds stored by the last successful sweep, if any.
pub fn last_sweep<B: StorageBackend>(store: &Store<B>) -> Option<f64> {
    let bytes = match store.backend().read(&marker_path()) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            warn!("cannot read backup marker: {}", e);
            return None;
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warn!(marker = %text.trim(), "backup marker is not a timestamp, ignoring it");
            None
        }
    }
}

/// Removes `.csv` snapshots older than `retention`. Each file is handled on
/// its own; a failure is reported and the rest continue.
pub fn prune<B: StorageBackend>(
    store: &Store<B>,
    now: DateTime<Local>,
    retention: Duration,
) -> Result<CmdResult> {
    let mut result = CmdResult::default();
    let now = now.with_timezone(&Utc);
    let max_age = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);

    let mut removed = 0;
    for path in store.backend().list_files(Path::new(BACKUPS_DIR))? {
        if path.extension().map_or(true, |e| e != "csv") {
            continue;
        }
        let modified = match store.backend().modified(&path) {
            Ok(Some(modified)) => modified,
            Ok(None) => continue,
            Err(e) => {
                warn!(path = %path.display(), "cannot stat backup: {}", e);
                continue;
            }
        };
        if (now - modified).num_seconds() <= max_age {
            continue;
        }
        match store.backend().remove(&path) {
            Ok(()) => {
                removed += 1;
                debug!(path = %path.display(), "old backup removed");
            }
            Err(e) => {
                warn!(path = %path.display(), "cannot remove old backup: {}", e);
                result.add_message(CmdMessage::warning(format!(
                    "Could not remove old backup {}: {}",
                    path.display(),
                    e
                )));
            }
        }
    }

    if removed > 0 {
        result.add_message(CmdMessage::info(format!(
            "Removed {} backup(s) older than {} day(s).",
            removed,
            max_age / 86_400
        )));
    }
    Ok(result)
}
