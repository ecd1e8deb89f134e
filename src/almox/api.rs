//! # API Facade
//!
//! The API layer is a **thin facade** over the command layer. It is the single
//! entry point for every almox operation, whatever shell drives it.
//!
//! ## Role and Responsibilities
//!
//! The API facade:
//! - **Dispatches** to the appropriate command function
//! - **Binds context** the commands should not care about: the configured
//!   code seed, the operator recorded on journal rows, the backup schedule
//! - **Returns structured types** (`Result<CmdResult>`)
//!
//! ## What the API Does NOT Do
//!
//! - **Business logic**: that belongs in `commands/*.rs`
//! - **Prompts or output**: no stdin, stdout or stderr. Confirmation is the
//!   shell's job; operations that need one expose a preview (`plan_epi_add`,
//!   `collaborator_exists`) and take the answer as an argument.
//!
//! ## Generic Over StorageBackend
//!
//! `AlmoxApi<B: StorageBackend>` runs on `FsBackend` in production and on
//! `MemBackend` in tests, so the whole surface can be exercised without
//! touching the filesystem.

use crate::commands::{self, backup::BackupSweeper};
use crate::config::AlmoxConfig;
use crate::error::{AlmoxError, Result};
use crate::store::backend::StorageBackend;
use crate::store::Store;
use chrono::{DateTime, Local, NaiveDate};
use std::path::{Path, PathBuf};

/// Recorded as operator when nobody was named.
pub const UNKNOWN_OPERATOR: &str = "-";

pub struct AlmoxApi<B: StorageBackend> {
    store: Store<B>,
    config: AlmoxConfig,
    data_dir: PathBuf,
    operator: String,
    sweeper: BackupSweeper,
}

impl<B: StorageBackend> AlmoxApi<B> {
    pub fn new(store: Store<B>, config: AlmoxConfig, data_dir: PathBuf) -> Self {
        let operator = config
            .operator
            .clone()
            .unwrap_or_else(|| UNKNOWN_OPERATOR.to_string());
        let sweeper = BackupSweeper::new(config.backup_period(), config.retention());
        Self {
            store,
            config,
            data_dir,
            operator,
            sweeper,
        }
    }

    /// Overrides the configured operator.
    pub fn with_operator(mut self, operator: Option<String>) -> Self {
        if let Some(op) = operator.map(|o| o.trim().to_string()).filter(|o| !o.is_empty()) {
            self.operator = op;
        }
        self
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn store(&self) -> &Store<B> {
        &self.store
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_values(&self) -> &AlmoxConfig {
        &self.config
    }

    // Ledger

    pub fn register_item(&self, item: commands::ledger::NewItem) -> Result<CmdResult> {
        commands::ledger::register(&self.store, item, self.config.code_seed)
    }

    pub fn next_code(&self) -> Result<String> {
        commands::ledger::next_code(&self.store, self.config.code_seed)
    }

    pub fn list_items(&self) -> Result<CmdResult> {
        commands::ledger::list(&self.store)
    }

    pub fn search_items(&self, term: &str) -> Result<CmdResult> {
        commands::ledger::search(&self.store, term)
    }

    /// One item together with its movement history.
    pub fn show_item(&self, code: &str) -> Result<CmdResult> {
        let item = commands::ledger::find_by_code(&self.store, code)
            .ok_or_else(|| AlmoxError::item_not_found(code.trim()))?;
        let entradas = commands::journal::list_entradas(&self.store, Some(&item.code))?;
        let saidas = commands::journal::list_saidas(&self.store, Some(&item.code))?;

        let mut result = CmdResult::default().with_listed_items(vec![item]);
        result.entradas = entradas.entradas;
        result.saidas = saidas.saidas;
        Ok(result)
    }

    pub fn edit_item(&self, code: &str, changes: commands::ledger::ItemEdit) -> Result<CmdResult> {
        commands::ledger::edit(&self.store, code, changes)
    }

    pub fn delete_item(&self, code: &str) -> Result<CmdResult> {
        commands::ledger::delete(&self.store, code)
    }

    // Journals

    pub fn record_entrada(&self, mut input: commands::journal::EntradaInput) -> Result<CmdResult> {
        if input.operator.trim().is_empty() {
            input.operator = self.operator.clone();
        }
        commands::journal::record_entrada(&self.store, input)
    }

    pub fn record_saida(&self, mut input: commands::journal::SaidaInput) -> Result<CmdResult> {
        if input.operator.trim().is_empty() {
            input.operator = self.operator.clone();
        }
        commands::journal::record_saida(&self.store, input)
    }

    pub fn list_entradas(&self, code: Option<&str>) -> Result<CmdResult> {
        commands::journal::list_entradas(&self.store, code)
    }

    pub fn list_saidas(&self, code: Option<&str>) -> Result<CmdResult> {
        commands::journal::list_saidas(&self.store, code)
    }

    // EPIs

    pub fn plan_epi_add(
        &self,
        ca: Option<&str>,
        description: Option<&str>,
    ) -> Result<commands::epi::EpiAddPlan> {
        commands::epi::plan_add(&self.store, ca, description)
    }

    pub fn add_epi(
        &self,
        ca: Option<&str>,
        description: Option<&str>,
        quantity: f64,
    ) -> Result<CmdResult> {
        commands::epi::add_or_increment(&self.store, ca, description, quantity)
    }

    pub fn collaborator_exists(&self, name: &str) -> bool {
        commands::epi::collaborator_exists(&self.store, name)
    }

    pub fn withdraw_epi(
        &self,
        identifier: &str,
        quantity: f64,
        collaborator: &str,
        create_folder: bool,
    ) -> Result<CmdResult> {
        commands::epi::withdraw(&self.store, identifier, quantity, collaborator, create_folder)
    }

    pub fn edit_epi(&self, identifier: &str, changes: commands::epi::EpiEdit) -> Result<CmdResult> {
        commands::epi::edit(&self.store, identifier, changes)
    }

    pub fn delete_epi(&self, identifier: &str) -> Result<CmdResult> {
        commands::epi::delete(&self.store, identifier)
    }

    pub fn list_epis(&self) -> Result<CmdResult> {
        commands::epi::list(&self.store)
    }

    pub fn epi_withdrawals(&self, collaborator: &str) -> Result<CmdResult> {
        commands::epi::withdrawals(&self.store, collaborator)
    }

    // Backups, reports, maintenance

    pub fn backup_tick(&mut self, now: DateTime<Local>) -> Result<CmdResult> {
        self.sweeper.tick(&self.store, now)
    }

    pub fn backup_now(&mut self, now: DateTime<Local>) -> Result<CmdResult> {
        self.sweeper.sweep_now(&self.store, now)
    }

    pub fn export_snapshot(&self, today: NaiveDate) -> Result<CmdResult> {
        commands::export::export_snapshot(&self.store, today)
    }

    pub fn export_out_of_stock(&self, today: NaiveDate) -> Result<CmdResult> {
        commands::export::export_out_of_stock(&self.store, today)
    }

    pub fn repair(&self) -> Result<CmdResult> {
        commands::repair::repair(&self.store)
    }

    pub fn config(&mut self, action: ConfigAction) -> Result<CmdResult> {
        let result = commands::config::run(&self.data_dir, action)?;
        if let Some(config) = &result.config {
            self.config = config.clone();
        }
        Ok(result)
    }
}

/// Messages that only make sense once the shell has printed a result.
pub fn summarize(result: &CmdResult) -> Option<CmdMessage> {
    if result.has_failed_steps() {
        let failed: Vec<&str> = result
            .steps
            .iter()
            .filter(|s| !s.ok())
            .map(|s| s.label)
            .collect();
        Some(CmdMessage::warning(format!(
            "Failed steps: {}",
            failed.join(", ")
        )))
    } else {
        None
    }
}

pub use crate::commands::config::ConfigAction;
pub use commands::epi::{EpiAddPlan, EpiEdit};
pub use commands::journal::{EntradaInput, SaidaInput};
pub use commands::ledger::{ItemEdit, NewItem};
pub use commands::{CmdMessage, CmdResult, MessageLevel, StepStatus};
