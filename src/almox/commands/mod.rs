use crate::codec::TableData;
use crate::config::AlmoxConfig;
use crate::model::{
    CollaboratorWithdrawal, EntradaRecord, EpiItem, SaidaRecord, StockItem, Table,
};
use std::path::PathBuf;

pub mod backup;
pub mod config;
pub mod epi;
pub mod export;
pub mod journal;
pub mod ledger;
pub mod repair;

/// Quantities closer than this are treated as equal when guarding stock-outs.
pub(crate) const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct CmdMessage {
    pub level: MessageLevel,
    pub content: String,
}

impl CmdMessage {
    pub fn info(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            content: content.into(),
        }
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Success,
            content: content.into(),
        }
    }

    pub fn warning(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            content: content.into(),
        }
    }
}

/// Outcome of one write in a multi-file operation.
#[derive(Debug, Clone)]
pub struct StepStatus {
    pub label: &'static str,
    pub error: Option<String>,
}

impl StepStatus {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct CmdResult {
    pub affected_items: Vec<StockItem>,
    pub listed_items: Vec<StockItem>,
    pub entradas: Vec<EntradaRecord>,
    pub saidas: Vec<SaidaRecord>,
    pub epis: Vec<EpiItem>,
    pub withdrawals: Vec<CollaboratorWithdrawal>,
    pub paths: Vec<PathBuf>,
    pub steps: Vec<StepStatus>,
    pub config: Option<AlmoxConfig>,
    pub messages: Vec<CmdMessage>,
}

impl CmdResult {
    pub fn add_message(&mut self, message: CmdMessage) {
        self.messages.push(message);
    }

    pub fn with_listed_items(mut self, items: Vec<StockItem>) -> Self {
        self.listed_items = items;
        self
    }

    pub fn with_epis(mut self, epis: Vec<EpiItem>) -> Self {
        self.epis = epis;
        self
    }

    pub fn with_config(mut self, config: AlmoxConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Record a step; a failed one also leaves an error message.
    pub fn record_step(&mut self, label: &'static str, outcome: crate::error::Result<()>) -> bool {
        let error = outcome.err().map(|e| e.to_string());
        if let Some(e) = &error {
            tracing::warn!(step = label, "step failed: {}", e);
            self.add_message(CmdMessage::error(format!("{} failed: {}", label, e)));
        }
        let ok = error.is_none();
        self.steps.push(StepStatus { label, error });
        ok
    }

    pub fn has_failed_steps(&self) -> bool {
        self.steps.iter().any(|s| !s.ok())
    }

    /// Surface read warnings from a table load.
    pub fn note_read<T>(&mut self, table: Table, data: &TableData<T>) {
        for warning in &data.warnings {
            self.add_message(CmdMessage::warning(format!("{}: {}", table, warning)));
        }
    }

    pub(crate) fn warn_inconsistent(&mut self) {
        self.add_message(CmdMessage::warning(
            "The operation was only partially saved. Check the data manually.",
        ));
    }
}
