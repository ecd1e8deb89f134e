use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlmoxError {
    #[error("{0}")]
    Validation(String),

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Insufficient stock for {key}: requested {requested}, available {available}")]
    InsufficientStock {
        key: String,
        requested: f64,
        available: f64,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Spreadsheet export error: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),

    #[error("Store error: {0}")]
    Store(String),
}

impl AlmoxError {
    pub fn validation(message: impl Into<String>) -> Self {
        AlmoxError::Validation(message.into())
    }

    pub fn item_not_found(code: &str) -> Self {
        AlmoxError::NotFound {
            kind: "Item",
            key: code.to_string(),
        }
    }

    pub fn epi_not_found(identifier: &str) -> Self {
        AlmoxError::NotFound {
            kind: "EPI",
            key: identifier.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AlmoxError>;
