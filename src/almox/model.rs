use crate::codec::{format_decimal, Record, Row, TableRecord};
use crate::reflist;
use chrono::{DateTime, Datelike, Local, TimeZone};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const SHEETS_DIR: &str = "Planilhas";
pub const COLLABORATORS_DIR: &str = "Colaboradores";
pub const BACKUPS_DIR: &str = "Backups";
pub const REPORTS_DIR: &str = "Relatorios";

/// Format of the `DATA` column written on every mutation.
pub const TIMESTAMP_FORMAT: &str = "%H:%M %d/%m/%Y";

pub fn timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn now_timestamp() -> String {
    timestamp(&Local::now())
}

/// The flat tables kept under `Planilhas/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Table {
    Estoque,
    Entrada,
    Saida,
    Epis,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::Estoque, Table::Entrada, Table::Saida, Table::Epis];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Estoque => "Estoque",
            Table::Entrada => "Entrada",
            Table::Saida => "Saida",
            Table::Epis => "Epis",
        }
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(SHEETS_DIR).join(format!("{}.csv", self.name()))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Classification {
    Ativo,
    Consumivel,
    Preventivo,
    /// A value this version does not know, kept verbatim so rewrites
    /// preserve it.
    Other(String),
}

impl Classification {
    pub const ALL: [Classification; 3] = [
        Classification::Ativo,
        Classification::Consumivel,
        Classification::Preventivo,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Classification::Ativo => "ATIVO",
            Classification::Consumivel => "CONSUMIVEL",
            Classification::Preventivo => "PREVENTIVO",
            Classification::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ATIVO" => Ok(Classification::Ativo),
            "CONSUMIVEL" | "CONSUMÍVEL" => Ok(Classification::Consumivel),
            "PREVENTIVO" => Ok(Classification::Preventivo),
            other => Err(format!(
                "Unknown classification '{}' (expected ATIVO, CONSUMIVEL or PREVENTIVO)",
                other
            )),
        }
    }
}

/// A row of the stock ledger (`Estoque.csv`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockItem {
    pub code: String,
    pub description: String,
    pub classification: Option<Classification>,
    pub unit_value: f64,
    pub total_value: f64,
    pub quantity: f64,
    pub last_modified: String,
    pub location: String,
    pub references: Vec<String>,
}

impl StockItem {
    /// Sets a new quantity, keeping the derived total and timestamp in step.
    pub fn restock(&mut self, quantity: f64, stamp: String) {
        self.quantity = quantity;
        self.recompute_total();
        self.last_modified = stamp;
    }

    pub fn recompute_total(&mut self) {
        self.total_value = self.unit_value * self.quantity;
    }
}

impl Record for StockItem {
    const COLUMNS: &'static [&'static str] = &[
        "CODIGO",
        "DESCRICAO",
        "CLASSIFICACAO",
        "VALOR UN",
        "VALOR TOTAL",
        "QUANTIDADE",
        "DATA",
        "LOCALIZACAO",
        "NF/PEDIDO",
    ];
    const NUMERIC_COLUMNS: &'static [&'static str] = &["VALOR UN", "VALOR TOTAL", "QUANTIDADE"];

    fn from_row(row: &mut Row<'_>) -> Self {
        let raw_class = row.text("CLASSIFICACAO");
        let classification = if raw_class.is_empty() {
            None
        } else {
            match raw_class.parse() {
                Ok(c) => Some(c),
                Err(e) => {
                    row.warn(e);
                    Some(Classification::Other(raw_class))
                }
            }
        };

        StockItem {
            code: row.text("CODIGO"),
            description: row.text("DESCRICAO"),
            classification,
            unit_value: row.decimal("VALOR UN"),
            total_value: row.decimal("VALOR TOTAL"),
            quantity: row.decimal("QUANTIDADE"),
            last_modified: row.text("DATA"),
            location: row.text("LOCALIZACAO"),
            references: reflist::decode(&row.text("NF/PEDIDO")),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            self.description.clone(),
            self.classification
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_default(),
            format_decimal(self.unit_value),
            format_decimal(self.total_value),
            format_decimal(self.quantity),
            self.last_modified.clone(),
            self.location.clone(),
            reflist::encode(&self.references),
        ]
    }
}

impl TableRecord for StockItem {
    const TABLE: Table = Table::Estoque;
}

/// A stock-in journal row (`Entrada.csv`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntradaRecord {
    pub code: String,
    pub description: String,
    pub classification: String,
    pub quantity: f64,
    pub unit_value: f64,
    pub line_total: f64,
    pub timestamp: String,
    pub operator: String,
    pub po_reference: String,
    pub issue_date: String,
}

impl Record for EntradaRecord {
    const COLUMNS: &'static [&'static str] = &[
        "CODIGO",
        "DESCRICAO",
        "CLASSIFICACAO",
        "QUANTIDADE",
        "VALOR UN",
        "VALOR TOTAL",
        "DATA",
        "OPERADOR",
        "NF/PEDIDO",
        "DATA EMISSAO",
    ];
    const NUMERIC_COLUMNS: &'static [&'static str] = &["QUANTIDADE", "VALOR UN", "VALOR TOTAL"];

    fn from_row(row: &mut Row<'_>) -> Self {
        EntradaRecord {
            code: row.text("CODIGO"),
            description: row.text("DESCRICAO"),
            classification: row.text("CLASSIFICACAO"),
            quantity: row.decimal("QUANTIDADE"),
            unit_value: row.decimal("VALOR UN"),
            line_total: row.decimal("VALOR TOTAL"),
            timestamp: row.text("DATA"),
            operator: row.text("OPERADOR"),
            po_reference: row.text("NF/PEDIDO"),
            issue_date: row.text("DATA EMISSAO"),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            self.description.clone(),
            self.classification.clone(),
            format_decimal(self.quantity),
            format_decimal(self.unit_value),
            format_decimal(self.line_total),
            self.timestamp.clone(),
            self.operator.clone(),
            self.po_reference.clone(),
            self.issue_date.clone(),
        ]
    }
}

impl TableRecord for EntradaRecord {
    const TABLE: Table = Table::Entrada;
}

/// A stock-out journal row (`Saida.csv`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaidaRecord {
    pub code: String,
    pub description: String,
    pub quantity: f64,
    pub value: f64,
    pub requester: String,
    pub sector: String,
    pub po_reference: String,
    pub timestamp: String,
    pub operator: String,
}

impl Record for SaidaRecord {
    const COLUMNS: &'static [&'static str] = &[
        "CODIGO",
        "DESCRICAO",
        "QUANTIDADE",
        "VALOR",
        "SOLICITANTE",
        "SETOR",
        "NF/PEDIDO",
        "DATA",
        "OPERADOR",
    ];
    const NUMERIC_COLUMNS: &'static [&'static str] = &["QUANTIDADE", "VALOR"];

    fn from_row(row: &mut Row<'_>) -> Self {
        SaidaRecord {
            code: row.text("CODIGO"),
            description: row.text("DESCRICAO"),
            quantity: row.decimal("QUANTIDADE"),
            value: row.decimal("VALOR"),
            requester: row.text("SOLICITANTE"),
            sector: row.text("SETOR"),
            po_reference: row.text("NF/PEDIDO"),
            timestamp: row.text("DATA"),
            operator: row.text("OPERADOR"),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            self.description.clone(),
            format_decimal(self.quantity),
            format_decimal(self.value),
            self.requester.clone(),
            self.sector.clone(),
            self.po_reference.clone(),
            self.timestamp.clone(),
            self.operator.clone(),
        ]
    }
}

impl TableRecord for SaidaRecord {
    const TABLE: Table = Table::Saida;
}

/// A row of the EPI ledger (`Epis.csv`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpiItem {
    pub ca: String,
    pub description: String,
    pub quantity: f64,
}

impl EpiItem {
    /// CA when present, description otherwise.
    pub fn label(&self) -> String {
        if self.ca.is_empty() {
            self.description.clone()
        } else if self.description.is_empty() {
            format!("CA {}", self.ca)
        } else {
            format!("CA {} - {}", self.ca, self.description)
        }
    }
}

impl Record for EpiItem {
    const COLUMNS: &'static [&'static str] = &["CA", "DESCRICAO", "QUANTIDADE"];
    const NUMERIC_COLUMNS: &'static [&'static str] = &["QUANTIDADE"];

    fn from_row(row: &mut Row<'_>) -> Self {
        EpiItem {
            ca: row.text("CA"),
            description: row.text("DESCRICAO"),
            quantity: row.decimal("QUANTIDADE"),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.ca.clone(),
            self.description.clone(),
            format_decimal(self.quantity),
        ]
    }
}

impl TableRecord for EpiItem {
    const TABLE: Table = Table::Epis;
}

/// One EPI handed to a collaborator, kept in that collaborator's month file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollaboratorWithdrawal {
    pub ca: String,
    pub description: String,
    pub quantity: f64,
    pub timestamp: String,
}

impl Record for CollaboratorWithdrawal {
    const COLUMNS: &'static [&'static str] = &["CA", "DESCRICAO", "QUANTIDADE", "DATA"];
    const NUMERIC_COLUMNS: &'static [&'static str] = &["QUANTIDADE"];

    fn from_row(row: &mut Row<'_>) -> Self {
        CollaboratorWithdrawal {
            ca: row.text("CA"),
            description: row.text("DESCRICAO"),
            quantity: row.decimal("QUANTIDADE"),
            timestamp: row.text("DATA"),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.ca.clone(),
            self.description.clone(),
            format_decimal(self.quantity),
            self.timestamp.clone(),
        ]
    }
}

/// Folder-safe form of a collaborator name: uppercased, whitespace runs
/// collapsed to `_`, anything but alphanumerics, `_` and `-` dropped.
pub fn sanitize_collaborator_name(name: &str) -> String {
    name.split_whitespace()
        .map(|part| {
            part.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                .collect::<String>()
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

pub fn collaborator_dir(sanitized: &str) -> PathBuf {
    PathBuf::from(COLLABORATORS_DIR).join(sanitized)
}

/// `Colaboradores/<NAME>/<NAME>_<YYYY_MM>.csv`
pub fn collaborator_journal_path<D: Datelike>(sanitized: &str, month: &D) -> PathBuf {
    collaborator_dir(sanitized).join(format!(
        "{}_{:04}_{:02}.csv",
        sanitized,
        month.year(),
        month.month()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn classification_parses_case_insensitively() {
        assert_eq!(
            "consumivel".parse::<Classification>().unwrap(),
            Classification::Consumivel
        );
        assert_eq!(
            " Ativo ".parse::<Classification>().unwrap(),
            Classification::Ativo
        );
        assert!("FERRAMENTA".parse::<Classification>().is_err());
    }

    #[test]
    fn unknown_classification_survives_a_rewrite() {
        let bytes = b"CODIGO,DESCRICAO,CLASSIFICACAO,QUANTIDADE\n1,MARTELO,FERRAMENTA,1\n";
        let decoded = crate::codec::decode::<StockItem>(Some(bytes));
        assert_eq!(decoded.warnings.len(), 1);
        assert_eq!(
            decoded.rows[0].classification,
            Some(Classification::Other("FERRAMENTA".into()))
        );
        assert_eq!(decoded.rows[0].to_row()[2], "FERRAMENTA");
    }

    #[test]
    fn restock_recomputes_total() {
        let mut item = StockItem {
            code: "1".into(),
            description: "PARAFUSO".into(),
            classification: None,
            unit_value: 2.5,
            total_value: 0.0,
            quantity: 0.0,
            last_modified: String::new(),
            location: String::new(),
            references: vec![],
        };
        item.restock(15.0, "10:00 01/02/2025".into());
        assert_eq!(item.total_value, 37.5);
        assert_eq!(item.last_modified, "10:00 01/02/2025");
    }

    #[test]
    fn sanitizes_collaborator_names() {
        assert_eq!(sanitize_collaborator_name("  João  da Silva "), "JOÃO_DA_SILVA");
        assert_eq!(sanitize_collaborator_name("ana/../maria"), "ANAMARIA");
        assert_eq!(sanitize_collaborator_name("   "), "");
    }

    #[test]
    fn collaborator_path_uses_year_month() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let path = collaborator_journal_path("ANA", &date);
        assert_eq!(
            path,
            PathBuf::from("Colaboradores").join("ANA").join("ANA_2025_03.csv")
        );
    }

    #[test]
    fn epi_label_prefers_ca() {
        let epi = EpiItem {
            ca: "123".into(),
            description: "LUVA".into(),
            quantity: 1.0,
        };
        assert_eq!(epi.label(), "CA 123 - LUVA");
    }
}
