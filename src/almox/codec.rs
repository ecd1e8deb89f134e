//! # Record Codec
//!
//! Converts between the CSV text of a table and typed rows.
//!
//! Columns are matched **by header name** rather than by position, so files
//! written before a column was added (no `CLASSIFICACAO`, no `NF/PEDIDO`) still
//! load; the missing cells simply read as empty. Writing always emits the
//! canonical header in canonical order.
//!
//! Reading never fails:
//! - absent or blank file: empty table
//! - non-numeric value in a numeric column: `0` plus a per-line warning
//! - unreadable bytes (bad UTF-8, broken quoting): empty table marked
//!   `degraded`, with a warning
//!
//! Callers that rewrite a table must refuse to do so when it is `degraded`,
//! otherwise a corrupt file would be replaced by an empty one.

use crate::error::{AlmoxError, Result};
use crate::model::Table;
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use std::collections::HashMap;

/// A typed row with a fixed canonical column set.
pub trait Record: Sized {
    const COLUMNS: &'static [&'static str];

    /// Columns written as numbers in spreadsheet exports.
    const NUMERIC_COLUMNS: &'static [&'static str] = &[];

    fn from_row(row: &mut Row<'_>) -> Self;

    /// Cell values in `COLUMNS` order.
    fn to_row(&self) -> Vec<String>;
}

/// A record that lives in one of the fixed tables.
pub trait TableRecord: Record {
    const TABLE: Table;
}

/// Column access for one CSV line during decoding.
pub struct Row<'a> {
    line: usize,
    headers: &'a HashMap<String, usize>,
    record: &'a StringRecord,
    warnings: &'a mut Vec<String>,
}

impl Row<'_> {
    pub fn text(&self, column: &str) -> String {
        self.headers
            .get(column)
            .and_then(|&i| self.record.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    pub fn decimal(&mut self, column: &str) -> f64 {
        let raw = self.text(column);
        if raw.is_empty() {
            return 0.0;
        }
        match parse_stored_decimal(&raw) {
            Some(value) => value,
            None => {
                self.warn(format!("{} value '{}' is not a number, read as 0", column, raw));
                0.0
            }
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings
            .push(format!("line {}: {}", self.line, message.into()));
    }
}

/// Result of decoding a table.
#[derive(Debug, Clone)]
pub struct TableData<T> {
    pub rows: Vec<T>,
    pub warnings: Vec<String>,
    pub missing_columns: Vec<&'static str>,
    pub degraded: bool,
}

impl<T> TableData<T> {
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            warnings: Vec::new(),
            missing_columns: Vec::new(),
            degraded: false,
        }
    }

    /// An empty table standing in for a file that could not be read.
    pub fn unreadable(warning: String) -> Self {
        Self {
            rows: Vec::new(),
            warnings: vec![warning],
            missing_columns: Vec::new(),
            degraded: true,
        }
    }
}

fn header_map(headers: &StringRecord) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (i, name) in headers.iter().enumerate() {
        map.entry(normalize_header(name)).or_insert(i);
    }
    map
}

fn normalize_header(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_uppercase()
}

/// Decodes the bytes of a table file. `None` means the file does not exist.
pub fn decode<T: Record>(bytes: Option<&[u8]>) -> TableData<T> {
    let Some(bytes) = bytes else {
        return TableData::empty();
    };

    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => return TableData::unreadable(format!("file is not valid UTF-8: {}", e)),
    };
    if text.trim().is_empty() {
        return TableData::empty();
    }

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => return TableData::unreadable(format!("unreadable header: {}", e)),
    };
    let map = header_map(&headers);

    let mut data = TableData::empty();
    data.missing_columns = T::COLUMNS
        .iter()
        .copied()
        .filter(|c| !map.contains_key(*c))
        .collect();

    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => return TableData::unreadable(format!("corrupt row {}: {}", i + 2, e)),
        };
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let mut row = Row {
            line: i + 2,
            headers: &map,
            record: &record,
            warnings: &mut data.warnings,
        };
        data.rows.push(T::from_row(&mut row));
    }

    data
}

fn writer() -> csv::Writer<Vec<u8>> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer.into_inner().map_err(|e| AlmoxError::Io(e.into_error()))
}

fn fit(mut cells: Vec<String>, width: usize) -> Vec<String> {
    cells.resize(width, String::new());
    cells
}

/// Encodes a whole table, header included.
pub fn encode<T: Record>(rows: &[T]) -> Result<Vec<u8>> {
    let mut w = writer();
    w.write_record(T::COLUMNS)?;
    for row in rows {
        w.write_record(fit(row.to_row(), T::COLUMNS.len()))?;
    }
    finish(w)
}

/// Encodes a single line (no header) for appending to an existing file.
pub fn encode_line<T: Record>(row: &T) -> Result<Vec<u8>> {
    let mut w = writer();
    w.write_record(fit(row.to_row(), T::COLUMNS.len()))?;
    finish(w)
}

/// Whether the file's header starts with the canonical columns in order, so
/// new lines can be appended without realigning existing rows.
pub fn has_canonical_prefix<T: Record>(bytes: &[u8]) -> bool {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(bytes);
    match reader.headers() {
        Ok(headers) => starts_with_columns(headers, T::COLUMNS),
        Err(_) => false,
    }
}

fn starts_with_columns(headers: &StringRecord, columns: &[&str]) -> bool {
    headers.len() >= columns.len()
        && headers
            .iter()
            .zip(columns)
            .all(|(found, wanted)| normalize_header(found) == *wanted)
}

/// Rewrites a table so it starts with the canonical columns in order, filling
/// any column the file lacks with `placeholder`. Existing values and extra
/// columns (moved after the canonical ones) are kept. Returns `None` when the
/// header already starts with the canonical columns.
pub fn normalize_columns(
    bytes: &[u8],
    columns: &[&str],
    placeholder: &str,
) -> Result<Option<Vec<u8>>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();
    let map = header_map(&headers);

    if starts_with_columns(&headers, columns) {
        return Ok(None);
    }

    let extras: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            let name = normalize_header(name);
            !columns.iter().any(|c| *c == name)
        })
        .map(|(i, _)| i)
        .collect();

    let mut w = writer();
    let mut out_header: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    out_header.extend(extras.iter().map(|&i| headers[i].trim().to_string()));
    w.write_record(&out_header)?;

    for result in reader.records() {
        let record = result?;
        let mut cells: Vec<String> = columns
            .iter()
            .map(|c| match map.get(*c) {
                Some(&i) => record.get(i).unwrap_or_default().to_string(),
                None => placeholder.to_string(),
            })
            .collect();
        cells.extend(
            extras
                .iter()
                .map(|&i| record.get(i).unwrap_or_default().to_string()),
        );
        w.write_record(&cells)?;
    }

    finish(w).map(Some)
}

/// Parses a decimal as stored in a table (dot separator only).
pub fn parse_stored_decimal(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Renders a decimal for storage, shortest form that parses back to the
/// same value. Never uses an exponent.
pub fn format_decimal(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}

/// Renders a decimal for messages and listings: at most 4 places.
pub fn display_decimal(value: f64) -> String {
    format_decimal((value * 10_000.0).round() / 10_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntradaRecord, EpiItem, StockItem};

    fn item(code: &str, description: &str) -> StockItem {
        StockItem {
            code: code.into(),
            description: description.into(),
            classification: Some(crate::model::Classification::Consumivel),
            unit_value: 2.5,
            total_value: 25.0,
            quantity: 10.0,
            last_modified: "09:30 01/02/2025".into(),
            location: "A1".into(),
            references: vec!["NF1".into(), "PED 2".into()],
        }
    }

    #[test]
    fn round_trips_a_table() {
        let rows = vec![item("1", "PARAFUSO"), item("2", "PORCA, SEXTAVADA \"M8\"")];
        let bytes = encode(&rows).unwrap();
        let decoded = decode::<StockItem>(Some(&bytes));

        assert!(decoded.warnings.is_empty());
        assert!(!decoded.degraded);
        assert!(decoded.missing_columns.is_empty());
        assert_eq!(decoded.rows, rows);
    }

    #[test]
    fn missing_file_is_an_empty_table() {
        let decoded = decode::<StockItem>(None);
        assert!(decoded.rows.is_empty());
        assert!(!decoded.degraded);

        let blank = decode::<StockItem>(Some(b"  \n"));
        assert!(blank.rows.is_empty());
        assert!(!blank.degraded);
    }

    #[test]
    fn keeps_leading_zeros_in_codes() {
        let bytes = b"CODIGO,DESCRICAO,QUANTIDADE\n007,LIXA,3\n";
        let decoded = decode::<StockItem>(Some(bytes));
        assert_eq!(decoded.rows[0].code, "007");
        assert_eq!(decoded.rows[0].quantity, 3.0);
    }

    #[test]
    fn legacy_header_maps_by_name() {
        let bytes = "CODIGO,DESCRICAO,VALOR UN,VALOR TOTAL,QUANTIDADE,DATA,LOCALIZACAO\n\
                     3,FITA,1.5,3.0,2,10:00 01/01/2024,B2\n";
        let decoded = decode::<StockItem>(Some(bytes.as_bytes()));

        assert_eq!(decoded.missing_columns, vec!["CLASSIFICACAO", "NF/PEDIDO"]);
        let row = &decoded.rows[0];
        assert_eq!(row.location, "B2");
        assert_eq!(row.unit_value, 1.5);
        assert_eq!(row.classification, None);
        assert!(row.references.is_empty());
    }

    #[test]
    fn coerces_bad_numbers_with_warning() {
        let bytes = b"CA,DESCRICAO,QUANTIDADE\n123,LUVA,muitas\n";
        let decoded = decode::<EpiItem>(Some(bytes));
        assert_eq!(decoded.rows[0].quantity, 0.0);
        assert_eq!(decoded.warnings.len(), 1);
        assert!(decoded.warnings[0].starts_with("line 2:"));
        assert!(!decoded.degraded);
    }

    #[test]
    fn invalid_utf8_degrades() {
        let bytes = b"CA,DESCRICAO,QUANTIDADE\n\xff\xfe,LUVA,1\n";
        let decoded = decode::<EpiItem>(Some(bytes));
        assert!(decoded.degraded);
        assert!(decoded.rows.is_empty());
        assert_eq!(decoded.warnings.len(), 1);
    }

    #[test]
    fn encode_pads_short_rows_and_quotes_minimally() {
        let rows = vec![EpiItem {
            ca: "1".into(),
            description: "LUVA, NITRILICA".into(),
            quantity: 4.0,
        }];
        let text = String::from_utf8(encode(&rows).unwrap()).unwrap();
        assert_eq!(text, "CA,DESCRICAO,QUANTIDADE\n1,\"LUVA, NITRILICA\",4\n");
    }

    #[test]
    fn detects_canonical_prefix() {
        let canonical = encode::<EpiItem>(&[]).unwrap();
        assert!(has_canonical_prefix::<EpiItem>(&canonical));
        assert!(has_canonical_prefix::<EpiItem>(b"CA,DESCRICAO,QUANTIDADE,OBS\n"));
        assert!(!has_canonical_prefix::<EpiItem>(b"CA,DESCRICAO\n"));
        assert!(!has_canonical_prefix::<EpiItem>(b"DESCRICAO,CA,QUANTIDADE\n"));
    }

    #[test]
    fn normalizes_legacy_journal_columns() {
        let legacy = b"CODIGO,DESCRICAO,QUANTIDADE,VALOR UN,VALOR TOTAL,DATA\n1,FITA,2,1.5,3,10:00 01/01/2024\n";
        let fixed = normalize_columns(legacy, EntradaRecord::COLUMNS, "-")
            .unwrap()
            .expect("columns were missing");

        let decoded = decode::<EntradaRecord>(Some(&fixed));
        assert!(decoded.missing_columns.is_empty());
        let row = &decoded.rows[0];
        assert_eq!(row.code, "1");
        assert_eq!(row.quantity, 2.0);
        assert_eq!(row.operator, "-");
        assert_eq!(row.issue_date, "-");

        assert!(normalize_columns(&fixed, EntradaRecord::COLUMNS, "-")
            .unwrap()
            .is_none());
    }

    #[test]
    fn formats_decimals() {
        assert_eq!(format_decimal(25.0), "25");
        assert_eq!(format_decimal(37.5), "37.5");
        assert_eq!(format_decimal(0.00004), "0.00004");
        assert_eq!(format_decimal(-0.0), "0");
        assert_eq!(display_decimal(0.1 + 0.2), "0.3");
        assert_eq!(display_decimal(0.00004), "0");
    }

    #[test]
    fn stored_decimals_keep_full_precision() {
        let mut micro = item("1", "MICRO");
        micro.unit_value = 0.00004;
        micro.quantity = 1000.0;
        micro.recompute_total();

        let mut odd = item("2", "ODD");
        odd.unit_value = 0.1 + 0.2;
        odd.recompute_total();

        let rows = vec![micro, odd];
        let decoded = decode::<StockItem>(Some(&encode(&rows).unwrap()));
        assert_eq!(decoded.rows, rows);
        for row in &decoded.rows {
            assert_eq!(row.total_value, row.unit_value * row.quantity);
        }
        assert_eq!(decoded.rows[0].unit_value, 0.00004);
    }
}
