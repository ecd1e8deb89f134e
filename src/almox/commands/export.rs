use super::{CmdMessage, CmdResult, QTY_EPSILON};
use crate::codec::{parse_stored_decimal, Record, TableRecord};
use crate::error::{AlmoxError, Result};
use crate::model::{EntradaRecord, EpiItem, SaidaRecord, StockItem, REPORTS_DIR};
use crate::store::backend::StorageBackend;
use crate::store::Store;
use chrono::NaiveDate;
use rust_xlsxwriter::Workbook;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const OUT_OF_STOCK_TITLE: &str = "Relatório de produtos esgotados";
pub const NONE_OUT_OF_STOCK: &str = "Nenhum produto esgotado.";
const RULE_WIDTH: usize = 40;
const MAX_SHEET_NAME: usize = 31;

pub fn snapshot_path(today: NaiveDate) -> PathBuf {
    PathBuf::from(REPORTS_DIR).join(format!(
        "Relatorio_Almoxarifado_{}.xlsx",
        today.format("%Y-%m-%d")
    ))
}

pub fn out_of_stock_path(today: NaiveDate) -> PathBuf {
    PathBuf::from(REPORTS_DIR).join(format!(
        "Produtos_Esgotados_{}.txt",
        today.format("%Y-%m-%d")
    ))
}

/// Strips the characters spreadsheets refuse in sheet names and caps the
/// length.
pub fn sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(MAX_SHEET_NAME)
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim().to_string();
    if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned
    }
}

fn add_sheet<T: TableRecord, B: StorageBackend>(
    workbook: &mut Workbook,
    store: &Store<B>,
    result: &mut CmdResult,
) -> Result<bool> {
    let table = store.load::<T>();
    if table.degraded {
        warn!(table = %T::TABLE, "skipping unreadable table in export");
        result.add_message(CmdMessage::warning(format!(
            "{} skipped: {}",
            T::TABLE,
            table.warnings.join("; ")
        )));
        return Ok(false);
    }
    result.note_read(T::TABLE, &table);

    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name(T::TABLE.name()))?;

    for (col, header) in T::COLUMNS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    for (i, row) in table.rows.iter().enumerate() {
        let line = (i + 1) as u32;
        for (col, cell) in row.to_row().into_iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let col_num = col as u16;
            let numeric = T::COLUMNS
                .get(col)
                .map_or(false, |c| T::NUMERIC_COLUMNS.contains(c));
            match parse_stored_decimal(&cell).filter(|_| numeric) {
                Some(value) => sheet.write_number(line, col_num, value)?,
                None => sheet.write_string(line, col_num, cell)?,
            };
        }
    }
    debug!(table = %T::TABLE, rows = table.rows.len(), "sheet written");
    Ok(true)
}

/// One sheet per table, read fresh, saved under `Relatorios/`.
pub fn export_snapshot<B: StorageBackend>(store: &Store<B>, today: NaiveDate) -> Result<CmdResult> {
    let mut result = CmdResult::default();
    let mut workbook = Workbook::new();

    let mut sheets = 0;
    for added in [
        add_sheet::<StockItem, B>(&mut workbook, store, &mut result)?,
        add_sheet::<EntradaRecord, B>(&mut workbook, store, &mut result)?,
        add_sheet::<SaidaRecord, B>(&mut workbook, store, &mut result)?,
        add_sheet::<EpiItem, B>(&mut workbook, store, &mut result)?,
    ] {
        if added {
            sheets += 1;
        }
    }
    if sheets == 0 {
        return Err(AlmoxError::Store(
            "No table could be read; report not written".to_string(),
        ));
    }

    let bytes = workbook.save_to_buffer()?;
    let path = snapshot_path(today);
    store.backend().write(&path, &bytes)?;

    let location = store.location(&path);
    result.add_message(CmdMessage::success(format!(
        "Report exported to {}",
        location.display()
    )));
    result.paths.push(location);
    Ok(result)
}

/// Items with quantity <= 0.
pub fn out_of_stock(items: &[StockItem]) -> Vec<StockItem> {
    items
        .iter()
        .filter(|item| item.quantity <= QTY_EPSILON)
        .cloned()
        .collect()
}

pub fn render_out_of_stock(items: &[StockItem]) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let mut text = format!("{}\n{}\n", OUT_OF_STOCK_TITLE, rule);
    if items.is_empty() {
        text.push_str(NONE_OUT_OF_STOCK);
        text.push('\n');
    }
    for item in items {
        text.push_str(&format!(
            "Código: {} | Descrição: {}\n",
            item.code, item.description
        ));
    }
    text.push_str(&rule);
    text.push('\n');
    text
}

pub fn export_out_of_stock<B: StorageBackend>(
    store: &Store<B>,
    today: NaiveDate,
) -> Result<CmdResult> {
    let ledger = store.load::<StockItem>();
    if ledger.degraded {
        return Err(AlmoxError::Store(format!(
            "Stock ledger could not be read: {}",
            ledger.warnings.join("; ")
        )));
    }
    let mut result = CmdResult::default();
    result.note_read(StockItem::TABLE, &ledger);

    let missing = out_of_stock(&ledger.rows);
    let path = out_of_stock_path(today);
    store
        .backend()
        .write(&path, render_out_of_stock(&missing).as_bytes())?;

    let location = store.location(&path);
    if missing.is_empty() {
        result.add_message(CmdMessage::info(NONE_OUT_OF_STOCK));
    } else {
        result.add_message(CmdMessage::warning(format!(
            "{} item(s) out of stock",
            missing.len()
        )));
    }
    result.add_message(CmdMessage::success(format!(
        "Out-of-stock list exported to {}",
        location.display()
    )));
    result.paths.push(location);
    Ok(result.with_listed_items(missing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Table;
    use crate::store::mem_backend::MemBackend;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn item(code: &str, quantity: f64) -> StockItem {
        StockItem {
            code: code.into(),
            description: format!("ITEM {}", code),
            classification: None,
            unit_value: 1.0,
            total_value: quantity,
            quantity,
            last_modified: String::new(),
            location: String::new(),
            references: vec![],
        }
    }

    #[test]
    fn sheet_names_are_sanitized() {
        assert_eq!(sheet_name("Estoque"), "Estoque");
        assert_eq!(sheet_name("a/b:c*d?[e]\\"), "abcde");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
        assert_eq!(sheet_name("[]"), "Sheet");
    }

    #[test]
    fn snapshot_writes_dated_workbook() {
        let store = Store::with_backend(MemBackend::new());
        store.save(&[item("1", 2.0)]).unwrap();

        let res = export_snapshot(&store, day()).unwrap();
        let bytes = store
            .backend()
            .contents(&PathBuf::from("Relatorios/Relatorio_Almoxarifado_2025-03-01.xlsx"))
            .unwrap();
        assert!(bytes.starts_with(b"PK"));
        assert_eq!(res.paths.len(), 1);
    }

    #[test]
    fn snapshot_skips_unreadable_tables() {
        let store = Store::with_backend(MemBackend::new());
        store
            .backend()
            .write(&Table::Saida.path(), b"CODIGO\n\xff\n")
            .unwrap();

        let res = export_snapshot(&store, day()).unwrap();
        assert!(res
            .messages
            .iter()
            .any(|m| m.content.starts_with("Saida skipped")));
    }

    #[test]
    fn out_of_stock_lists_empty_items() {
        let store = Store::with_backend(MemBackend::new());
        store
            .save(&[item("1", 0.0), item("2", 3.0), item("3", 0.0)])
            .unwrap();

        let res = export_out_of_stock(&store, day()).unwrap();
        assert_eq!(res.listed_items.len(), 2);

        let text = String::from_utf8(
            store
                .backend()
                .contents(&out_of_stock_path(day()))
                .unwrap(),
        )
        .unwrap();
        let rule = "-".repeat(40);
        assert_eq!(
            text,
            format!(
                "{}\n{}\nCódigo: 1 | Descrição: ITEM 1\nCódigo: 3 | Descrição: ITEM 3\n{}\n",
                OUT_OF_STOCK_TITLE, rule, rule
            )
        );
    }

    #[test]
    fn out_of_stock_sentinel_when_none() {
        let store = Store::with_backend(MemBackend::new());
        store.save(&[item("1", 1.0)]).unwrap();

        export_out_of_stock(&store, day()).unwrap();
        let text = String::from_utf8(
            store
                .backend()
                .contents(&out_of_stock_path(day()))
                .unwrap(),
        )
        .unwrap();
        assert!(text.contains(NONE_OUT_OF_STOCK));
        assert!(!text.contains("Código:"));
    }

    #[test]
    fn out_of_stock_refuses_corrupt_ledger() {
        let store = Store::with_backend(MemBackend::new());
        store
            .backend()
            .write(&Table::Estoque.path(), b"\xff\xfe")
            .unwrap();
        assert!(export_out_of_stock(&store, day()).is_err());
        assert!(!store.backend().exists(&out_of_stock_path(day())));
    }
}
