//! Stock-in and stock-out movements.
//!
//! A movement touches two or three files in a fixed order: the journal row is
//! appended first, then the ledger quantity is rewritten, then (stock-in only)
//! the PO/NF reference is added to the item. Only the first step aborts the
//! operation; later failures are reported as failed steps and nothing already
//! written is undone.

use super::{ledger, CmdMessage, CmdResult, QTY_EPSILON};
use crate::codec::display_decimal;
use crate::error::{AlmoxError, Result};
use crate::model::{now_timestamp, EntradaRecord, SaidaRecord, StockItem, Table};
use crate::store::backend::StorageBackend;
use crate::store::Store;
use crate::validation::{issue_date, optional_text, require_positive, require_text};

#[derive(Debug, Clone)]
pub struct EntradaInput {
    pub code: String,
    pub quantity: f64,
    pub operator: String,
    pub po_reference: Option<String>,
    /// `HH:MM DD/MM/YY`, blank when unknown.
    pub issue_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SaidaInput {
    pub code: String,
    pub quantity: f64,
    pub requester: String,
    pub sector: String,
    pub po_reference: Option<String>,
    pub operator: String,
}

fn find_for_update<B: StorageBackend>(store: &Store<B>, code: &str) -> Result<StockItem> {
    let code = code.trim();
    store
        .load_for_update::<StockItem>()?
        .rows
        .into_iter()
        .find(|item| item.code == code)
        .ok_or_else(|| AlmoxError::item_not_found(code))
}

pub fn record_entrada<B: StorageBackend>(
    store: &Store<B>,
    input: EntradaInput,
) -> Result<CmdResult> {
    let quantity = require_positive("Quantity", input.quantity)?;
    let issue_date = issue_date(input.issue_date.as_deref())?;
    let po_reference = optional_text(input.po_reference.as_deref());
    let item = find_for_update(store, &input.code)?;

    let record = EntradaRecord {
        code: item.code.clone(),
        description: item.description.clone(),
        classification: item
            .classification
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_default(),
        quantity,
        unit_value: item.unit_value,
        line_total: quantity * item.unit_value,
        timestamp: now_timestamp(),
        operator: input.operator.trim().to_string(),
        po_reference: po_reference.clone().unwrap_or_default(),
        issue_date,
    };

    store.append(&record)?;

    let mut result = CmdResult::default();
    result.record_step("Journal append", Ok(()));

    let new_quantity = item.quantity + quantity;
    match ledger::apply_delta(store, &item.code, new_quantity) {
        Ok(updated) => {
            result.record_step("Stock update", Ok(()));
            result.affected_items.push(updated);
        }
        Err(e) => {
            result.record_step("Stock update", Err(e));
        }
    }

    if let Some(token) = &po_reference {
        let outcome = ledger::append_reference(store, &item.code, token).map(|_| ());
        result.record_step("Reference update", outcome);
    }

    if result.has_failed_steps() {
        result.warn_inconsistent();
    } else {
        result.add_message(CmdMessage::success(format!(
            "Stock-in recorded: {} x {} ({}), new quantity {}",
            display_decimal(quantity),
            item.code,
            item.description,
            display_decimal(new_quantity)
        )));
    }
    result.entradas.push(record);
    Ok(result)
}

pub fn record_saida<B: StorageBackend>(store: &Store<B>, input: SaidaInput) -> Result<CmdResult> {
    let quantity = require_positive("Quantity", input.quantity)?;
    let requester = require_text("Requester", &input.requester)?;
    let po_reference = optional_text(input.po_reference.as_deref());
    let item = find_for_update(store, &input.code)?;

    if quantity > item.quantity + QTY_EPSILON {
        return Err(AlmoxError::InsufficientStock {
            key: item.code,
            requested: quantity,
            available: item.quantity,
        });
    }

    if let Some(token) = &po_reference {
        if !item.references.iter().any(|r| r == token) {
            let known = if item.references.is_empty() {
                "none".to_string()
            } else {
                item.references.join(", ")
            };
            return Err(AlmoxError::validation(format!(
                "Reference '{}' is not linked to item {} (known: {})",
                token, item.code, known
            )));
        }
    }

    let record = SaidaRecord {
        code: item.code.clone(),
        description: item.description.clone(),
        quantity,
        value: quantity * item.unit_value,
        requester,
        sector: input.sector.trim().to_string(),
        po_reference: po_reference.unwrap_or_default(),
        timestamp: now_timestamp(),
        operator: input.operator.trim().to_string(),
    };

    store.append(&record)?;

    let mut result = CmdResult::default();
    result.record_step("Journal append", Ok(()));

    let new_quantity = (item.quantity - quantity).max(0.0);
    match ledger::apply_delta(store, &item.code, new_quantity) {
        Ok(updated) => {
            result.record_step("Stock update", Ok(()));
            result.affected_items.push(updated);
        }
        Err(e) => {
            result.record_step("Stock update", Err(e));
        }
    }

    if result.has_failed_steps() {
        result.warn_inconsistent();
    } else {
        result.add_message(CmdMessage::success(format!(
            "Stock-out recorded: {} x {} ({}) to {}, remaining {}",
            display_decimal(quantity),
            item.code,
            item.description,
            record.requester,
            display_decimal(new_quantity)
        )));
        if new_quantity <= QTY_EPSILON {
            result.add_message(CmdMessage::warning(format!(
                "Item {} is now out of stock.",
                item.code
            )));
        }
    }
    result.saidas.push(record);
    Ok(result)
}

pub fn list_entradas<B: StorageBackend>(
    store: &Store<B>,
    code: Option<&str>,
) -> Result<CmdResult> {
    let journal = store.load::<EntradaRecord>();
    let mut result = CmdResult::default();
    result.note_read(Table::Entrada, &journal);

    let code = code.map(str::trim);
    result.entradas = journal
        .rows
        .into_iter()
        .filter(|r| code.map_or(true, |c| r.code == c))
        .collect();
    if result.entradas.is_empty() {
        result.add_message(CmdMessage::info("No stock-in movements found."));
    }
    Ok(result)
}

pub fn list_saidas<B: StorageBackend>(store: &Store<B>, code: Option<&str>) -> Result<CmdResult> {
    let journal = store.load::<SaidaRecord>();
    let mut result = CmdResult::default();
    result.note_read(Table::Saida, &journal);

    let code = code.map(str::trim);
    result.saidas = journal
        .rows
        .into_iter()
        .filter(|r| code.map_or(true, |c| r.code == c))
        .collect();
    if result.saidas.is_empty() {
        result.add_message(CmdMessage::info("No stock-out movements found."));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::export;
    use crate::commands::ledger::{find_by_code, register, NewItem};
    use crate::model::Classification;
    use crate::store::mem_backend::MemBackend;
    use crate::validation::NO_DATE;

    fn store_with_item(quantity: f64, unit_value: f64) -> Store<MemBackend> {
        let store = Store::with_backend(MemBackend::new());
        register(
            &store,
            NewItem {
                description: "PARAFUSO".into(),
                classification: Some(Classification::Consumivel),
                quantity,
                unit_value,
                location: "A1".into(),
            },
            1,
        )
        .unwrap();
        store
    }

    fn entrada(code: &str, quantity: f64, po: Option<&str>) -> EntradaInput {
        EntradaInput {
            code: code.into(),
            quantity,
            operator: "ANA".into(),
            po_reference: po.map(String::from),
            issue_date: None,
        }
    }

    fn saida(code: &str, quantity: f64, po: Option<&str>) -> SaidaInput {
        SaidaInput {
            code: code.into(),
            quantity,
            requester: "JOSE".into(),
            sector: "MANUTENCAO".into(),
            po_reference: po.map(String::from),
            operator: "ANA".into(),
        }
    }

    #[test]
    fn entrada_updates_stock_and_references() {
        let store = store_with_item(10.0, 2.5);
        let res = record_entrada(&store, entrada("1", 5.0, Some("NF 77"))).unwrap();

        assert!(!res.has_failed_steps());
        assert_eq!(res.steps.len(), 3);
        let item = find_by_code(&store, "1").unwrap();
        assert_eq!(item.quantity, 15.0);
        assert_eq!(item.total_value, 37.5);
        assert_eq!(item.references, vec!["NF 77".to_string()]);

        let journal = store.load::<EntradaRecord>().rows;
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].line_total, 12.5);
        assert_eq!(journal[0].classification, "CONSUMIVEL");
        assert_eq!(journal[0].issue_date, NO_DATE);
        assert_eq!(journal[0].operator, "ANA");
    }

    #[test]
    fn entrada_without_reference_skips_third_step() {
        let store = store_with_item(1.0, 1.0);
        let res = record_entrada(&store, entrada("1", 1.0, Some("  "))).unwrap();
        assert_eq!(res.steps.len(), 2);
        assert!(find_by_code(&store, "1").unwrap().references.is_empty());
    }

    #[test]
    fn entrada_rejects_bad_input_without_writing() {
        let store = store_with_item(1.0, 1.0);

        assert!(matches!(
            record_entrada(&store, entrada("9", 1.0, None)),
            Err(AlmoxError::NotFound { .. })
        ));
        assert!(record_entrada(&store, entrada("1", 0.0, None)).is_err());

        let mut bad_date = entrada("1", 1.0, None);
        bad_date.issue_date = Some("25:00 01/01/25".into());
        assert!(matches!(
            record_entrada(&store, bad_date),
            Err(AlmoxError::Validation(_))
        ));

        assert!(!store.backend().exists(&Table::Entrada.path()));
    }

    #[test]
    fn entrada_keeps_valid_issue_date() {
        let store = store_with_item(1.0, 1.0);
        let mut input = entrada("1", 1.0, None);
        input.issue_date = Some("08:15 31/12/24".into());
        record_entrada(&store, input).unwrap();
        assert_eq!(
            store.load::<EntradaRecord>().rows[0].issue_date,
            "08:15 31/12/24"
        );
    }

    #[test]
    fn insufficient_stock_leaves_files_untouched() {
        let store = store_with_item(2.0, 1.0);
        record_entrada(&store, entrada("1", 1.0, None)).unwrap();
        record_saida(&store, saida("1", 1.0, None)).unwrap();

        let ledger_before = store.backend().contents(&Table::Estoque.path());
        let entradas_before = store.backend().contents(&Table::Entrada.path());
        let journal_before = store.backend().contents(&Table::Saida.path());
        assert!(entradas_before.is_some());

        let err = record_saida(&store, saida("1", 2.5, None)).unwrap_err();
        match err {
            AlmoxError::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 2.5);
                assert_eq!(available, 2.0);
            }
            other => panic!("unexpected error: {}", other),
        }

        assert_eq!(store.backend().contents(&Table::Estoque.path()), ledger_before);
        assert_eq!(store.backend().contents(&Table::Entrada.path()), entradas_before);
        assert_eq!(store.backend().contents(&Table::Saida.path()), journal_before);
    }

    #[test]
    fn register_move_and_report_out_of_stock() {
        let store = store_with_item(10.0, 2.5);
        let item = find_by_code(&store, "1").unwrap();
        assert_eq!(item.total_value, 25.0);

        record_entrada(&store, entrada("1", 5.0, None)).unwrap();
        let item = find_by_code(&store, "1").unwrap();
        assert_eq!((item.quantity, item.total_value), (15.0, 37.5));

        assert!(matches!(
            record_saida(&store, saida("1", 20.0, None)),
            Err(AlmoxError::InsufficientStock { .. })
        ));
        assert_eq!(find_by_code(&store, "1").unwrap().quantity, 15.0);

        record_saida(&store, saida("1", 15.0, None)).unwrap();
        let item = find_by_code(&store, "1").unwrap();
        assert_eq!((item.quantity, item.total_value), (0.0, 0.0));

        let today = chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let res = export::export_out_of_stock(&store, today).unwrap();
        assert_eq!(res.listed_items.len(), 1);
        assert_eq!(res.listed_items[0].code, "1");

        let report = store
            .backend()
            .contents(&export::out_of_stock_path(today))
            .unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("Código: 1 | Descrição: PARAFUSO"));
        assert!(!report.contains(export::NONE_OUT_OF_STOCK));
    }

    #[test]
    fn saida_can_empty_the_item() {
        let store = store_with_item(2.0, 4.0);
        let res = record_saida(&store, saida("1", 2.0, None)).unwrap();
        assert_eq!(res.saidas[0].value, 8.0);
        let item = find_by_code(&store, "1").unwrap();
        assert_eq!(item.quantity, 0.0);
        assert_eq!(item.total_value, 0.0);
        assert!(res
            .messages
            .iter()
            .any(|m| m.content.contains("out of stock")));
    }

    #[test]
    fn saida_reference_must_be_linked() {
        let store = store_with_item(5.0, 1.0);
        record_entrada(&store, entrada("1", 1.0, Some("PED-1"))).unwrap();

        assert!(matches!(
            record_saida(&store, saida("1", 1.0, Some("PED-2"))),
            Err(AlmoxError::Validation(_))
        ));
        let res = record_saida(&store, saida("1", 1.0, Some("PED-1"))).unwrap();
        assert_eq!(res.saidas[0].po_reference, "PED-1");
    }

    #[test]
    fn saida_requires_requester() {
        let store = store_with_item(5.0, 1.0);
        let mut input = saida("1", 1.0, None);
        input.requester = " ".into();
        assert!(record_saida(&store, input).is_err());
    }

    #[test]
    fn quantities_are_conserved_across_movements() {
        let store = store_with_item(10.0, 1.0);
        record_entrada(&store, entrada("1", 5.0, None)).unwrap();
        record_saida(&store, saida("1", 4.0, None)).unwrap();
        record_entrada(&store, entrada("1", 3.0, None)).unwrap();
        record_saida(&store, saida("1", 0.5, None)).unwrap();

        let entradas: f64 = store.load::<EntradaRecord>().rows.iter().map(|r| r.quantity).sum();
        let saidas: f64 = store.load::<SaidaRecord>().rows.iter().map(|r| r.quantity).sum();
        let item = find_by_code(&store, "1").unwrap();

        assert_eq!(item.quantity, 10.0 + entradas - saidas);
        assert_eq!(item.quantity, 13.5);
    }

    #[test]
    fn ledger_failure_after_journal_is_reported_not_rolled_back() {
        let store = store_with_item(10.0, 1.0);
        store.backend().fail_writes_to(Table::Estoque.path());

        let res = record_entrada(&store, entrada("1", 5.0, Some("NF1"))).unwrap();

        assert!(res.has_failed_steps());
        assert!(res.steps[0].ok());
        assert!(!res.steps[1].ok());
        assert!(res
            .messages
            .iter()
            .any(|m| m.content.contains("partially saved")));
        assert_eq!(store.load::<EntradaRecord>().rows.len(), 1);
        assert_eq!(find_by_code(&store, "1").unwrap().quantity, 10.0);
    }

    #[test]
    fn journal_failure_aborts_before_ledger() {
        let store = store_with_item(10.0, 1.0);
        store.backend().fail_writes_to(Table::Saida.path());

        assert!(record_saida(&store, saida("1", 1.0, None)).is_err());
        assert_eq!(find_by_code(&store, "1").unwrap().quantity, 10.0);
    }

    #[test]
    fn history_filters_by_code() {
        let store = store_with_item(10.0, 1.0);
        register(
            &store,
            NewItem {
                description: "PORCA".into(),
                classification: Some(Classification::Ativo),
                quantity: 1.0,
                unit_value: 1.0,
                location: String::new(),
            },
            1,
        )
        .unwrap();
        record_entrada(&store, entrada("1", 1.0, None)).unwrap();
        record_entrada(&store, entrada("2", 1.0, None)).unwrap();
        record_saida(&store, saida("2", 1.0, None)).unwrap();

        assert_eq!(list_entradas(&store, None).unwrap().entradas.len(), 2);
        assert_eq!(list_entradas(&store, Some("2")).unwrap().entradas.len(), 1);
        assert_eq!(list_saidas(&store, Some("1")).unwrap().saidas.len(), 0);
        assert_eq!(list_saidas(&store, Some(" 2 ")).unwrap().saidas.len(), 1);
    }
}
