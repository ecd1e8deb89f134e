//! Maintenance pass over the tables: recompute stock totals and bring
//! older journal files up to the current column layout.

use super::{CmdMessage, CmdResult};
use crate::error::Result;
use crate::model::{EntradaRecord, SaidaRecord, StockItem};
use crate::store::backend::StorageBackend;
use crate::store::Store;

/// Filler for journal cells that older layouts never recorded.
pub const PLACEHOLDER: &str = "-";

const TOTAL_TOLERANCE: f64 = 1e-6;

fn recompute_totals<B: StorageBackend>(store: &Store<B>) -> Result<usize> {
    let mut ledger = store.load_for_update::<StockItem>()?;
    if ledger.rows.is_empty() {
        return Ok(0);
    }
    let mut changed = 0;
    for item in &mut ledger.rows {
        let before = item.total_value;
        item.recompute_total();
        if (before - item.total_value).abs() > TOTAL_TOLERANCE {
            changed += 1;
        }
    }
    store.save(&ledger.rows)?;
    Ok(changed)
}

pub fn repair<B: StorageBackend>(store: &Store<B>) -> Result<CmdResult> {
    let mut result = CmdResult::default();

    match recompute_totals(store) {
        Ok(changed) => {
            result.record_step("Stock totals", Ok(()));
            if changed > 0 {
                result.add_message(CmdMessage::success(format!(
                    "Recomputed {} stock total(s)",
                    changed
                )));
            }
        }
        Err(e) => {
            result.record_step("Stock totals", Err(e));
        }
    }

    match store.realign::<EntradaRecord>(PLACEHOLDER) {
        Ok(realigned) => {
            result.record_step("Entrada columns", Ok(()));
            if realigned {
                result.add_message(CmdMessage::success("Entrada journal columns realigned"));
            }
        }
        Err(e) => {
            result.record_step("Entrada columns", Err(e));
        }
    }

    match store.realign::<SaidaRecord>(PLACEHOLDER) {
        Ok(realigned) => {
            result.record_step("Saida columns", Ok(()));
            if realigned {
                result.add_message(CmdMessage::success("Saida journal columns realigned"));
            }
        }
        Err(e) => {
            result.record_step("Saida columns", Err(e));
        }
    }

    if !result.has_failed_steps() && result.messages.is_empty() {
        result.add_message(CmdMessage::info("Everything is already consistent."));
    }
    Ok(result)
}
