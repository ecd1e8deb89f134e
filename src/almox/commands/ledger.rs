use super::{CmdMessage, CmdResult};
use crate::codec::display_decimal;
use crate::error::{AlmoxError, Result};
use crate::model::{now_timestamp, Classification, StockItem, Table};
use crate::reflist;
use crate::store::backend::StorageBackend;
use crate::store::Store;
use crate::validation::{require_non_negative, require_text};

/// Fields collected by the shell for a new stock item.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub description: String,
    pub classification: Option<Classification>,
    pub quantity: f64,
    pub unit_value: f64,
    pub location: String,
}

/// Targeted overwrite of an item. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ItemEdit {
    pub description: Option<String>,
    pub classification: Option<Classification>,
    pub unit_value: Option<f64>,
    pub quantity: Option<f64>,
    pub location: Option<String>,
}

impl ItemEdit {
    fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.classification.is_none()
            && self.unit_value.is_none()
            && self.quantity.is_none()
            && self.location.is_none()
    }
}

pub fn find_by_code<B: StorageBackend>(store: &Store<B>, code: &str) -> Option<StockItem> {
    let code = code.trim();
    store
        .load::<StockItem>()
        .rows
        .into_iter()
        .find(|item| item.code == code)
}

/// Highest numeric code plus one, or `seed` when there is none.
pub fn next_code<B: StorageBackend>(store: &Store<B>, seed: u64) -> Result<String> {
    next_code_in(&store.load::<StockItem>().rows, seed)
}

/// Fails when the highest code has no successor.
pub(crate) fn next_code_in(items: &[StockItem], seed: u64) -> Result<String> {
    let max = items
        .iter()
        .filter_map(|item| item.code.trim().parse::<u64>().ok())
        .max();
    let next = match max {
        Some(max) => max.checked_add(1).ok_or_else(|| {
            AlmoxError::Store(format!("Code {} has no successor; fix the ledger codes", max))
        })?,
        None => seed,
    };
    Ok(next.to_string())
}

pub fn register<B: StorageBackend>(
    store: &Store<B>,
    item: NewItem,
    seed: u64,
) -> Result<CmdResult> {
    let description = require_text("Description", &item.description)?;
    let classification = item
        .classification
        .ok_or_else(|| AlmoxError::validation("A classification must be selected"))?;
    let quantity = require_non_negative("Quantity", item.quantity)?;
    let unit_value = require_non_negative("Unit value", item.unit_value)?;

    let ledger = store.load_for_update::<StockItem>()?;
    let code = next_code_in(&ledger.rows, seed)?;

    let mut new_item = StockItem {
        code,
        description,
        classification: Some(classification),
        unit_value,
        total_value: 0.0,
        quantity,
        last_modified: now_timestamp(),
        location: item.location.trim().to_string(),
        references: Vec::new(),
    };
    new_item.recompute_total();

    store.append(&new_item)?;

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Item registered with code {}: {} (total {})",
        new_item.code,
        new_item.description,
        display_decimal(new_item.total_value)
    )));
    result.affected_items.push(new_item);
    Ok(result)
}

/// Sets the quantity of `code`, recomputing its total, and rewrites the ledger.
pub fn apply_delta<B: StorageBackend>(
    store: &Store<B>,
    code: &str,
    new_quantity: f64,
) -> Result<StockItem> {
    let new_quantity = require_non_negative("Quantity", new_quantity)?;
    let mut ledger = store.load_for_update::<StockItem>()?;
    let code = code.trim();

    let item = ledger
        .rows
        .iter_mut()
        .find(|item| item.code == code)
        .ok_or_else(|| AlmoxError::item_not_found(code))?;
    item.restock(new_quantity, now_timestamp());
    let updated = item.clone();

    store.save(&ledger.rows)?;
    Ok(updated)
}

pub fn edit<B: StorageBackend>(
    store: &Store<B>,
    code: &str,
    changes: ItemEdit,
) -> Result<CmdResult> {
    if changes.is_empty() {
        return Err(AlmoxError::validation("Nothing to change"));
    }
    let description = changes
        .description
        .as_deref()
        .map(|d| require_text("Description", d))
        .transpose()?;
    let unit_value = changes
        .unit_value
        .map(|v| require_non_negative("Unit value", v))
        .transpose()?;
    let quantity = changes
        .quantity
        .map(|v| require_non_negative("Quantity", v))
        .transpose()?;

    let mut ledger = store.load_for_update::<StockItem>()?;
    let code = code.trim();
    let item = ledger
        .rows
        .iter_mut()
        .find(|item| item.code == code)
        .ok_or_else(|| AlmoxError::item_not_found(code))?;

    if let Some(description) = description {
        item.description = description;
    }
    if let Some(classification) = changes.classification {
        item.classification = Some(classification);
    }
    if let Some(unit_value) = unit_value {
        item.unit_value = unit_value;
    }
    if let Some(location) = changes.location {
        item.location = location.trim().to_string();
    }
    let quantity = quantity.unwrap_or(item.quantity);
    item.restock(quantity, now_timestamp());
    let updated = item.clone();

    store.save(&ledger.rows)?;

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Item {} updated: {}",
        updated.code, updated.description
    )));
    result.affected_items.push(updated);
    Ok(result)
}

/// Removes an item for good. The shell must confirm before calling this.
pub fn delete<B: StorageBackend>(store: &Store<B>, code: &str) -> Result<CmdResult> {
    let mut ledger = store.load_for_update::<StockItem>()?;
    let code = code.trim();
    let pos = ledger
        .rows
        .iter()
        .position(|item| item.code == code)
        .ok_or_else(|| AlmoxError::item_not_found(code))?;

    let removed = ledger.rows.remove(pos);
    store.save(&ledger.rows)?;

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Item {} deleted: {}",
        removed.code, removed.description
    )));
    result.add_message(CmdMessage::warning(
        "Deleting items is not recommended: it breaks the sequence of codes.",
    ));
    result.affected_items.push(removed);
    Ok(result)
}

pub fn list<B: StorageBackend>(store: &Store<B>) -> Result<CmdResult> {
    let ledger = store.load::<StockItem>();
    let mut result = CmdResult::default();
    result.note_read(Table::Estoque, &ledger);
    if ledger.rows.is_empty() {
        result.add_message(CmdMessage::info("The stock is empty."));
    }
    Ok(result.with_listed_items(ledger.rows))
}

/// Case-insensitive match on code, description, classification, location and
/// last modification stamp.
pub fn search<B: StorageBackend>(store: &Store<B>, term: &str) -> Result<CmdResult> {
    let ledger = store.load::<StockItem>();
    let needle = term.trim().to_uppercase();

    let mut result = CmdResult::default();
    result.note_read(Table::Estoque, &ledger);

    let found: Vec<StockItem> = ledger
        .rows
        .into_iter()
        .filter(|item| matches_term(item, &needle))
        .collect();
    if found.is_empty() {
        result.add_message(CmdMessage::info(format!("No items match '{}'.", term.trim())));
    }
    Ok(result.with_listed_items(found))
}

fn matches_term(item: &StockItem, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let classification = item.classification.as_ref().map(|c| c.as_str()).unwrap_or("");
    [
        item.code.as_str(),
        item.description.as_str(),
        classification,
        item.location.as_str(),
        item.last_modified.as_str(),
    ]
    .iter()
    .any(|field| field.to_uppercase().contains(needle))
}

/// Adds a PO/NF reference to an item, reading the live ledger so consecutive
/// appends all land. Returns whether the list changed.
pub fn append_reference<B: StorageBackend>(
    store: &Store<B>,
    code: &str,
    token: &str,
) -> Result<bool> {
    let token = require_text("Reference", token)?;
    let mut ledger = store.load_for_update::<StockItem>()?;
    let code = code.trim();
    let item = ledger
        .rows
        .iter_mut()
        .find(|item| item.code == code)
        .ok_or_else(|| AlmoxError::item_not_found(code))?;

    if !reflist::push_unique(&mut item.references, &token) {
        return Ok(false);
    }
    store.save(&ledger.rows)?;
    Ok(true)
}
