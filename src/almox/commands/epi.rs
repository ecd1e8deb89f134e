use super::{CmdMessage, CmdResult, QTY_EPSILON};
use crate::codec::display_decimal;
use crate::error::{AlmoxError, Result};
use crate::model::{
    collaborator_dir, collaborator_journal_path, sanitize_collaborator_name, timestamp,
    CollaboratorWithdrawal, EpiItem, Table,
};
use crate::store::backend::StorageBackend;
use crate::store::Store;
use crate::validation::{optional_text, require_non_negative, require_positive};
use chrono::Local;

/// What an add would do, resolved before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub enum EpiAddPlan {
    Increment(EpiItem),
    Create,
}

#[derive(Debug, Clone, Default)]
pub struct EpiEdit {
    pub ca: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<f64>,
}

fn same_text(a: &str, b: &str) -> bool {
    a.trim().to_uppercase() == b.trim().to_uppercase()
}

/// CA match first, then description.
fn locate(rows: &[EpiItem], identifier: &str) -> Option<usize> {
    let id = identifier.trim();
    if id.is_empty() {
        return None;
    }
    rows.iter()
        .position(|r| !r.ca.is_empty() && r.ca == id)
        .or_else(|| {
            rows.iter()
                .position(|r| !r.description.is_empty() && same_text(&r.description, id))
        })
}

pub fn find<B: StorageBackend>(store: &Store<B>, identifier: &str) -> Option<EpiItem> {
    let rows = store.load::<EpiItem>().rows;
    locate(&rows, identifier).map(|i| rows[i].clone())
}

fn resolve_plan(rows: &[EpiItem], ca: Option<&str>, description: Option<&str>) -> Result<EpiAddPlan> {
    if let Some(ca) = ca {
        if let Some(existing) = rows.iter().find(|r| r.ca == ca) {
            return Ok(EpiAddPlan::Increment(existing.clone()));
        }
    }
    if let Some(description) = description {
        if let Some(existing) = rows.iter().find(|r| same_text(&r.description, description)) {
            return match ca {
                Some(ca) if !existing.ca.is_empty() && existing.ca != ca => {
                    Err(AlmoxError::Conflict(format!(
                        "'{}' is already registered under CA {}, not CA {}",
                        existing.description, existing.ca, ca
                    )))
                }
                _ => Ok(EpiAddPlan::Increment(existing.clone())),
            };
        }
    }
    Ok(EpiAddPlan::Create)
}

fn add_keys(ca: Option<&str>, description: Option<&str>) -> Result<(Option<String>, Option<String>)> {
    let ca = optional_text(ca);
    let description = optional_text(description);
    if ca.is_none() && description.is_none() {
        return Err(AlmoxError::validation(
            "Either a CA or a description is required",
        ));
    }
    Ok((ca, description))
}

/// Resolves the row an add would touch. The shell shows this for
/// confirmation before calling [`add_or_increment`].
pub fn plan_add<B: StorageBackend>(
    store: &Store<B>,
    ca: Option<&str>,
    description: Option<&str>,
) -> Result<EpiAddPlan> {
    let (ca, description) = add_keys(ca, description)?;
    let rows = store.load::<EpiItem>().rows;
    resolve_plan(&rows, ca.as_deref(), description.as_deref())
}

pub fn add_or_increment<B: StorageBackend>(
    store: &Store<B>,
    ca: Option<&str>,
    description: Option<&str>,
    quantity: f64,
) -> Result<CmdResult> {
    let quantity = require_positive("Quantity", quantity)?;
    let (ca, description) = add_keys(ca, description)?;

    let mut table = store.load_for_update::<EpiItem>()?;
    let plan = resolve_plan(&table.rows, ca.as_deref(), description.as_deref())?;

    let mut result = CmdResult::default();
    match plan {
        EpiAddPlan::Increment(existing) => {
            let row = table
                .rows
                .iter_mut()
                .find(|r| **r == existing)
                .ok_or_else(|| AlmoxError::epi_not_found(&existing.label()))?;
            row.quantity += quantity;
            if row.ca.is_empty() {
                if let Some(ca) = ca {
                    row.ca = ca;
                }
            }
            let updated = row.clone();
            store.save(&table.rows)?;
            result.add_message(CmdMessage::success(format!(
                "{}: quantity now {}",
                updated.label(),
                display_decimal(updated.quantity)
            )));
            result.epis.push(updated);
        }
        EpiAddPlan::Create => {
            let item = EpiItem {
                ca: ca.unwrap_or_default(),
                description: description.unwrap_or_default(),
                quantity,
            };
            store.append(&item)?;
            result.add_message(CmdMessage::success(format!(
                "{} registered with quantity {}",
                item.label(),
                display_decimal(item.quantity)
            )));
            result.epis.push(item);
        }
    }
    Ok(result)
}

pub fn collaborator_exists<B: StorageBackend>(store: &Store<B>, name: &str) -> bool {
    let sanitized = sanitize_collaborator_name(name);
    !sanitized.is_empty() && store.backend().dir_exists(&collaborator_dir(&sanitized))
}

/// Hands `quantity` of an EPI to a collaborator.
///
/// `create_folder` is the operator's consent to create the collaborator's
/// folder when it does not exist yet.
pub fn withdraw<B: StorageBackend>(
    store: &Store<B>,
    identifier: &str,
    quantity: f64,
    collaborator: &str,
    create_folder: bool,
) -> Result<CmdResult> {
    let quantity = require_positive("Quantity", quantity)?;
    let sanitized = sanitize_collaborator_name(collaborator);
    if sanitized.is_empty() {
        return Err(AlmoxError::validation("Collaborator name cannot be empty"));
    }

    let mut table = store.load_for_update::<EpiItem>()?;
    let index =
        locate(&table.rows, identifier).ok_or_else(|| AlmoxError::epi_not_found(identifier.trim()))?;
    let available = table.rows[index].quantity;
    if quantity > available + QTY_EPSILON {
        return Err(AlmoxError::InsufficientStock {
            key: table.rows[index].label(),
            requested: quantity,
            available,
        });
    }

    let dir = collaborator_dir(&sanitized);
    if !store.backend().dir_exists(&dir) {
        if !create_folder {
            return Err(AlmoxError::validation(format!(
                "Collaborator folder {} does not exist; confirm its creation first",
                sanitized
            )));
        }
        store.backend().create_dir(&dir)?;
    }

    table.rows[index].quantity = (available - quantity).max(0.0);
    let updated = table.rows[index].clone();
    store.save(&table.rows)?;

    let mut result = CmdResult::default();
    result.record_step("EPI stock update", Ok(()));

    let now = Local::now();
    let withdrawal = CollaboratorWithdrawal {
        ca: updated.ca.clone(),
        description: updated.description.clone(),
        quantity,
        timestamp: timestamp(&now),
    };
    let path = collaborator_journal_path(&sanitized, &now);
    let logged = result.record_step("Collaborator log", store.append_at(&path, &withdrawal));

    if logged {
        result.add_message(CmdMessage::success(format!(
            "{} x {} handed to {}, remaining {}",
            display_decimal(quantity),
            updated.label(),
            sanitized,
            display_decimal(updated.quantity)
        )));
        result.paths.push(store.location(&path));
    } else {
        result.warn_inconsistent();
    }
    result.withdrawals.push(withdrawal);
    result.epis.push(updated);
    Ok(result)
}

pub fn edit<B: StorageBackend>(
    store: &Store<B>,
    identifier: &str,
    changes: EpiEdit,
) -> Result<CmdResult> {
    if changes.ca.is_none() && changes.description.is_none() && changes.quantity.is_none() {
        return Err(AlmoxError::validation("Nothing to change"));
    }
    let quantity = changes
        .quantity
        .map(|q| require_non_negative("Quantity", q))
        .transpose()?;

    let mut table = store.load_for_update::<EpiItem>()?;
    let index =
        locate(&table.rows, identifier).ok_or_else(|| AlmoxError::epi_not_found(identifier.trim()))?;

    let others = || {
        table
            .rows
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != index)
            .map(|(_, r)| r)
    };

    let ca = changes.ca.map(|c| c.trim().to_string());
    if let Some(ca) = ca.as_deref().filter(|c| !c.is_empty()) {
        if others().any(|r| r.ca == ca) {
            return Err(AlmoxError::Conflict(format!("CA {} is already in use", ca)));
        }
    }
    let description = changes.description.map(|d| d.trim().to_string());
    if let Some(description) = description.as_deref().filter(|d| !d.is_empty()) {
        if others().any(|r| same_text(&r.description, description)) {
            return Err(AlmoxError::Conflict(format!(
                "Description '{}' is already in use",
                description
            )));
        }
    }

    let row = &mut table.rows[index];
    if let Some(ca) = ca {
        row.ca = ca;
    }
    if let Some(description) = description {
        row.description = description;
    }
    if let Some(quantity) = quantity {
        row.quantity = quantity;
    }
    if row.ca.is_empty() && row.description.is_empty() {
        return Err(AlmoxError::validation(
            "An EPI needs either a CA or a description",
        ));
    }
    let updated = row.clone();
    store.save(&table.rows)?;

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!("{} updated", updated.label())));
    result.epis.push(updated);
    Ok(result)
}

pub fn delete<B: StorageBackend>(store: &Store<B>, identifier: &str) -> Result<CmdResult> {
    let mut table = store.load_for_update::<EpiItem>()?;
    let index =
        locate(&table.rows, identifier).ok_or_else(|| AlmoxError::epi_not_found(identifier.trim()))?;
    let removed = table.rows.remove(index);
    store.save(&table.rows)?;

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!("{} deleted", removed.label())));
    result.epis.push(removed);
    Ok(result)
}

pub fn list<B: StorageBackend>(store: &Store<B>) -> Result<CmdResult> {
    let table = store.load::<EpiItem>();
    let mut result = CmdResult::default();
    result.note_read(Table::Epis, &table);
    if table.rows.is_empty() {
        result.add_message(CmdMessage::info("No EPIs registered."));
    }
    Ok(result.with_epis(table.rows))
}

/// Every withdrawal logged for a collaborator, oldest month first.
pub fn withdrawals<B: StorageBackend>(store: &Store<B>, collaborator: &str) -> Result<CmdResult> {
    let sanitized = sanitize_collaborator_name(collaborator);
    let dir = collaborator_dir(&sanitized);
    if sanitized.is_empty() || !store.backend().dir_exists(&dir) {
        return Err(AlmoxError::NotFound {
            kind: "Collaborator",
            key: collaborator.trim().to_string(),
        });
    }

    let mut result = CmdResult::default();
    for path in store.backend().list_files(&dir)? {
        if path.extension().map_or(true, |e| e != "csv") {
            continue;
        }
        let month = store.load_at::<CollaboratorWithdrawal>(&path);
        for warning in &month.warnings {
            result.add_message(CmdMessage::warning(format!(
                "{}: {}",
                path.display(),
                warning
            )));
        }
        result.withdrawals.extend(month.rows);
    }
    if result.withdrawals.is_empty() {
        result.add_message(CmdMessage::info(format!(
            "No withdrawals logged for {}.",
            sanitized
        )));
    }
    Ok(result)
}
