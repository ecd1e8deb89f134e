use almox::api::{
    summarize, AlmoxApi, CmdMessage, ConfigAction, EntradaInput, EpiAddPlan, EpiEdit, ItemEdit,
    MessageLevel, NewItem, SaidaInput,
};
use almox::commands::CmdResult;
use almox::config::AlmoxConfig;
use almox::error::{AlmoxError, Result};
use almox::model::{CollaboratorWithdrawal, EntradaRecord, EpiItem, SaidaRecord, StockItem};
use almox::store::fs_backend::FsBackend;
use almox::store::Store;
use chrono::Local;
use clap::Parser;
use colored::*;
use console::{Style, Term};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod args;
use args::{Cli, Commands, EpiCommands};

static HEADER: Lazy<Style> = Lazy::new(|| Style::new().bold().underlined());

const WATCH_INTERVAL: Duration = Duration::from_secs(60);

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct AppContext {
    api: AlmoxApi<FsBackend>,
    assume_yes: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut ctx = init_context(&cli)?;

    if !matches!(cli.command, Some(Commands::Backup { .. })) {
        scheduled_backup(&mut ctx);
    }

    match cli.command {
        Some(Commands::Register {
            description,
            classification,
            quantity,
            unit_value,
            location,
        }) => handle_register(
            &mut ctx,
            NewItem {
                description: description.to_uppercase(),
                classification,
                quantity,
                unit_value,
                location,
            },
        ),
        Some(Commands::List { search }) => handle_list(&mut ctx, search),
        Some(Commands::Show { code }) => handle_show(&mut ctx, code),
        Some(Commands::NextCode) => {
            println!("{}", ctx.api.next_code()?);
            Ok(())
        }
        Some(Commands::Entrada {
            code,
            quantity,
            po,
            issue_date,
        }) => handle_entrada(
            &mut ctx,
            EntradaInput {
                code,
                quantity,
                operator: String::new(),
                po_reference: po,
                issue_date,
            },
        ),
        Some(Commands::Saida {
            code,
            quantity,
            requester,
            sector,
            po,
        }) => handle_saida(
            &mut ctx,
            SaidaInput {
                code,
                quantity,
                requester: requester.to_uppercase(),
                sector: sector.to_uppercase(),
                po_reference: po,
                operator: String::new(),
            },
        ),
        Some(Commands::Edit {
            code,
            description,
            classification,
            unit_value,
            quantity,
            location,
        }) => handle_edit(
            &mut ctx,
            code,
            ItemEdit {
                description: description.map(|d| d.to_uppercase()),
                classification,
                unit_value,
                quantity,
                location,
            },
        ),
        Some(Commands::Delete { code }) => handle_delete(&mut ctx, code),
        Some(Commands::Epi { command }) => handle_epi(&mut ctx, command),
        Some(Commands::Backup { force, watch }) => handle_backup(&mut ctx, force, watch),
        Some(Commands::Export { out_of_stock }) => handle_export(&mut ctx, out_of_stock),
        Some(Commands::Repair) => handle_repair(&mut ctx),
        Some(Commands::Config { key, value }) => handle_config(&mut ctx, key, value),
        None => handle_list(&mut ctx, None),
    }
}

fn data_dir(cli: &Cli) -> Result<PathBuf> {
    if let Some(dir) = &cli.data_dir {
        return Ok(dir.clone());
    }
    ProjectDirs::from("br", "almox", "almox")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| AlmoxError::Store("Could not determine the data directory".into()))
}

fn init_context(cli: &Cli) -> Result<AppContext> {
    let data_dir = data_dir(cli)?;
    let config = AlmoxConfig::load(&data_dir)?;
    let store = Store::with_backend(FsBackend::new(data_dir.clone()));
    let api = AlmoxApi::new(store, config, data_dir).with_operator(cli.operator.clone());

    Ok(AppContext {
        api,
        assume_yes: cli.yes,
    })
}

/// Backups are best-effort: a failure here never blocks the command.
fn scheduled_backup(ctx: &mut AppContext) {
    match ctx.api.backup_tick(Local::now()) {
        Ok(result) => {
            for message in &result.messages {
                match message.level {
                    MessageLevel::Warning | MessageLevel::Error => {
                        tracing::warn!("{}", message.content)
                    }
                    _ => tracing::info!("{}", message.content),
                }
            }
        }
        Err(e) => tracing::warn!("scheduled backup failed: {}", e),
    }
}

fn confirm(ctx: &AppContext, prompt: &str) -> Result<bool> {
    if ctx.assume_yes {
        return Ok(true);
    }
    let term = Term::stdout();
    term.write_str(&format!("{} [S/N]: ", prompt))
        .map_err(AlmoxError::Io)?;
    let answer = term.read_line().map_err(AlmoxError::Io)?;
    Ok(matches!(answer.trim().to_uppercase().as_str(), "S" | "Y"))
}

fn cancelled() -> Result<()> {
    print_messages(&[CmdMessage::info("Operation cancelled.")]);
    Ok(())
}

fn finish(result: &CmdResult) -> Result<()> {
    print_messages(&result.messages);
    if let Some(summary) = summarize(result) {
        print_messages(&[summary]);
    }
    Ok(())
}

fn handle_register(ctx: &mut AppContext, item: NewItem) -> Result<()> {
    let prompt = format!(
        "Register {} x {} ({}) as code {}?",
        item.quantity,
        item.description,
        item.classification
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "no classification".into()),
        ctx.api.next_code()?
    );
    if !confirm(ctx, &prompt)? {
        return cancelled();
    }
    let result = ctx.api.register_item(item)?;
    print_items(&result.affected_items);
    finish(&result)
}

fn handle_list(ctx: &mut AppContext, search: Option<String>) -> Result<()> {
    let result = match search {
        Some(term) => ctx.api.search_items(&term)?,
        None => ctx.api.list_items()?,
    };
    print_items(&result.listed_items);
    finish(&result)
}

fn handle_show(ctx: &mut AppContext, code: String) -> Result<()> {
    let result = ctx.api.show_item(&code)?;
    print_items(&result.listed_items);
    if !result.entradas.is_empty() {
        println!();
        print_entradas(&result.entradas);
    }
    if !result.saidas.is_empty() {
        println!();
        print_saidas(&result.saidas);
    }
    finish(&result)
}

fn handle_entrada(ctx: &mut AppContext, input: EntradaInput) -> Result<()> {
    let result = ctx.api.show_item(&input.code)?;
    print_items(&result.listed_items);
    if !confirm(ctx, &format!("Add {} to item {}?", input.quantity, input.code))? {
        return cancelled();
    }
    let result = ctx.api.record_entrada(input)?;
    finish(&result)
}

fn handle_saida(ctx: &mut AppContext, input: SaidaInput) -> Result<()> {
    let result = ctx.api.show_item(&input.code)?;
    print_items(&result.listed_items);
    let prompt = format!(
        "Remove {} from item {} for {}?",
        input.quantity, input.code, input.requester
    );
    if !confirm(ctx, &prompt)? {
        return cancelled();
    }
    let result = ctx.api.record_saida(input)?;
    finish(&result)
}

fn handle_edit(ctx: &mut AppContext, code: String, changes: ItemEdit) -> Result<()> {
    let result = ctx.api.show_item(&code)?;
    print_items(&result.listed_items);
    if !confirm(ctx, &format!("Save the changes to item {}?", code))? {
        return cancelled();
    }
    let result = ctx.api.edit_item(&code, changes)?;
    print_items(&result.affected_items);
    finish(&result)
}

fn handle_delete(ctx: &mut AppContext, code: String) -> Result<()> {
    let result = ctx.api.show_item(&code)?;
    print_items(&result.listed_items);
    print_messages(&[CmdMessage::warning(
        "Deleting items is not recommended: it breaks the sequence of codes.",
    )]);
    if !confirm(ctx, &format!("Delete item {} for good?", code))? {
        return cancelled();
    }
    let result = ctx.api.delete_item(&code)?;
    let messages: Vec<CmdMessage> = result
        .messages
        .into_iter()
        .filter(|m| m.level != MessageLevel::Warning)
        .collect();
    print_messages(&messages);
    Ok(())
}

fn handle_epi(ctx: &mut AppContext, command: EpiCommands) -> Result<()> {
    match command {
        EpiCommands::Add {
            quantity,
            ca,
            description,
        } => {
            let description = description.map(|d| d.to_uppercase());
            let plan = ctx
                .api
                .plan_epi_add(ca.as_deref(), description.as_deref())?;
            let prompt = match &plan {
                EpiAddPlan::Increment(existing) => format!(
                    "{} already has {}. Add {} more?",
                    existing.label(),
                    existing.quantity,
                    quantity
                ),
                EpiAddPlan::Create => format!("Register a new EPI with quantity {}?", quantity),
            };
            if !confirm(ctx, &prompt)? {
                return cancelled();
            }
            let result = ctx
                .api
                .add_epi(ca.as_deref(), description.as_deref(), quantity)?;
            finish(&result)
        }
        EpiCommands::Withdraw {
            identifier,
            quantity,
            collaborator,
        } => {
            let mut create_folder = false;
            if !ctx.api.collaborator_exists(&collaborator) {
                let prompt = format!(
                    "Collaborator {} has no folder yet. Create it?",
                    collaborator.trim()
                );
                if !confirm(ctx, &prompt)? {
                    return cancelled();
                }
                create_folder = true;
            }
            let result = ctx
                .api
                .withdraw_epi(&identifier, quantity, &collaborator, create_folder)?;
            finish(&result)
        }
        EpiCommands::List => {
            let result = ctx.api.list_epis()?;
            print_epis(&result.epis);
            finish(&result)
        }
        EpiCommands::Edit {
            identifier,
            ca,
            description,
            quantity,
        } => {
            if !confirm(ctx, &format!("Save the changes to EPI {}?", identifier))? {
                return cancelled();
            }
            let changes = EpiEdit {
                ca,
                description: description.map(|d| d.to_uppercase()),
                quantity,
            };
            let result = ctx.api.edit_epi(&identifier, changes)?;
            print_epis(&result.epis);
            finish(&result)
        }
        EpiCommands::Delete { identifier } => {
            if !confirm(ctx, &format!("Delete EPI {}?", identifier))? {
                return cancelled();
            }
            let result = ctx.api.delete_epi(&identifier)?;
            finish(&result)
        }
        EpiCommands::History { collaborator } => {
            let result = ctx.api.epi_withdrawals(&collaborator)?;
            print_withdrawals(&result.withdrawals);
            finish(&result)
        }
    }
}

fn handle_backup(ctx: &mut AppContext, force: bool, watch: bool) -> Result<()> {
    if force {
        let result = ctx.api.backup_now(Local::now())?;
        return finish(&result);
    }
    if !watch {
        let result = ctx.api.backup_tick(Local::now())?;
        if result.messages.is_empty() && result.steps.is_empty() {
            print_messages(&[CmdMessage::info("No backup due yet.")]);
        }
        return finish(&result);
    }

    println!(
        "Watching {} (Ctrl-C to stop)",
        ctx.api.data_dir().display()
    );
    loop {
        match ctx.api.backup_tick(Local::now()) {
            Ok(result) => print_messages(&result.messages),
            Err(e) => print_messages(&[CmdMessage::error(e.to_string())]),
        }
        std::thread::sleep(WATCH_INTERVAL);
    }
}

fn handle_export(ctx: &mut AppContext, out_of_stock: bool) -> Result<()> {
    let today = Local::now().date_naive();
    let result = if out_of_stock {
        let result = ctx.api.export_out_of_stock(today)?;
        print_items(&result.listed_items);
        result
    } else {
        ctx.api.export_snapshot(today)?
    };
    finish(&result)
}

fn handle_repair(ctx: &mut AppContext) -> Result<()> {
    if !confirm(
        ctx,
        "Recompute stock totals and realign journal columns (a copy is kept)?",
    )? {
        return cancelled();
    }
    let result = ctx.api.repair()?;
    finish(&result)
}

fn handle_config(ctx: &mut AppContext, key: Option<String>, value: Option<String>) -> Result<()> {
    let action = match (key, value) {
        (None, _) => ConfigAction::ShowAll,
        (Some(k), None) => ConfigAction::ShowKey(k),
        (Some(k), Some(v)) => ConfigAction::Set(k, v),
    };

    let result = ctx.api.config(action)?;
    if let (Some(config), true) = (&result.config, result.messages.is_empty()) {
        for key in almox::config::KEYS {
            println!("{} = {}", key, config.get(key).unwrap_or_default());
        }
    }
    print_messages(&result.messages);
    Ok(())
}

fn print_messages(messages: &[CmdMessage]) {
    for message in messages {
        match message.level {
            MessageLevel::Info => println!("{}", message.content.dimmed()),
            MessageLevel::Success => println!("{}", message.content.green()),
            MessageLevel::Warning => println!("{}", message.content.yellow()),
            MessageLevel::Error => println!("{}", message.content.red()),
        }
    }
}

/// Text, column width and optional colour of one table cell.
type Cell = (String, usize, Option<Color>);

fn print_row(cells: &[Cell]) {
    let line: Vec<String> = cells
        .iter()
        .map(|(text, width, color)| render_cell(text, *width, *color))
        .collect();
    println!("{}", line.join(" ").trim_end());
}

fn print_header(cells: &[(&str, usize)]) {
    let line: Vec<String> = cells
        .iter()
        .map(|(text, width)| pad_to_width(text, *width))
        .collect();
    println!("{}", HEADER.apply_to(line.join(" ").trim_end()));
}

fn print_items(items: &[StockItem]) {
    if items.is_empty() {
        return;
    }
    print_header(&[
        ("CODIGO", 7),
        ("DESCRICAO", 30),
        ("CLASSE", 11),
        ("QTD", 9),
        ("VALOR UN", 10),
        ("TOTAL", 11),
        ("LOCAL", 10),
        ("NF/PEDIDO", 20),
    ]);
    for item in items {
        let quantity = almox::codec::display_decimal(item.quantity);
        let quantity_color = (item.quantity <= 0.0).then_some(Color::Red);
        print_row(&[
            (item.code.clone(), 7, Some(Color::Yellow)),
            (item.description.clone(), 30, None),
            (
                item.classification
                    .as_ref()
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
                11,
                None,
            ),
            (quantity, 9, quantity_color),
            (format!("{:.2}", item.unit_value), 10, None),
            (format!("{:.2}", item.total_value), 11, None),
            (item.location.clone(), 10, None),
            (item.references.join(", "), 20, None),
        ]);
    }
}

fn print_entradas(rows: &[EntradaRecord]) {
    println!("{}", "Stock-in".bold());
    print_header(&[
        ("DATA", 17),
        ("QTD", 9),
        ("TOTAL", 11),
        ("OPERADOR", 12),
        ("NF/PEDIDO", 16),
        ("EMISSAO", 15),
    ]);
    for row in rows {
        print_row(&[
            (row.timestamp.clone(), 17, None),
            (almox::codec::display_decimal(row.quantity), 9, None),
            (format!("{:.2}", row.line_total), 11, None),
            (row.operator.clone(), 12, None),
            (row.po_reference.clone(), 16, None),
            (row.issue_date.clone(), 15, None),
        ]);
    }
}

fn print_saidas(rows: &[SaidaRecord]) {
    println!("{}", "Stock-out".bold());
    print_header(&[
        ("DATA", 17),
        ("QTD", 9),
        ("VALOR", 11),
        ("SOLICITANTE", 14),
        ("SETOR", 12),
        ("OPERADOR", 12),
    ]);
    for row in rows {
        print_row(&[
            (row.timestamp.clone(), 17, None),
            (almox::codec::display_decimal(row.quantity), 9, None),
            (format!("{:.2}", row.value), 11, None),
            (row.requester.clone(), 14, None),
            (row.sector.clone(), 12, None),
            (row.operator.clone(), 12, None),
        ]);
    }
}

fn print_epis(epis: &[EpiItem]) {
    if epis.is_empty() {
        return;
    }
    print_header(&[("CA", 10), ("DESCRICAO", 40), ("QTD", 9)]);
    for epi in epis {
        print_row(&[
            (epi.ca.clone(), 10, Some(Color::Yellow)),
            (epi.description.clone(), 40, None),
            (almox::codec::display_decimal(epi.quantity), 9, None),
        ]);
    }
}

fn print_withdrawals(rows: &[CollaboratorWithdrawal]) {
    if rows.is_empty() {
        return;
    }
    print_header(&[("DATA", 17), ("CA", 10), ("DESCRICAO", 30), ("QTD", 9)]);
    for row in rows {
        print_row(&[
            (row.timestamp.clone(), 17, None),
            (row.ca.clone(), 10, None),
            (row.description.clone(), 30, None),
            (almox::codec::display_decimal(row.quantity), 9, None),
        ]);
    }
}

/// Colour goes on after truncation so escape codes are never cut.
fn render_cell(text: &str, width: usize, color: Option<Color>) -> String {
    let text = truncate_to_width(text, width);
    let text = match color {
        Some(color) => text.as_str().color(color).to_string(),
        None => text,
    };
    pad_to_width(&text, width)
}

fn pad_to_width(s: &str, width: usize) -> String {
    let visible = console::measure_text_width(s);
    format!("{}{}", s, " ".repeat(width.saturating_sub(visible)))
}

fn truncate_to_width(s: &str, max_width: usize) -> String {
    use unicode_width::UnicodeWidthChar;

    if console::measure_text_width(s) <= max_width {
        return s.to_string();
    }

    let mut result = String::new();
    let mut current_width = 0;

    for c in s.chars() {
        let char_width = c.width().unwrap_or(0);
        if current_width + char_width > max_width.saturating_sub(1) {
            result.push('…');
            return result;
        }
        result.push(c);
        current_width += char_width;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_coloured_cell_keeps_its_reset() {
        colored::control::set_override(true);
        let cell = render_cell("123456789", 7, Some(Color::Yellow));
        colored::control::unset_override();

        assert!(cell.ends_with("\u{1b}[0m"));
        assert_eq!(console::strip_ansi_codes(&cell), "123456…");
        assert_eq!(console::measure_text_width(&cell), 7);
    }

    #[test]
    fn short_cells_are_padded() {
        assert_eq!(render_cell("A1", 5, None), "A1   ");
        assert_eq!(render_cell("ABCDEFG", 5, None), "ABCD…");
    }
}
