use almox::model::Classification;
use almox::validation::parse_decimal;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "almox")]
#[command(about = "Stock ledger, movement journals and EPI issuance for a small warehouse", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding Planilhas/, Backups/, Relatorios/ and almox.json
    #[arg(long, global = true, env = "ALMOX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Operator recorded on journal rows
    #[arg(long, global = true, env = "ALMOX_OPERATOR")]
    pub operator: Option<String>,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Accepts `2.5` as well as `2,5`.
fn decimal(s: &str) -> Result<f64, String> {
    parse_decimal(s).map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a new stock item
    #[command(alias = "new")]
    Register {
        /// Item description (stored uppercased)
        description: String,

        /// ATIVO, CONSUMIVEL or PREVENTIVO
        #[arg(short, long = "class")]
        classification: Option<Classification>,

        /// Initial quantity
        #[arg(short, long, value_parser = decimal, default_value = "0")]
        quantity: f64,

        /// Unit value
        #[arg(short, long, value_parser = decimal)]
        unit_value: f64,

        /// Where the item is kept
        #[arg(short, long, default_value = "")]
        location: String,
    },

    /// List stock items
    #[command(alias = "ls")]
    List {
        /// Search term (code, description, classification, location, date)
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show one item and its movements
    #[command(alias = "v")]
    Show { code: String },

    /// Print the code the next registered item will get
    NextCode,

    /// Record a stock-in
    #[command(alias = "in")]
    Entrada {
        code: String,

        #[arg(value_parser = decimal)]
        quantity: f64,

        /// PO / invoice reference
        #[arg(long)]
        po: Option<String>,

        /// Issue date of the invoice, as HH:MM DD/MM/YY
        #[arg(long)]
        issue_date: Option<String>,
    },

    /// Record a stock-out
    #[command(alias = "out")]
    Saida {
        code: String,

        #[arg(value_parser = decimal)]
        quantity: f64,

        /// Who asked for the items
        #[arg(short, long)]
        requester: String,

        /// Requesting sector
        #[arg(short, long, default_value = "")]
        sector: String,

        /// PO / invoice reference the items came in with
        #[arg(long)]
        po: Option<String>,
    },

    /// Overwrite fields of an item
    #[command(alias = "e")]
    Edit {
        code: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long = "class")]
        classification: Option<Classification>,

        #[arg(short, long, value_parser = decimal)]
        unit_value: Option<f64>,

        #[arg(short, long, value_parser = decimal)]
        quantity: Option<f64>,

        #[arg(short, long)]
        location: Option<String>,
    },

    /// Delete an item (breaks the code sequence)
    #[command(alias = "rm")]
    Delete { code: String },

    /// Personal protective equipment
    Epi {
        #[command(subcommand)]
        command: EpiCommands,
    },

    /// Run the backup sweeper
    Backup {
        /// Copy the tables now, whatever the schedule says
        #[arg(short, long)]
        force: bool,

        /// Keep running, checking the schedule every minute
        #[arg(short, long, conflicts_with = "force")]
        watch: bool,
    },

    /// Export reports to Relatorios/
    Export {
        /// Only the list of items with no stock left
        #[arg(long)]
        out_of_stock: bool,
    },

    /// Recompute stock totals and realign old journal columns
    Repair,

    /// Get or set configuration
    Config {
        /// Configuration key (backup-interval-hours, retention-days, code-seed, operator)
        key: Option<String>,

        /// Value to set (if omitted, prints current value)
        value: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum EpiCommands {
    /// Add to an EPI, creating it when new
    Add {
        #[arg(value_parser = decimal)]
        quantity: f64,

        /// Certificate of approval number
        #[arg(long)]
        ca: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Hand an EPI to a collaborator
    Withdraw {
        /// CA or description
        identifier: String,

        #[arg(value_parser = decimal)]
        quantity: f64,

        #[arg(short, long)]
        collaborator: String,
    },

    /// List EPIs
    #[command(alias = "ls")]
    List,

    /// Overwrite fields of an EPI
    Edit {
        /// CA or description
        identifier: String,

        #[arg(long)]
        ca: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long, value_parser = decimal)]
        quantity: Option<f64>,
    },

    /// Delete an EPI
    #[command(alias = "rm")]
    Delete {
        /// CA or description
        identifier: String,
    },

    /// Withdrawals logged for a collaborator
    History { collaborator: String },
}
