//! traytrack - resolve and maintain surgical tray requirements.
//!
//! A thin command-line consumer of `traytrack-core`: it loads the record
//! collections from the data directory, prints a case's merged equipment
//! list, and validates, adds or soft-deletes requirement records.

mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use traytrack_core::{Collection, Config, StoreError};

// ============================================================================
// Constants
// ============================================================================

/// Default poll interval for `watch`, in seconds
const DEFAULT_WATCH_INTERVAL_SECS: u64 = 2;

/// Log file name prefix inside the configured log directory
const LOG_FILE_PREFIX: &str = "traytrack.log";

#[derive(Debug, Parser)]
#[command(name = "traytrack", version, about = "Resolve surgical tray requirements for scheduled cases")]
struct Cli {
    /// Directory holding the record collections
    #[arg(long, global = true, env = "TRAYTRACK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the merged equipment list for a case
    Resolve(CaseArgs),
    /// Re-print the equipment list whenever the records change
    Watch {
        #[command(flatten)]
        case: CaseArgs,
        /// Seconds between change checks
        #[arg(long, default_value_t = DEFAULT_WATCH_INTERVAL_SECS)]
        interval_secs: u64,
    },
    /// Check a JSON file of records against the field rules
    Validate {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = CollectionArg::Defaults)]
        kind: CollectionArg,
    },
    /// Print a JSON file with legacy field names canonicalized
    Normalize { file: PathBuf },
    /// Add a default tray requirement to a case type
    AddDefault(RecordArgs),
    /// Add a physician preference for a case type
    AddPreference {
        #[arg(long)]
        physician: Option<String>,
        #[command(flatten)]
        record: RecordArgs,
    },
    /// Soft-delete a record by id
    Remove {
        #[arg(long, value_enum)]
        collection: CollectionArg,
        #[arg(long)]
        id: String,
    },
    /// List stored records
    List {
        #[arg(long, value_enum)]
        collection: CollectionArg,
        /// Only records for this case type
        #[arg(long)]
        case_type: Option<String>,
        /// Include soft-deleted records
        #[arg(long)]
        include_deleted: bool,
    },
}

#[derive(Debug, Args)]
struct CaseArgs {
    #[arg(long)]
    case_type: String,
    /// Physician whose preferences apply (falls back to the configured default)
    #[arg(long)]
    physician: Option<String>,
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct RecordArgs {
    #[arg(long)]
    case_type: Option<String>,
    #[arg(long)]
    tray_id: Option<String>,
    #[arg(long)]
    tray_name: Option<String>,
    /// required, preferred or optional
    #[arg(long)]
    requirement_type: Option<String>,
    #[arg(long, allow_negative_numbers = true)]
    quantity: Option<i64>,
    #[arg(long, allow_negative_numbers = true)]
    priority: Option<i64>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CollectionArg {
    #[value(alias = "default")]
    Defaults,
    #[value(alias = "preference")]
    Preferences,
}

impl From<CollectionArg> for Collection {
    fn from(arg: CollectionArg) -> Self {
        match arg {
            CollectionArg::Defaults => Collection::CaseTypeRequirements,
            CollectionArg::Preferences => Collection::PhysicianPreferences,
        }
    }
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, and additionally to a daily rolling file when the
/// config names a log directory. The returned guard must be held until exit.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        report_error(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // A broken config file must not block the file-only commands
    let (config, config_err) = Config::load_or_default();
    let _guard = init_tracing(&config);
    info!("traytrack starting");
    if let Some(e) = config_err {
        warn!(error = %format!("{:#}", e), "Ignoring unreadable config, using defaults");
    }

    let data_dir = config.data_dir(cli.data_dir.as_deref())?;
    debug!(data_dir = %data_dir.display(), "Resolved data directory");

    match cli.command {
        Command::Resolve(case) => {
            let physician = case.physician.or_else(|| config.default_physician.clone());
            commands::resolve(&data_dir, &case.case_type, physician.as_deref(), case.json)
        }
        Command::Watch { case, interval_secs } => {
            let physician = case.physician.or_else(|| config.default_physician.clone());
            commands::watch(
                &data_dir,
                &case.case_type,
                physician.as_deref(),
                case.json,
                std::time::Duration::from_secs(interval_secs.max(1)),
            )
            .await
        }
        Command::Validate { file, kind } => commands::validate_file(&file, kind.into()),
        Command::Normalize { file } => commands::normalize_file(&file),
        Command::AddDefault(record) => commands::add_default(&data_dir, record.into_draft(None)),
        Command::AddPreference { physician, record } => {
            let physician = physician.or_else(|| config.default_physician.clone());
            commands::add_preference(&data_dir, record.into_draft(physician))
        }
        Command::Remove { collection, id } => commands::remove(&data_dir, collection.into(), &id),
        Command::List {
            collection,
            case_type,
            include_deleted,
        } => commands::list(&data_dir, collection.into(), case_type.as_deref(), include_deleted),
    }
}

/// Print an error, listing every validation violation on its own line.
fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<StoreError>() {
        Some(StoreError::Invalid(validation)) => {
            eprintln!("Error: record rejected");
            for violation in &validation.violations {
                eprintln!("  - {}", violation);
            }
        }
        _ => eprintln!("Error: {:#}", err),
    }
}

impl RecordArgs {
    fn into_draft(self, physician_id: Option<String>) -> traytrack_core::RequirementDraft {
        traytrack_core::RequirementDraft {
            physician_id,
            case_type: self.case_type,
            tray_id: self.tray_id,
            tray_name: self.tray_name,
            requirement_type: self.requirement_type,
            quantity: self.quantity.map(serde_json::Value::from),
            priority: self.priority.map(serde_json::Value::from),
            notes: self.notes,
            ..Default::default()
        }
    }
}
