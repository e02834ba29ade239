//! `dbfsync` command-line entry point.
//!
//! Stdout carries the progress lines the supervising GUI scrapes; logs go
//! to stderr and the rolling log file.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dbfsync::{Overrides, SyncConfig};
use dbfsync_lock::{LockError, LockType};
use dbfsync_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

/// Exit code when another agent holds the sync lock.
const EXIT_LOCKED: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "dbfsync",
    version,
    about = "Sync legacy DBF tables into a relational database"
)]
struct Cli {
    /// Verbose logging on stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Only warnings and errors on stderr
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// TOML config file
    #[arg(short = 'c', long, global = true, env = "DBFSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Settings read from flags or environment variables. Each one overrides
/// the config file.
#[derive(Args, Debug, Default)]
struct SettingsArgs {
    /// Full destination URL; takes precedence over the DB_* parts
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// mysql, postgresql or sqlite
    #[arg(long, global = true, env = "DB_TYPE")]
    db_type: Option<String>,

    #[arg(long, global = true, env = "DB_HOST")]
    db_host: Option<String>,

    #[arg(long, global = true, env = "DB_PORT")]
    db_port: Option<u16>,

    #[arg(long, global = true, env = "DB_USER")]
    db_user: Option<String>,

    #[arg(long, global = true, env = "DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    #[arg(long, global = true, env = "DB_NAME")]
    db_name: Option<String>,

    #[arg(long, global = true, env = "SQLITE_DB_PATH")]
    sqlite_path: Option<PathBuf>,

    /// Root directory holding the table groups
    #[arg(long, global = true, env = "DBF_ROOT")]
    dbf_root: Option<PathBuf>,

    /// Directory between the group and the table files
    #[arg(long, global = true, env = "DBF_SUBPATH")]
    dbf_subpath: Option<String>,

    /// Directory shared with the peer agent for lock files
    #[arg(long, global = true, env = "SYNC_LOCK_DIR")]
    lock_dir: Option<PathBuf>,

    #[arg(long, global = true, env = "TABLE_PREFIX")]
    table_prefix: Option<String>,

    #[arg(long, global = true, env = "SYNC_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Filter cutoff, YYYYMMDD
    #[arg(long = "cutoff", global = true, env = "SYNC_CUTOFF_DATE")]
    cutoff_date: Option<String>,
}

impl From<SettingsArgs> for Overrides {
    fn from(args: SettingsArgs) -> Self {
        Overrides {
            database_url: args.database_url,
            db_type: args.db_type,
            db_host: args.db_host,
            db_port: args.db_port,
            db_user: args.db_user,
            db_password: args.db_password,
            db_name: args.db_name,
            sqlite_path: args.sqlite_path,
            dbf_root: args.dbf_root,
            dbf_subpath: args.dbf_subpath,
            lock_dir: args.lock_dir,
            table_prefix: args.table_prefix,
            batch_size: args.batch_size,
            cutoff_date: args.cutoff_date,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read, filter and load every table in the plan
    Sync {
        /// Which agent this run is; the other one must not be running
        #[arg(long, default_value = "local")]
        lock: LockType,

        /// Load into memory instead of the database
        #[arg(long)]
        dry_run: bool,

        /// Restrict the run to GROUP/table (repeatable)
        #[arg(short = 't', long = "table")]
        tables: Vec<String>,
    },

    /// Show a table file's schema and first rows as JSON
    Inspect {
        file: PathBuf,

        /// Number of rows to show
        #[arg(short = 'n', long, default_value_t = 5)]
        rows: usize,
    },

    /// Rewrite a damaged table file (a .backup copy is kept)
    Repair {
        file: PathBuf,

        /// Output path (default: <file>.repaired)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect or clear the cross-agent sync locks
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },
}

#[derive(Subcommand, Debug)]
enum LockCommands {
    /// Show both lock slots
    Status,
    /// Remove lock files
    Release {
        #[arg(value_enum)]
        target: cli::lock::ReleaseTarget,
    },
}

fn load_config(config: Option<&PathBuf>, settings: SettingsArgs) -> Result<SyncConfig> {
    SyncConfig::load(config.map(PathBuf::as_path), settings.into())
        .context("Invalid configuration")
}

async fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Sync {
            lock,
            dry_run,
            tables,
        } => {
            let config = load_config(cli.config.as_ref(), cli.settings)?;
            cli::sync::run(
                config,
                cli::sync::SyncArgs {
                    lock,
                    dry_run,
                    tables,
                },
            )
            .await
        }
        Commands::Inspect { file, rows } => cli::inspect::run(&file, rows),
        Commands::Repair { file, output } => cli::repair::run(&file, output.as_deref()),
        Commands::Lock { command } => {
            let config = load_config(cli.config.as_ref(), cli.settings)?;
            match command {
                LockCommands::Status => cli::lock::status(&config.lock_dir),
                LockCommands::Release { target } => cli::lock::release(&config.lock_dir, target),
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogConfig {
        app_name: "dbfsync",
        verbose: cli.verbose,
        quiet: cli.quiet,
        log_dir: None,
    }) {
        eprintln!("Warning: file logging disabled: {e:#}");
    }

    match run_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if err.downcast_ref::<LockError>().is_some_and(LockError::is_conflict) {
                ExitCode::from(EXIT_LOCKED)
            } else {
                ExitCode::from(1)
            }
        }
    }
}
