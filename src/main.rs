//! Garagelog CLI - storage and migration tooling for the vehicle log

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "garagelog")]
#[command(version)]
#[command(about = "Vehicle log storage - SQLite with in-memory fallback, legacy store migration")]
#[command(long_about = r#"
Garagelog stores vehicles, fuel entries and service records in SQLite,
falling back to an in-memory emulator when the database cannot be opened.
It also migrates data out of the legacy key-value store, keeping a backup
that can be restored at any time until it is explicitly cleared.

Example usage:
  garagelog init
  garagelog migrate
  garagelog query "SELECT * FROM vehicles WHERE status = ?" --params '["active"]'
  garagelog rollback
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (defaults to ./garagelog.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default garagelog.toml
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show the active backend and migration state
    Status,

    /// Migrate the legacy store into the relational store (no-op if already done)
    Migrate {
        /// Remove the legacy backup after a successful migration
        #[arg(long)]
        clear_backup: bool,
    },

    /// Restore the legacy store from its backup
    Rollback,

    /// Remove the legacy backup
    ClearBackup,

    /// Run one SQL statement
    Query {
        /// Statement text, with `?` placeholders
        sql: String,

        /// Positional parameters as a JSON array
        #[arg(short, long)]
        params: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(garagelog::config::default_config_path);

    let context = || -> anyhow::Result<commands::Context> {
        let config = garagelog::config::load_config(Some(&config_path))?.unwrap_or_default();
        commands::Context::new(config)
    };

    match cli.command {
        Commands::Init { force } => commands::run_init(&config_path, force),
        Commands::Status => commands::run_status(&context()?).await,
        Commands::Migrate { clear_backup } => commands::run_migrate(&context()?, clear_backup).await,
        Commands::Rollback => commands::run_rollback(&context()?).await,
        Commands::ClearBackup => commands::run_clear_backup(&context()?).await,
        Commands::Query { sql, params, json } => {
            commands::run_query(&context()?, &sql, params.as_deref(), json).await
        }
    }
}
