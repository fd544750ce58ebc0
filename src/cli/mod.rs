//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod check;
pub mod common;
pub mod seed;
pub mod up;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

use devhost::config::Config;

#[derive(Parser)]
#[command(name = "devhost")]
#[command(version)]
#[command(about = "Start a local development environment in dependency order", long_about = None)]
struct Cli {
    /// Path to the config file (default: ./devhost.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every declared resource and keep services running until Ctrl-C
    Up {
        /// Simulate adapters instead of spawning processes
        #[arg(long)]
        dry_run: bool,
        /// Stop services and exit as soon as startup settles
        #[arg(long)]
        once: bool,
    },
    /// Show the startup waves without starting anything
    Plan,
    /// Validate the config file and its dependency graph
    Check,
    /// Upsert seed records into a record store
    Seed {
        /// JSON file holding an array of records, each with an `id`
        #[arg(long, value_name = "FILE")]
        records: PathBuf,
        /// Base URL of the record store
        #[arg(long, required_unless_present = "dry_run")]
        endpoint: Option<String>,
        /// Collection the records are written to
        #[arg(long, default_value = "stores")]
        collection: String,
        /// Exit with an error if any record fails
        #[arg(long)]
        strict: bool,
        /// Write into an in-memory store instead
        #[arg(long)]
        dry_run: bool,
    },
    /// Show version information
    Version,
}

/// Entry point for the CLI - called from main().
pub async fn run() -> Result<()> {
    // `.env` values become visible to config overrides and to spawned
    // processes through the inherited environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::default_path);

    // Respect the logging settings when the config is readable; fall back to
    // defaults otherwise so `check` can still report what is wrong.
    let logging_cfg = Config::load_from_path(&config_path)
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = devhost::utils::logging::init_logging(&logging_cfg) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Up { dry_run, once }) => {
            up::cmd_up(&config_path, dry_run, once).await?;
        }
        Some(Commands::Plan) => {
            up::cmd_plan(&config_path)?;
        }
        Some(Commands::Check) => {
            check::cmd_check(&config_path)?;
        }
        Some(Commands::Seed {
            records,
            endpoint,
            collection,
            strict,
            dry_run,
        }) => {
            seed::cmd_seed(&records, endpoint, collection, strict, dry_run).await?;
        }
    }

    Ok(())
}

/// Display version information
fn cmd_version() {
    println!("devhost {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Dependency-ordered local development environment orchestrator");
}
