//! Operator entry point for a circulation database.
//!
//! Usage:
//! `circulation_cli <db_path> <sweep|stats|serve> [--config <json>] [--log-dir <abs dir>]`
//!
//! - `sweep` runs one notification sweep and prints its report.
//! - `stats` prints library-wide circulation counters.
//! - `serve` runs the background scheduler until stdin closes.

use circulation_core::{
    init_logging, CirculationConfig, CirculationEngine, InMemoryPatronDirectory, LoggingConfig,
    NotificationScheduler, SystemClock,
};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::error::Error;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Operator commands for a circulation database.
#[derive(Parser, Debug)]
#[command(name = "circulation_cli", version, about, long_about = None)]
struct Cli {
    /// SQLite database file; created and migrated when missing
    db_path: PathBuf,

    #[command(subcommand)]
    command: Command,

    /// JSON circulation config; defaults apply when omitted
    #[arg(long = "config", global = true)]
    config_path: Option<PathBuf>,

    /// Absolute directory for rotated log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run one notification sweep and print its report
    Sweep,
    /// Print library-wide circulation counters
    Stats,
    /// Run the background scheduler until stdin closes
    Serve,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &args.config_path {
        Some(path) => CirculationConfig::load(path)?,
        None => CirculationConfig::default(),
    };
    let log_dir = args
        .log_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("circulation-logs"));
    init_logging(&LoggingConfig::with_default_level(log_dir))?;

    match args.command {
        Command::Sweep => {
            let mut engine = open_engine(&args, config)?;
            let report = engine.run_notification_sweep()?;
            println!("loans_scanned={}", report.loans_scanned);
            println!("alerts_created={}", report.alerts_created);
            println!("alerts_deduplicated={}", report.alerts_deduplicated);
            println!("loans_marked_overdue={}", report.loans_marked_overdue);
            println!("record_failures={}", report.record_failures);
        }
        Command::Stats => {
            let engine = open_engine(&args, config)?;
            let stats = engine.circulation_stats()?;
            println!("total_items={}", stats.total_items);
            println!("total_copies={}", stats.total_copies);
            println!("available_copies={}", stats.available_copies);
            println!("loans_out={}", stats.loans_out);
            println!("overdue_loans={}", stats.overdue_loans);
            println!("pending_requests={}", stats.pending_requests);
        }
        Command::Serve => {
            // Open once up front so migrations run before the scheduler thread starts.
            drop(open_engine(&args, config.clone())?);
            let handle =
                NotificationScheduler::spawn(&args.db_path, Arc::new(SystemClock), config)?;
            info!("event=cli_serve module=cli status=start db={}", args.db_path.display());
            println!("scheduler running; close stdin to stop");
            wait_for_close(std::io::stdin());
            handle.shutdown();
            info!("event=cli_serve module=cli status=ok");
        }
    }
    Ok(())
}

fn open_engine(args: &Cli, config: CirculationConfig) -> Result<CirculationEngine, Box<dyn Error>> {
    Ok(CirculationEngine::open(
        &args.db_path,
        Arc::new(InMemoryPatronDirectory::new()),
        config,
    )?)
}

/// Blocks until `input` reaches end of file; `false` when reading failed.
fn wait_for_close(mut input: impl Read) -> bool {
    let mut sink = Vec::new();
    match input.read_to_end(&mut sink) {
        Ok(_) => true,
        Err(err) => {
            warn!("event=cli_serve module=cli status=error error_code=stdin_read_failed error={err}");
            false
        }
    }
}
