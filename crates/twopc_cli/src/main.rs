//! twopc CLI
//!
//! Operator tools for a coordinator's decision log directory.
//!
//! # Commands
//!
//! - `inspect` - List transactions recorded in the log
//! - `verify` - Check the log for corruption and protocol violations
//! - `compact` - Prune completed transactions from the log

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// twopc decision log tools.
#[derive(Parser)]
#[command(name = "twopc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the coordinator directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List transactions recorded in the decision log
    Inspect {
        /// Include completed transactions
        #[arg(short, long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check the decision log for corruption and protocol violations
    Verify,

    /// Prune completed transactions from the decision log
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Inspect { all, format } => {
            let path = cli.path.ok_or("Coordinator path required for inspect")?;
            commands::inspect::run(&path, all, Format::parse(&format)?)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Coordinator path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Coordinator path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("twopc CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("twopc core v{}", twopc_core::VERSION);
        }
    }
    Ok(())
}
