//! LobDB CLI
//!
//! Command-line tools for maintaining the large-object area of a database.
//!
//! # Commands
//!
//! - `inspect` - Display LOB file statistics
//! - `drop-table` - Remove all LOB files of a table
//! - `purge-temp` - Remove orphaned temp files

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LobDB command-line tools.
#[derive(Parser)]
#[command(name = "lobdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database path prefix (LOB files are named `<path>.lobs.db/...`)
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// The database uses legacy flat LOB file naming
    #[arg(global = true, long)]
    flat: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display LOB file statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove all LOB files owned by a table
    DropTable {
        /// Table id
        #[arg(short, long)]
        table: u32,
    },

    /// Remove orphaned temp files left behind by a crash
    PurgeTemp,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, cli.flat, &format)?;
        }
        Commands::DropTable { table } => {
            let path = cli.path.ok_or("Database path required for drop-table")?;
            commands::drop_table::run(&path, cli.flat, table)?;
        }
        Commands::PurgeTemp => {
            let path = cli.path.ok_or("Database path required for purge-temp")?;
            commands::purge_temp::run(&path, cli.flat)?;
        }
        Commands::Version => {
            println!("LobDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("LobDB Core v{}", lobdb_core::VERSION);
        }
    }

    Ok(())
}
