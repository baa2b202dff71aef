//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific
//! modules.

mod cases;
mod config_cmd;
mod ingest;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::load_settings;

#[derive(Parser)]
#[command(name = "custodia")]
#[command(about = "Forensic evidence ingestion pipeline")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery of custodia.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a file as evidence for a case
    Ingest {
        /// File to ingest (image or PDF)
        file: PathBuf,

        /// Case the evidence attaches to
        #[arg(short = 'C', long = "case")]
        case_id: String,

        /// Evidence description (defaults to one generated from the file name)
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List cases known to the case-management backend
    Cases,

    /// Show resolved configuration
    Config,
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            file,
            case_id,
            description,
        } => ingest::execute(&settings, &file, &case_id, description.as_deref()).await,
        Commands::Cases => cases::execute(&settings).await,
        Commands::Config => {
            config_cmd::execute(&settings);
            Ok(())
        }
    }
}
