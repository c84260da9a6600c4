//! Command-line interface.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use docpipe::config::load_settings;

#[derive(Parser)]
#[command(name = "docpipe")]
#[command(about = "PDF ingestion: text extraction, classification, splitting and typed metadata")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
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
    /// Create the data directory and database
    Init,

    /// Register a PDF for processing (deduplicated by content hash)
    Add {
        /// PDF file to register
        file: PathBuf,
    },

    /// Run pipeline stages for a registered document
    Process {
        /// Document ID
        id: String,
        /// Stages to run: 1 = extraction, 2 = +classification, 3 = +metadata, 4 = +chunking
        #[arg(short, long, default_value = "4")]
        level: u8,
    },

    /// Reset a document's stages and process it again
    Reprocess {
        /// Document ID
        id: String,
        /// Stages to run (see `process`)
        #[arg(short, long, default_value = "4")]
        level: u8,
    },

    /// Show a document's stage statuses
    Status {
        /// Document ID (lists all documents if omitted)
        id: Option<String>,
    },

    /// Classify a PDF without registering it
    Classify {
        /// PDF file
        file: PathBuf,
        /// Skip the language model tier
        #[arg(long)]
        no_ai: bool,
    },

    /// Detect the documents bundled in one PDF
    Split {
        /// PDF file
        file: PathBuf,
        /// Print each fragment's text
        #[arg(long)]
        show_text: bool,
    },

    /// List supported document types
    Types,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (settings, config) = load_settings(cli.config.as_deref()).await;

    match cli.command {
        Commands::Init => commands::init::cmd_init(&settings, &config).await,
        Commands::Add { file } => commands::documents::cmd_add(&settings, &config, &file).await,
        Commands::Process { id, level } => {
            commands::process::cmd_process(&settings, &config, &id, level, false).await
        }
        Commands::Reprocess { id, level } => {
            commands::process::cmd_process(&settings, &config, &id, level, true).await
        }
        Commands::Status { id } => {
            commands::documents::cmd_status(&settings, &config, id.as_deref()).await
        }
        Commands::Classify { file, no_ai } => {
            commands::analyze::cmd_classify(&settings, &config, &file, !no_ai).await
        }
        Commands::Split { file, show_text } => {
            commands::analyze::cmd_split(&settings, &config, &file, show_text).await
        }
        Commands::Types => commands::analyze::cmd_types(&settings, &config).await,
    }
}
