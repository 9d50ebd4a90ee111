//! docflow - Document approval workflows
//!
//! Validates workflow definitions and serves the docflow request protocol as
//! JSON lines over stdio.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use docflow_api::{CommandHandler, Config};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docflow")]
#[command(about = "Role-gated document approval workflows with SLA deadlines")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "DOCFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and compile a workflow definition file
    Validate {
        /// Definition JSON file
        file: PathBuf,
    },

    /// Serve JSON-lines requests on stdin, responses on stdout
    Serve,

    #[command(flatten)]
    Run(OneShot),
}

/// Commands answered with a single request against the configured store.
#[derive(Subcommand)]
enum OneShot {
    /// Store a workflow definition
    CreateWorkflow {
        /// Definition JSON file
        file: PathBuf,
    },

    /// Show a stored workflow definition
    GetWorkflow {
        /// Workflow ID
        id: String,
    },

    /// Create a document in a workflow's initial state
    CreateDocument {
        /// Workflow ID
        #[arg(short, long)]
        workflow: String,

        /// Document data JSON (or @file.json to read from file)
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Show a document
    GetDocument {
        /// Document ID
        id: String,
    },

    /// Apply an event to a document
    ApplyEvent {
        /// Document ID
        #[arg(short, long)]
        document: String,

        /// Event name
        #[arg(short, long)]
        event: String,

        /// Roles held by the actor
        #[arg(short, long, value_delimiter = ',')]
        roles: Vec<String>,
    },

    /// List the events an actor may fire on a document
    AvailableEvents {
        /// Document ID
        #[arg(short, long)]
        document: String,

        /// Roles held by the actor
        #[arg(short, long, value_delimiter = ',')]
        roles: Vec<String>,
    },
}

fn load_handler(path: Option<&Path>) -> Result<CommandHandler, Box<dyn std::error::Error>> {
    let config = Config::load(path)?;
    if let Some(path) = path {
        tracing::debug!("Loaded config from {}", path.display());
    }
    tracing::debug!(
        "Storage backend: {} ({})",
        config.storage.backend.as_str(),
        config.storage.data_dir.display()
    );
    Ok(CommandHandler::from_config(&config)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries command output and responses.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => commands::validate(&file),
        Commands::Serve => {
            let handler = load_handler(cli.config.as_deref())?;
            return commands::serve(handler).await;
        }
        Commands::Run(cmd) => {
            load_handler(cli.config.as_deref()).and_then(|h| commands::execute(&h, cmd))
        }
    };

    match result {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
