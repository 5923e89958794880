//! CLI module for ContextTree
//!
//! Provides commands:
//! - `serve`: Start the HTTP server (default)
//! - `check`: Validate configuration and storage connectivity

use clap::{Parser, Subcommand};

/// ContextTree server CLI
#[derive(Parser, Debug)]
#[command(name = "contexttree")]
#[command(about = "Canvas server for branching AI conversations")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the server (default)
    Serve,
    /// Validate configuration and storage, then exit
    Check,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => crate::server::run().await,
        Commands::Check => crate::server::check().await,
    }
}
