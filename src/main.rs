//! ContextTree - canvas server for branching AI conversations
//!
//! CLI entry point for the ContextTree server.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod cli;
mod middleware;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "contexttree=info,tower_http=info".into());
    let json_logs = std::env::var("CONTEXTTREE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let cli = cli::Cli::parse();
    info!("Starting ContextTree v{}", env!("CARGO_PKG_VERSION"));

    cli::run(cli).await
}
