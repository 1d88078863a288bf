//! # CDC Collector CLI
//!
//! Entry point.
//!
//! - Configuration loading and validation
//! - Collector lifecycle on an in-process message center
//! - Graceful shutdown

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use commands::{run_collector, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run(args) => run_collector(&cli, args).await,
        Commands::Validate(args) => run_validate(&cli, args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
