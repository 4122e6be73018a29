//! Worker binary.
//!
//! `straylight serve` reads the environment, loads the operator
//! configuration, registers the compiled-in operators, connects to the
//! broker, and consumes indefinitely.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

/// AMQP RPC worker exposing typed operators as queue endpoints.
#[derive(Parser)]
#[command(name = "straylight", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register operators, connect to the broker, and consume indefinitely.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve => {
            let settings = straylight::config::Settings::from_env()
                .context("failed to resolve settings")?;
            straylight::server::serve(&settings, &straylight::ops::catalog())
                .await
                .context("worker terminated")?;
        }
    }

    Ok(())
}
