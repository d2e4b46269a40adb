mod action;
mod cli;
mod config;
mod deploy;
mod error;
mod fleet;
mod health;
mod history;
mod inventory;
mod output;
mod provision;
mod resolve;
mod ssh;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .without_time()
        .init();

    let config = config::ShiplaneConfig::load(&cli.config)?;

    match cli.command {
        Command::Deploy {
            environment,
            action,
            image,
            yes,
        } => {
            cli::deploy::run(config, &environment, action, image.as_deref(), yes).await?;
        }

        Command::Status { environment } => {
            cli::status::run(&config, &environment)?;
        }

        Command::History { environment } => {
            cli::history::run(&config, &environment)?;
        }
    }

    Ok(())
}
