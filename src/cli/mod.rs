use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::action::Action;

pub mod app;
pub mod confirm;
pub mod deploy;
pub mod history;
pub mod setup;
pub mod status;

#[derive(Parser)]
#[command(
    name = "shiplane",
    version,
    about = "Provision environments and roll container images across a replica fleet"
)]
pub struct Cli {
    /// Path to shiplane.toml
    #[arg(short, long, default_value = "shiplane.toml")]
    pub config: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an infrastructure or application action against an environment
    Deploy {
        /// Target environment (dev, staging, prod)
        environment: String,
        /// What to do
        #[arg(value_enum)]
        action: Action,
        /// Image to deploy or roll back to, overriding config and history
        #[arg(long)]
        image: Option<String>,
        /// Skip the production confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show what is live in an environment
    Status {
        /// Target environment
        environment: String,
    },

    /// Show the deployment history of an environment
    History {
        /// Target environment
        environment: String,
    },
}
