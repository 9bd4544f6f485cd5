//! CLI interface for secret-push-protection.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod config;
pub mod hook;

/// secret-push-protection: blocks pushes that leak secrets.
#[derive(Parser)]
#[command(name = "secret-push-protection")]
#[command(about = "Push-time secret scanning for git pre-receive hooks", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The main command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Main command categories.
#[derive(Subcommand)]
pub enum Commands {
    /// Evaluates a push as a pre-receive hook.
    Hook(hook::HookCommand),
    /// Configuration inspection.
    Config(config::ConfigCommand),
}

impl Cli {
    /// Executes the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Hook(hook_cmd) => hook_cmd.execute().await,
            Commands::Config(config_cmd) => config_cmd.execute(),
        }
    }
}
