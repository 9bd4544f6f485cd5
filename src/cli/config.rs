//! Configuration-related CLI commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{ConfigManager, ScanConfig};

const REDACTED: &str = "[REDACTED]";

/// Loads the configuration from `path` (or the default location) and
/// applies environment overrides.
pub(crate) fn load_config(path: Option<PathBuf>) -> Result<ScanConfig> {
    let manager = path.map_or_else(ConfigManager::new, ConfigManager::with_path);
    let config = manager.load_config()?.with_env_overrides();
    Ok(config)
}

/// Configuration operations.
#[derive(Parser)]
pub struct ConfigCommand {
    /// Configuration subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigSubcommands,
}

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigSubcommands {
    /// Prints the effective configuration as YAML.
    Show(ShowCommand),
}

/// Show command options.
#[derive(Parser)]
pub struct ShowCommand {
    /// Path to the configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ConfigCommand {
    /// Executes the config command.
    pub fn execute(self) -> Result<()> {
        match self.command {
            ConfigSubcommands::Show(show_cmd) => show_cmd.execute(),
        }
    }
}

impl ShowCommand {
    /// Executes the show command.
    pub fn execute(self) -> Result<()> {
        let config = load_config(self.config)?;
        println!("{}", render_config(&config)?);
        Ok(())
    }
}

/// Renders `config` as YAML with the auth token masked.
fn render_config(config: &ScanConfig) -> Result<String> {
    let mut shown = config.clone();
    if shown.service.token().is_some() {
        shown.service.auth_token = Some(REDACTED.to_string());
    }
    serde_yaml::to_string(&shown).context("Failed to serialize configuration")
}
