//! `config` subcommands

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;

use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration (file + environment) as TOML
    Show,
    /// Print the config file location
    Path,
}

pub fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = Config::load()?;
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::Path => {
            let path = Config::path().context("Could not determine config directory")?;
            let status = if path.exists() {
                "exists".green()
            } else {
                "not found, using defaults".yellow()
            };
            println!("{} ({})", path.display(), status);
        }
    }
    Ok(())
}
