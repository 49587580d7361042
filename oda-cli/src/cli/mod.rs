//! Command line interface

pub mod commands;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use commands::cache::{CacheCommands, handle_cache_command};
use commands::config::{ConfigCommands, handle_config_command};
use commands::latest::{LatestCommands, handle_latest_command};
use commands::query::{QueryCommands, handle_query_command};
use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "oda-cli")]
#[command(about = "Query and cache client for the Folketing open data API (oda.ft.dk)")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch records from an entity set
    Query(QueryCommands),
    /// Show the most recent modification time of entity sets
    Latest(LatestCommands),
    /// Inspect or clear cached results
    #[command(subcommand)]
    Cache(CacheCommands),
    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

impl Cli {
    /// Default log filter for the requested verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Query(args) => handle_query_command(args, &Config::load()?).await,
        Commands::Latest(args) => handle_latest_command(args, &Config::load()?).await,
        Commands::Cache(args) => handle_cache_command(args, &Config::load()?),
        Commands::Config(args) => handle_config_command(args),
    }
}
