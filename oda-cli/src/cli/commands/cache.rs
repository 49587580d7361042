//! `cache` subcommands

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use std::path::Path;
use std::sync::Arc;

use crate::api::{QueryCache, SystemClock};
use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Print the cache file location
    Path,
    /// List cached results with their remaining lifetime
    List,
    /// Delete all cached results
    Clear,
}

pub fn handle_cache_command(command: CacheCommands, config: &Config) -> Result<()> {
    let path = config
        .cache_file_path()
        .context("Could not determine cache directory")?;

    match command {
        CacheCommands::Path => println!("{}", path.display()),
        CacheCommands::List => {
            let lines = list_entries(&path)?;
            if lines.is_empty() {
                println!("{}", "No cached results".dimmed());
            }
            for line in lines {
                println!("{}", line);
            }
        }
        CacheCommands::Clear => match std::fs::remove_file(&path) {
            Ok(()) => println!("Removed {}", path.display().to_string().bright_green()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                println!("{}", "Cache is already empty".dimmed())
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", path.display()));
            }
        },
    }
    Ok(())
}

/// One line per valid entry: remaining seconds, record count, key
fn list_entries(path: &Path) -> Result<Vec<String>> {
    let cache = QueryCache::load(path, Arc::new(SystemClock))?;
    let now = chrono::Utc::now();
    Ok(cache
        .entries()
        .iter()
        .map(|(key, entry)| {
            format!(
                "{:>6}s  {:>6} records  {}",
                entry.ttl_remaining(now).as_secs(),
                entry.payload.records.len(),
                key
            )
        })
        .collect())
}
