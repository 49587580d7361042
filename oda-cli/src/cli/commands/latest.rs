//! `latest` command: most recent modification per entity set

use anyhow::{Result, bail};
use clap::Args;
use colored::*;
use futures::future::join_all;

use crate::api::OdaClient;
use crate::api::constants::MODIFIED_FIELD;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct LatestCommands {
    /// Entity sets to check (e.g. Sag Afstemning)
    #[arg(required = true)]
    pub entities: Vec<String>,

    /// Timestamp field to order by
    #[arg(long, default_value = MODIFIED_FIELD)]
    pub field: String,
}

pub async fn handle_latest_command(args: LatestCommands, config: &Config) -> Result<()> {
    let client = OdaClient::http(config.client_config())?;

    let results = join_all(
        args.entities
            .iter()
            .map(|entity| client.latest_modification(entity, &args.field)),
    )
    .await;

    let width = args.entities.iter().map(|e| e.chars().count()).max().unwrap_or(0);
    let mut failures = 0;
    for (entity, result) in args.entities.iter().zip(results) {
        let padding = " ".repeat(width - entity.chars().count());
        match result {
            Ok(Some(ts)) => println!("{}{}  {}", entity.bold(), padding, ts),
            Ok(None) => println!("{}{}  {}", entity.bold(), padding, "no records".dimmed()),
            Err(err) => {
                failures += 1;
                eprintln!("{}{}  {}", entity.bold(), padding, err.to_string().red());
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} lookups failed", failures, args.entities.len());
    }
    Ok(())
}
