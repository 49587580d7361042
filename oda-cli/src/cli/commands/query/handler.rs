//! Query command handler

use anyhow::{Context, Result, bail};
use colored::*;
use log::warn;
use serde_json::Value;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{DisplayStyle, OutputFormat, QueryCommands};
use crate::api::{
    CacheStats, FetchOptions, FetchResult, HttpTransport, OdaClient, Query, QueryCache, Record,
    ResponseFormat, SystemClock, Transport,
};
use crate::config::Config;

/// Handle the query command
pub async fn handle_query_command(args: QueryCommands, config: &Config) -> Result<()> {
    if args.no_color {
        colored::control::set_override(false);
    }
    let verbose = matches!(args.style, DisplayStyle::Verbose);

    let query = build_query(&args, config).context("Invalid query")?;

    if args.dry {
        println!("{}", first_request_url(config, &query, args.max)?);
        return Ok(());
    }

    let transport = Arc::new(HttpTransport::new(config.base_url.clone())?);

    if verbose {
        println!("Entity: {}", query.entity().bright_green().bold());
        println!("Request: {}", query.render()?.dimmed());
        println!();
    }

    let start = Instant::now();
    let (result, cache_stats) = fetch_cached(transport, config, &query, &fetch_options(&args))
        .await
        .with_context(|| format!("Failed to fetch {}", query.entity()))?;
    let elapsed = start.elapsed();

    if verbose {
        print_summary(&result, cache_stats, elapsed);
    }
    if result.partial {
        eprintln!(
            "{}",
            format!("Warning: partial result, {} records before failure", result.len()).yellow()
        );
    }

    let formatted_output = format_output(&result.records, args.format)?;

    if let Some(output_path) = args.output {
        fs::write(&output_path, &formatted_output)
            .with_context(|| format!("Failed to write output to: {}", output_path.display()))?;
        if verbose {
            println!(
                "Results saved to: {}",
                output_path.display().to_string().bright_green()
            );
        }
    } else {
        if verbose {
            println!("Results:");
            println!();
        }
        println!("{}", formatted_output);
    }

    Ok(())
}

fn build_query(args: &QueryCommands, config: &Config) -> Result<Query> {
    let mut builder = Query::builder(&args.entity)
        .select(&args.select)
        .expand(&args.expand)
        .page_size(args.page_size.unwrap_or(config.page_size))
        .format(if args.atom {
            ResponseFormat::Atom
        } else {
            ResponseFormat::Json
        });

    if let Some(filter) = &args.filter {
        builder = builder.filter_raw(filter);
    }
    if let Some(orderby) = &args.orderby {
        builder = builder.orderby_raw(orderby);
    }

    Ok(builder.build()?)
}

fn fetch_options(args: &QueryCommands) -> FetchOptions {
    let mut options = FetchOptions::new()
        .allow_partial(args.allow_partial)
        .bypass_cache(args.no_cache);
    if let Some(max) = args.max {
        options = options.max_records(max);
    }
    if let Some(ttl) = args.ttl {
        options = options.ttl(Duration::from_secs(ttl));
    }
    options
}

/// Fetch through a client whose cache is loaded from, and saved back to, the cache file
async fn fetch_cached(
    transport: Arc<dyn Transport>,
    config: &Config,
    query: &Query,
    options: &FetchOptions,
) -> Result<(FetchResult, CacheStats)> {
    let cache_path = config
        .cache
        .enabled
        .then(|| config.cache_file_path())
        .flatten();

    let cache = match &cache_path {
        Some(path) => QueryCache::load(path, Arc::new(SystemClock)).unwrap_or_else(|e| {
            warn!("Starting with an empty cache: {}", e);
            QueryCache::system()
        }),
        None => QueryCache::system(),
    };

    let client = OdaClient::new(transport, Arc::new(cache), config.client_config());
    let result = client.fetch(query, options).await?;

    if let Some(path) = &cache_path {
        if !result.is_cache_hit() {
            if let Err(e) = client.cache().save(path) {
                warn!("Could not save cache: {}", e);
            }
        }
    }

    Ok((result, client.cache().stats()))
}

/// URL of the first page request a fetch would send
fn first_request_url(config: &Config, query: &Query, max: Option<usize>) -> Result<String> {
    let top = match max {
        Some(0) => bail!("--max 0 sends no requests"),
        Some(max) => (query.page_size() as usize).min(max) as u32,
        None => query.page_size(),
    };
    Ok(format!(
        "{}/{}",
        config.base_url.trim_end_matches('/'),
        query.page(top, query.skip())?.render()?
    ))
}

fn print_summary(result: &FetchResult, cache: CacheStats, elapsed: Duration) {
    let source = if result.is_cache_hit() {
        "cache".cyan()
    } else {
        format!("{} request(s)", result.requests).cyan()
    };
    let total = result
        .total_count
        .map(|count| format!(" of {}", count))
        .unwrap_or_default();
    println!("Records: {}{} from {}", result.len(), total, source);
    println!("Cached results: {}", cache.entries);
    println!("Time: {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    println!();
}

/// Format records according to the specified output format
fn format_output(records: &[Record], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(records).context("Failed to format JSON output")
        }
        OutputFormat::JsonCompact => {
            serde_json::to_string(records).context("Failed to format JSON output")
        }
        OutputFormat::Csv => records_to_csv(records),
    }
}

/// Records as CSV; columns are the union of keys in first-seen order
fn records_to_csv(records: &[Record]) -> Result<String> {
    if records.is_empty() {
        return Ok("No data\n".to_string());
    }

    let mut headers: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key);
            }
        }
    }

    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(&headers)
        .context("Failed to write CSV header")?;
    for record in records {
        let row: Vec<String> = headers
            .iter()
            .map(|h| record.get(*h).map(json_value_to_string).unwrap_or_default())
            .collect();
        wtr.write_record(&row).context("Failed to write CSV row")?;
    }

    let bytes = wtr.into_inner().context("Failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Convert a JSON value to a CSV cell
fn json_value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Freshness;
    use crate::api::testing::FakeTransport;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use serde_json::json;
    use std::path::PathBuf;

    fn args(extra: &[&str]) -> QueryCommands {
        let mut argv = vec!["oda-cli", "query"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Query(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_build_query_from_args() {
        let query = build_query(
            &args(&[
                "Sag",
                "--filter",
                "periodeid eq 160",
                "--select",
                "titel,id",
                "--orderby",
                "opdateringsdato desc",
                "--page-size",
                "50",
            ]),
            &Config::default(),
        )
        .unwrap();

        assert_eq!(
            query.render().unwrap(),
            "Sag?%24filter=periodeid%20eq%20160&%24select=id%2Ctitel\
             &%24orderby=opdateringsdato%20desc&%24top=50&%24inlinecount=allpages&%24format=json"
        );
    }

    #[test]
    fn test_build_query_uses_config_page_size() {
        let config = Config {
            page_size: 20,
            ..Config::default()
        };
        let query = build_query(&args(&["Aktør"]), &config).unwrap();
        assert_eq!(query.page_size(), 20);
    }

    #[test]
    fn test_build_query_rejects_bad_page_size() {
        assert!(build_query(&args(&["Sag", "--page-size", "500"]), &Config::default()).is_err());
    }

    #[test]
    fn test_fetch_options_from_args() {
        let options = fetch_options(&args(&["Sag", "--max", "5", "--ttl", "60", "--no-cache"]));
        assert_eq!(options.max_records, Some(5));
        assert_eq!(options.ttl, Some(Duration::from_secs(60)));
        assert!(options.bypass_cache);
        assert!(!options.allow_partial);
    }

    fn cached_config(name: &str) -> (Config, PathBuf) {
        let dir = std::env::temp_dir().join(format!("oda-cli-handler-{}-{}", std::process::id(), name));
        let config = Config {
            cache_file: Some(dir.join("cache.json")),
            ..Config::default()
        };
        (config, dir)
    }

    #[tokio::test]
    async fn test_cache_file_serves_later_runs() {
        let (config, dir) = cached_config("later-runs");
        let transport = Arc::new(FakeTransport::with_records(30));
        let query = build_query(&args(&["Sag"]), &config).unwrap();
        let options = fetch_options(&args(&["Sag"]));

        let (first, _) = fetch_cached(transport.clone(), &config, &query, &options).await.unwrap();
        let (second, stats) = fetch_cached(transport.clone(), &config, &query, &options).await.unwrap();

        assert_eq!(first.freshness, Freshness::Fetched);
        assert_eq!(second.freshness, Freshness::CacheHit);
        assert_eq!(second.records, first.records);
        assert_eq!(stats.entries, 1);
        assert_eq!(transport.call_count(), 1);

        let (bypassed, _) = fetch_cached(
            transport.clone(),
            &config,
            &query,
            &fetch_options(&args(&["Sag", "--no-cache"])),
        )
        .await
        .unwrap();
        assert_eq!(bypassed.freshness, Freshness::Fetched);
        assert_eq!(transport.call_count(), 2);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_zero_ttl_and_disabled_cache_write_nothing() {
        let (config, dir) = cached_config("no-store");
        let transport = Arc::new(FakeTransport::with_records(5));
        let query = build_query(&args(&["Sag"]), &config).unwrap();

        let ttl_zero = fetch_options(&args(&["Sag", "--ttl", "0"]));
        fetch_cached(transport.clone(), &config, &query, &ttl_zero).await.unwrap();
        let (again, _) = fetch_cached(transport.clone(), &config, &query, &ttl_zero).await.unwrap();
        assert_eq!(again.freshness, Freshness::Fetched);

        let mut disabled = config.clone();
        disabled.cache.enabled = false;
        std::fs::remove_dir_all(&dir).ok();
        fetch_cached(transport.clone(), &disabled, &query, &FetchOptions::new()).await.unwrap();
        assert!(!dir.join("cache.json").exists());
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_cache_file_is_replaced() {
        let (config, dir) = cached_config("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("cache.json"), "garbage").unwrap();
        let transport = Arc::new(FakeTransport::with_records(5));
        let query = build_query(&args(&["Sag"]), &config).unwrap();

        let (result, _) = fetch_cached(transport.clone(), &config, &query, &FetchOptions::new())
            .await
            .unwrap();
        assert_eq!(result.len(), 5);

        let reloaded = QueryCache::load(&dir.join("cache.json"), Arc::new(SystemClock)).unwrap();
        assert_eq!(reloaded.len(), 1);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_csv_output_unions_columns_and_escapes() {
        let records = vec![
            record(json!({"id": 1, "titel": "Lov om skat, afgifter"})),
            record(json!({"id": 2, "titel": "Sagt \"ja\"", "resume": null})),
        ];

        let csv = format_output(&records, OutputFormat::Csv).unwrap();

        assert_eq!(
            csv,
            "id,titel,resume\n1,\"Lov om skat, afgifter\",\n2,\"Sagt \"\"ja\"\"\",\n"
        );
    }

    #[test]
    fn test_csv_output_empty() {
        assert_eq!(format_output(&[], OutputFormat::Csv).unwrap(), "No data\n");
    }

    #[test]
    fn test_json_compact_output() {
        let records = vec![record(json!({"id": 1}))];
        assert_eq!(
            format_output(&records, OutputFormat::JsonCompact).unwrap(),
            r#"[{"id":1}]"#
        );
    }

    #[test]
    fn test_dry_run_url() {
        let config = Config::default();
        let query = build_query(&args(&["Sag"]), &config).unwrap();

        assert_eq!(
            first_request_url(&config, &query, None).unwrap(),
            "https://oda.ft.dk/api/Sag?%24top=100&%24inlinecount=allpages&%24format=json"
        );
        assert_eq!(
            first_request_url(&config, &query, Some(7)).unwrap(),
            "https://oda.ft.dk/api/Sag?%24top=7&%24inlinecount=allpages&%24format=json"
        );
        assert!(first_request_url(&config, &query, Some(0)).is_err());
    }
}
