//! `query` command: fetch records from an entity set

mod handler;

use clap::{Args, ValueEnum};
use std::path::PathBuf;

pub use handler::handle_query_command;

#[derive(Args, Debug)]
pub struct QueryCommands {
    /// Entity set to query (e.g. Sag, Aktør, Afstemning)
    pub entity: String,

    /// OData filter expression, e.g. "periodeid eq 160"
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Fields to return (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub select: Vec<String>,

    /// Navigation properties to expand (comma separated)
    #[arg(short = 'x', long, value_delimiter = ',')]
    pub expand: Vec<String>,

    /// Sort clause, e.g. "opdateringsdato desc"
    #[arg(short, long)]
    pub orderby: Option<String>,

    /// Maximum number of records to fetch
    #[arg(short, long)]
    pub max: Option<usize>,

    /// Records per request (1-100)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Cache lifetime for this result in seconds
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Print records fetched so far when a later page fails
    #[arg(long)]
    pub allow_partial: bool,

    /// Ignore cached results
    #[arg(long)]
    pub no_cache: bool,

    /// Request Atom XML from the server instead of JSON
    #[arg(long)]
    pub atom: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Write results to a file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Display style
    #[arg(long, value_enum, default_value_t = DisplayStyle::Compact)]
    pub style: DisplayStyle,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Print the first request URL without sending it
    #[arg(long)]
    pub dry: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    JsonCompact,
    Csv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DisplayStyle {
    Compact,
    Verbose,
}
