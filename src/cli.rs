use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "docket",
    about = "Build, commit and query prefixed records in a full-text index"
)]
pub struct Cli {
    /// Read settings from this file instead of <data dir>/docket.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the index directory from the settings
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Commit one record, replacing any record with the same id
    Index(IndexArgs),
    /// Commit records from a JSON Lines file
    Import(ImportArgs),
    /// Remove a record by id
    Delete(DeleteArgs),
    /// Search the index
    Search(SearchArgs),
    /// Show the configured prefixes
    Prefixes(PrefixesArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Record id (1 or greater)
    #[arg(long)]
    pub id: u64,

    /// Unprefixed text
    #[arg(long)]
    pub text: Option<String>,

    /// Prefixed text as PREFIX=TEXT (repeatable)
    #[arg(long = "field", value_parser = parse_key_value::<String>)]
    pub fields: Vec<(String, String)>,

    /// Boolean filter term, already prefixed (repeatable)
    #[arg(long = "term")]
    pub terms: Vec<String>,

    /// Slot value as SLOT=NUMBER (repeatable)
    #[arg(long = "slot", value_parser = parse_slot)]
    pub slots: Vec<(u32, f64)>,

    /// Opaque payload returned with matches
    #[arg(long)]
    pub data: Option<String>,
}

// -- Import --

#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// File with one JSON record per line
    pub file: PathBuf,
}

// -- Delete --

#[derive(Debug, Parser)]
pub struct DeleteArgs {
    /// Id of the record to remove
    pub id: u64,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Skip this many results
    #[arg(long, default_value = "0")]
    pub offset: usize,

    /// Inspect at least this many candidates before estimating the total
    #[arg(long)]
    pub check_at_least: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Prefixes --

#[derive(Debug, Parser)]
pub struct PrefixesArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docket",
            &mut std::io::stdout(),
        );
    }
}

fn parse_key_value<T>(s: &str) -> Result<(String, T), String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let value = value.parse().map_err(|e| format!("'{value}': {e}"))?;
    Ok((key.to_string(), value))
}

fn parse_slot(s: &str) -> Result<(u32, f64), String> {
    let (slot, value) = parse_key_value::<f64>(s)?;
    let slot = slot
        .parse()
        .map_err(|_| format!("slot '{slot}' is not a number"))?;
    Ok((slot, value))
}
