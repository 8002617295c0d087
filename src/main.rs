use std::{
    collections::BTreeMap,
    io::{BufRead, BufReader},
    path::Path,
};

use clap::Parser;
use docket::{
    DataDir,
    DocumentBuilder,
    Error,
    IndexHandle,
    PrefixRegistry,
    QueryExecutor,
    Result,
    config::Settings,
    handle::AccessMode,
    query::FetchWindow,
};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCKET_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let mut settings = Settings::load(&data_dir, cli.config.as_deref())?;
    if let Some(index) = cli.index {
        settings.index.path = index;
    }
    PrefixRegistry::install_global(PrefixRegistry::from_config(
        &settings.prefixes,
    )?);

    match cli.command {
        Command::Index(args) => {
            let mut builder = writable_builder(&settings)?;
            builder.set_id(args.id)?;
            if let Some(text) = args.text {
                builder.add_text(text);
            }
            for (prefix, text) in args.fields {
                builder.add_prefixed_text(text, prefix);
            }
            for term in args.terms {
                builder.add_boolean_term(term);
            }
            for (slot, value) in args.slots {
                builder.add_to_slot(slot, value);
            }
            if let Some(data) = args.data {
                builder.set_data(data);
            }
            builder.execute()?;
            println!("Indexed record {}", args.id);
        }
        Command::Import(args) => {
            let count = cmd_import(&settings, &args.file)?;
            println!("Imported {count} record(s)");
        }
        Command::Delete(args) => {
            writable_builder(&settings)?.delete(args.id)?;
            println!("Deleted record {}", args.id);
        }
        Command::Search(args) => {
            cmd_search(&settings, &args)?;
        }
        Command::Prefixes(args) => {
            cmd_prefixes(&PrefixRegistry::global(), args.json);
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn writable_builder(settings: &Settings) -> Result<DocumentBuilder> {
    let mut handle = IndexHandle::from_config(&settings.index)?;
    handle.set_access_mode(AccessMode::ReadWrite)?;
    Ok(DocumentBuilder::with_handle(handle))
}

/// One line of an import file.
#[derive(Debug, Deserialize)]
struct ImportRecord {
    id: u64,
    #[serde(default)]
    text: Option<String>,
    /// Prefixed text keyed by prefix.
    #[serde(default)]
    fields: BTreeMap<String, String>,
    #[serde(default)]
    terms: Vec<String>,
    #[serde(default)]
    slots: BTreeMap<u32, f64>,
    #[serde(default)]
    data: Option<String>,
}

fn cmd_import(settings: &Settings, file: &Path) -> Result<usize> {
    let reader = BufReader::new(std::fs::File::open(file)?);
    let mut builder = writable_builder(settings)?;
    let mut count = 0;

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ImportRecord = serde_json::from_str(&line).map_err(|e| {
            tracing::error!(line = n + 1, "invalid record");
            Error::Json(e)
        })?;

        builder.set_id(record.id)?;
        if let Some(text) = record.text {
            builder.add_text(text);
        }
        for (prefix, text) in record.fields {
            builder.add_prefixed_text(text, prefix);
        }
        for term in record.terms {
            builder.add_boolean_term(term);
        }
        for (slot, value) in record.slots {
            builder.add_to_slot(slot, value);
        }
        if let Some(data) = record.data {
            builder.set_data(data);
        }
        builder.execute()?;
        count += 1;
    }

    tracing::info!(count, file = %file.display(), "import finished");
    Ok(count)
}

fn cmd_search(settings: &Settings, args: &cli::SearchArgs) -> Result<()> {
    let handle = IndexHandle::from_config(&settings.index)?;
    let mut executor =
        QueryExecutor::with_handle(handle, PrefixRegistry::global());
    executor.execute_window(&args.query, FetchWindow {
        num_to_fetch: args.count,
        offset: args.offset,
        check_at_least: args.check_at_least,
    })?;
    let results = executor.match_set()?;

    if args.json {
        let matches: Vec<_> = results
            .iter()
            .map(|m| {
                serde_json::json!({
                    "rank": m.rank,
                    "docid": m.docid,
                    "score": m.score,
                    "record": m.record,
                    "data": m.data.as_deref().map(String::from_utf8_lossy),
                })
            })
            .collect();
        let out = serde_json::json!({
            "query": args.query,
            "estimated": results.estimated(),
            "offset": results.offset(),
            "matches": matches,
        });
        println!("{out}");
        return Ok(());
    }

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for m in results {
        println!("{:>3}. [{:.3}] #{}", m.rank + 1, m.score, m.docid);
        for field in &m.record.text {
            match &field.prefix {
                Some(prefix) => println!("     {prefix}: {}", field.value),
                None => println!("     {}", field.value),
            }
        }
    }
    println!(
        "\n{} of about {} result(s)",
        results.len(),
        results.estimated()
    );
    Ok(())
}

fn cmd_prefixes(registry: &PrefixRegistry, json: bool) {
    if json {
        let slots: Vec<_> = registry
            .slot_prefixes()
            .map(|(slot, entry)| {
                serde_json::json!({
                    "slot": slot,
                    "prefix": entry.prefix,
                    "kind": entry.kind.to_string(),
                })
            })
            .collect();
        let out = serde_json::json!({
            "text": registry.text_prefixes().collect::<BTreeMap<_, _>>(),
            "boolean": registry.boolean_prefixes().collect::<BTreeMap<_, _>>(),
            "slots": slots,
        });
        println!("{out}");
        return;
    }

    if registry.is_empty() {
        println!("No prefixes configured.");
        return;
    }
    for (label, prefix) in registry.text_prefixes() {
        println!("text     {label:<16} {prefix}");
    }
    for (label, prefix) in registry.boolean_prefixes() {
        println!("boolean  {label:<16} {prefix}");
    }
    for (slot, entry) in registry.slot_prefixes() {
        println!("slot {slot:<3} {:<16} {}", entry.prefix, entry.kind);
    }
}
