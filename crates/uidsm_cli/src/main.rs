//! `uidsm` command-line entry point.
//!
//! Decodes, re-encodes and summarizes exchanged sets, and moves projects
//! between a SQLite store and JSON files.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uidsm_core::db::Connection;
use uidsm_core::service::exchange_service::ExchangeService;
use uidsm_core::{
    decode_str, encode, init_from_config, CodecOptions, CoreConfig, DispatchTable, EntityGraph,
    EntityId, HttpSearchIndexClient, NoopIndexer, SearchIndexer,
};

#[derive(Parser)]
#[command(name = "uidsm", about = "UI-DSM data core tools", disable_help_subcommand = true)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a liveness probe.
    Ping,
    /// Print the core version.
    Version,
    /// Decode an exchanged set and write it back out.
    Reformat(ReformatArgs),
    /// Print record counts per type and unresolved references.
    Summary(InputArgs),
    /// Write a project and everything it owns as an exchanged set.
    Export(ExportArgs),
    /// Upsert an exchanged set into the store.
    Import(InputArgs),
}

#[derive(Args)]
struct InputArgs {
    /// Input file; stdin when omitted.
    file: Option<PathBuf>,
}

#[derive(Args)]
struct ReformatArgs {
    /// Indent the output.
    #[arg(long)]
    pretty: bool,

    #[command(flatten)]
    input: InputArgs,
}

#[derive(Args)]
struct ExportArgs {
    /// Project id.
    project: EntityId,

    /// Indent the output.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?,
        None => CoreConfig::default(),
    };
    init_from_config(&config).context("failed to initialize logging")?;

    match cli.command {
        Commands::Ping => {
            println!("uidsm_core ping={}", uidsm_core::ping());
            Ok(())
        }
        Commands::Version => {
            println!("uidsm_core version={}", uidsm_core::core_version());
            Ok(())
        }
        Commands::Reformat(args) => run_reformat(&config, args),
        Commands::Summary(args) => run_summary(args),
        Commands::Export(args) => run_export(&config, args),
        Commands::Import(args) => run_import(&config, args),
    }
}

fn run_reformat(config: &CoreConfig, args: ReformatArgs) -> Result<()> {
    let input = read_input(args.input.file.as_deref())?;
    let records = decode_str(&input, DispatchTable::global()).context("failed to decode input")?;
    write_records(&records, args.pretty || config.pretty_json)
}

fn run_summary(args: InputArgs) -> Result<()> {
    let input = read_input(args.file.as_deref())?;
    let records = decode_str(&input, DispatchTable::global()).context("failed to decode input")?;
    let (graph, report) = EntityGraph::from_records(records);

    println!("records={}", graph.len());
    for (kind, count) in graph.count_by_kind() {
        println!("{kind}={count}");
    }
    if report.replaced > 0 {
        println!("duplicate_ids={}", report.replaced);
    }
    for dangling in &report.dangling {
        println!(
            "dangling {} {} {} -> {}",
            dangling.source_kind, dangling.source, dangling.field, dangling.target
        );
    }
    Ok(())
}

fn run_export(config: &CoreConfig, args: ExportArgs) -> Result<()> {
    let conn = open_store(config)?;
    let outcome = ExchangeService::new(&conn)
        .export_project(args.project)
        .context("failed to export project")?;
    let Some(records) = outcome.entity else {
        bail!("export rejected: {}", outcome.errors.join("; "));
    };
    write_records(&records, args.pretty || config.pretty_json)
}

fn run_import(config: &CoreConfig, args: InputArgs) -> Result<()> {
    let input = read_input(args.file.as_deref())?;
    let records = decode_str(&input, DispatchTable::global()).context("failed to decode input")?;

    let conn = open_store(config)?;
    let indexer: Arc<dyn SearchIndexer> = match config.search_index_url.as_deref() {
        Some(url) => Arc::new(HttpSearchIndexClient::new(url).context("invalid search index URL")?),
        None => Arc::new(NoopIndexer),
    };
    let outcome = ExchangeService::with_indexer(&conn, indexer)
        .import(records)
        .context("failed to import records")?;
    let Some(summary) = outcome.entity else {
        for error in &outcome.errors {
            eprintln!("{error}");
        }
        bail!("import rejected with {} error(s)", outcome.errors.len());
    };
    println!("created={} updated={}", summary.created, summary.updated);
    Ok(())
}

fn open_store(config: &CoreConfig) -> Result<Connection> {
    if config.uses_in_memory_database() {
        return uidsm_core::open_db_in_memory().context("failed to open in-memory store");
    }
    uidsm_core::open_db(&config.database_path).with_context(|| {
        format!(
            "failed to open store `{}`",
            config.database_path.display()
        )
    })
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read `{}`", path.display()))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn write_records(records: &[uidsm_core::EntityDto], pretty: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut sink = stdout.lock();
    encode(
        records,
        &mut sink,
        &CodecOptions { pretty },
        DispatchTable::global(),
    )
    .context("failed to encode records")?;
    writeln!(sink).context("failed to write output")?;
    Ok(())
}
