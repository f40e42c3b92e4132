//! Command-line entry point for cronsync.
//!
//! `sync` reconciles `scheduler/tasks.yaml` into the task database;
//! `export` writes the stored tasks back out as a YAML document draft.
//!
//! All tracing/diagnostic output goes to stderr so that stdout stays clean
//! for `export` pipelines.

use clap::{Parser, Subcommand};
use cronsync::condition::ContextConditionEvaluator;
use cronsync::registry::load_registries;
use cronsync::{Reconciler, SqliteTaskStore, TaskBuilder, TaskDocument, export_tasks};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// cronsync: declarative scheduler-task synchronization.
#[derive(Parser)]
#[command(name = "cronsync", version, about)]
struct Cli {
    /// Path to the SQLite task database.
    #[arg(long)]
    db: PathBuf,

    /// Directory holding `scheduler/tasks.yaml` and `scheduler/registry.yaml`.
    #[arg(long, default_value = "config")]
    config_root: PathBuf,

    /// Increase verbosity (-v: per-entry decisions, -vv: unchanged entries too).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Synchronize the task document into the database.
    Sync {
        /// Condition context variable as KEY=VALUE (repeatable).
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
    },

    /// Write every stored task as a YAML document draft to stdout.
    Export,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("cronsync failed: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Sync { context } => run_sync(&cli.db, &cli.config_root, context),
        Command::Export => run_export(&cli.db),
    }
}

fn run_sync(db: &Path, config_root: &Path, context: &[String]) -> anyhow::Result<()> {
    // Configuration loads before the store opens; a rejected document
    // must not leave a freshly created database behind.
    let document = TaskDocument::load(config_root)?;
    let (types, commands) = load_registries(config_root)?;
    let evaluator = ContextConditionEvaluator::new(parse_context(context)?);

    let store = SqliteTaskStore::open(db)?;
    let builder = TaskBuilder::new(&types, &commands);
    let reconciler = Reconciler::new(&store, builder, &evaluator);
    let summary = reconciler.run(&document)?;

    println!("synchronized: {summary}");
    Ok(())
}

fn run_export(db: &Path) -> anyhow::Result<()> {
    let store = SqliteTaskStore::open(db)?;
    let document = export_tasks(&store)?;
    print!("{}", serde_yaml::to_string(&document)?);
    Ok(())
}

/// Parse repeated `KEY=VALUE` pairs into the condition context.
fn parse_context(pairs: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut context = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("--context expects KEY=VALUE, got `{pair}`"))?;
        context.insert(key.to_owned(), value.to_owned());
    }
    Ok(context)
}

/// Tracing to stderr; `-v` raises the default level, `RUST_LOG` overrides.
fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "cronsync=warn",
        1 => "cronsync=info",
        _ => "cronsync=debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}
