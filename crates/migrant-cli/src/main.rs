mod completion;
mod config;
mod dispatch;
mod orchestrator;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use migrant_core::MatchType;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::completion::CliCompletionShell;

#[derive(Parser, Debug)]
#[command(name = "migrant")]
#[command(
    about = "Inventory installed Windows applications and reinstall them from a package catalog",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to <state prefix>/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Portable catalog directory containing choco.exe.
    #[arg(long, global = true)]
    catalog_root: Option<PathBuf>,
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List installed applications.
    Scan {
        #[command(flatten)]
        sources: SourceArgs,
        /// Save the inventory to this file.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Scan, match and write a migration plan.
    Plan {
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        sources: SourceArgs,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        html: Option<PathBuf>,
        /// Match one application at a time.
        #[arg(long)]
        sequential: bool,
    },
    Export {
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long, value_enum)]
        format: ExportFormat,
        #[arg(long)]
        out: PathBuf,
    },
    /// Change which plan entries will be installed.
    Select {
        #[arg(long)]
        plan: Option<PathBuf>,
        #[command(flatten)]
        selection: SelectionArgs,
        /// With --entry, deselect instead of select.
        #[arg(
            long,
            requires = "entry",
            conflicts_with_all = ["all", "none", "min_confidence", "match_type"]
        )]
        off: bool,
    },
    /// Pin an entry to a catalog version.
    Lock {
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long)]
        entry: usize,
        #[arg(long)]
        version: String,
    },
    Unlock {
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long)]
        entry: usize,
    },
    /// Install every selected entry of a plan.
    Install {
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long)]
        max_concurrent: Option<usize>,
        #[arg(long)]
        dry_run: bool,
    },
    Mappings {
        #[command(subcommand)]
        command: MappingCommands,
    },
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    Completions {
        #[arg(value_enum)]
        shell: Option<CliCompletionShell>,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct SourceArgs {
    /// Read the inventory from a snapshot instead of this machine.
    #[arg(long)]
    from_snapshot: Option<PathBuf>,
    #[arg(long)]
    skip_registry: bool,
    #[arg(long)]
    skip_store: bool,
    #[arg(long)]
    skip_catalog: bool,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct SelectionArgs {
    /// Select every matched entry.
    #[arg(long)]
    all: bool,
    #[arg(long)]
    none: bool,
    /// Select exactly the entries at or above this confidence.
    #[arg(long)]
    min_confidence: Option<f64>,
    /// Add every entry of this match type to the selection.
    #[arg(long, value_parser = parse_match_type)]
    match_type: Option<MatchType>,
    #[arg(long)]
    entry: Option<usize>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
    Html,
}

#[derive(Subcommand, Debug)]
enum MappingCommands {
    List,
    Add { app: String, package_id: String },
    Remove { app: String },
    Export { file: PathBuf },
    Import { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum CatalogCommands {
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    Outdated,
    Installed { package_id: String },
    Doctor,
    Upgrade { package_id: String },
    Uninstall { package_id: String },
}

fn parse_match_type(value: &str) -> Result<MatchType, String> {
    MatchType::parse(value).ok_or_else(|| {
        format!("unknown match type '{value}' (expected exact, fuzzy, search, manual or none)")
    })
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    dispatch::run_cli(cli)
}
