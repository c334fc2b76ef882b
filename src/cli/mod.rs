//! Command-line parsing for the series harvester.
//!
//! Argument parsing and dispatch stay separate from fetching, storage and
//! statistics so those can be tested without a process.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "harvest", version, about = "Economic series and population harvester")]
pub struct Cli {
    /// TOML configuration file (defaults are used when omitted).
    #[arg(long, global = true, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Object store root directory (overrides `store.root`).
    #[arg(long, global = true, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Log output format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every catalog series and the population dataset once, and store them.
    ///
    /// Exits 3 when any series or the population step failed.
    Ingest(IngestArgs),
    /// Compute statistics over the stored documents.
    Analyze(AnalyzeArgs),
    /// Ingest, then analyze if the run produced a population write.
    Run(RunArgs),
    /// Print a stored document by key (e.g. `series/CUUR0000SA0/2025-01-31.json`).
    Show(ShowArgs),
}

/// Options for one ingestion run.
#[derive(Debug, Args, Clone)]
pub struct IngestArgs {
    /// Ingestion date used in storage keys (defaults to today, UTC).
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<NaiveDate>,

    /// First year to fetch.
    #[arg(long)]
    pub start_year: Option<i32>,

    /// Last year to fetch.
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Only fetch these series (repeatable; replaces the configured catalog).
    #[arg(long = "series", value_name = "ID")]
    pub series: Vec<String>,

    /// Number of parallel fetch workers.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Print the summary as JSON instead of a table.
    #[arg(long)]
    pub json: bool,

    /// Fetch everything but keep documents in memory; nothing is written or notified.
    #[arg(long)]
    pub dry_run: bool,
}

/// Options for the analytics pass.
#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    /// Use the documents ingested on this date (defaults to the latest per dataset).
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<NaiveDate>,

    /// First year of the population statistics.
    #[arg(long = "from")]
    pub population_from: Option<i32>,

    /// Last year of the population statistics.
    #[arg(long = "to")]
    pub population_to: Option<i32>,

    /// Series of the combined report.
    #[arg(long = "report-series", value_name = "ID")]
    pub report_series: Option<String>,

    /// Period of the combined report (e.g. Q01, M01).
    #[arg(long = "period")]
    pub report_period: Option<String>,

    /// Write CSV/JSON exports into this directory.
    #[arg(long, value_name = "DIR")]
    pub export: Option<PathBuf>,

    /// Print the report as JSON instead of tables.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub ingest: IngestArgs,

    /// Write analytics CSV/JSON exports into this directory.
    #[arg(long, value_name = "DIR")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Storage key, `{group}/{identifier}/{YYYY-MM-DD}.json`.
    pub key: String,
}
