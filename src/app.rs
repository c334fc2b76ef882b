//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - sets up logging
//! - loads configuration and applies CLI overrides
//! - dispatches to ingestion, analytics or document display
//!
//! Exit codes: 2 for configuration/storage setup errors, 3 when an ingestion
//! run had failures, 4 when a statistic could not be computed.

use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::analytics::AnalyticsReport;
use crate::cli::{AnalyzeArgs, Command, IngestArgs, LogFormat, RunArgs, ShowArgs};
use crate::config::PipelineConfig;
use crate::domain::StorageKey;
use crate::error::AppError;
use crate::ingest::IngestSummary;
use crate::store::ObjectStore;

pub mod pipeline;

/// Entry point for the `harvest` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_tracing(cli.log_format);

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.store {
        config.store.root = root;
    }

    match cli.command {
        Command::Ingest(args) => handle_ingest(config, &args),
        Command::Analyze(args) => handle_analyze(config, &args),
        Command::Run(args) => handle_run(config, &args),
        Command::Show(args) => handle_show(&config, &args),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the report; logs go to stderr.
    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(err) = result {
        eprintln!("logging already initialised: {err}");
    }
}

fn handle_ingest(mut config: PipelineConfig, args: &IngestArgs) -> Result<(), AppError> {
    apply_ingest_overrides(&mut config, args)?;
    let as_of = args.date.unwrap_or_else(today);

    let store = pipeline::ingest_store(&config, args.dry_run);
    let ingestor = pipeline::build_ingestor(&config, store)?;
    let summary = ingestor.run_once(as_of)?;

    print_summary(&summary, args.json)?;
    print_dry_run_note(args.dry_run);
    ingest_exit(&summary)
}

fn handle_analyze(mut config: PipelineConfig, args: &AnalyzeArgs) -> Result<(), AppError> {
    apply_analyze_overrides(&mut config, args)?;

    let store = pipeline::open_store(&config);
    let report = pipeline::run_analytics(store.as_ref(), &config.analytics, args.date)?;

    print_report(&report, args.json)?;
    if let Some(dir) = &args.export {
        crate::io::export_analytics(dir, &report)?;
    }
    analytics_exit(&report)
}

fn handle_run(mut config: PipelineConfig, args: &RunArgs) -> Result<(), AppError> {
    apply_ingest_overrides(&mut config, &args.ingest)?;
    let as_of = args.ingest.date.unwrap_or_else(today);

    let store = pipeline::ingest_store(&config, args.ingest.dry_run);
    let ingestor = pipeline::build_ingestor(&config, store.clone())?;
    let out = pipeline::run_and_analyze(ingestor, store.as_ref(), &config.analytics, as_of)?;

    print_summary(&out.summary, args.ingest.json)?;
    print_dry_run_note(args.ingest.dry_run);
    if let Some(report) = &out.analytics {
        print_report(report, args.ingest.json)?;
        if let Some(dir) = &args.export {
            crate::io::export_analytics(dir, report)?;
        }
    }

    ingest_exit(&out.summary)?;
    match &out.analytics {
        Some(report) => analytics_exit(report),
        None => Ok(()),
    }
}

fn handle_show(config: &PipelineConfig, args: &ShowArgs) -> Result<(), AppError> {
    let key = StorageKey::parse(&args.key).ok_or_else(|| {
        AppError::new(
            2,
            format!("Invalid key '{}' (expected {{group}}/{{identifier}}/YYYY-MM-DD.json).", args.key),
        )
    })?;
    let store = pipeline::open_store(config);
    let body = store
        .get(&key)?
        .ok_or_else(|| AppError::new(4, format!("No document stored at {key}.")))?;
    print!("{}", String::from_utf8_lossy(&body));
    Ok(())
}

fn apply_ingest_overrides(config: &mut PipelineConfig, args: &IngestArgs) -> Result<(), AppError> {
    if !args.series.is_empty() {
        config.catalog = args.series.clone();
    }
    if args.start_year.is_some() {
        config.start_year = args.start_year;
    }
    if args.end_year.is_some() {
        config.end_year = args.end_year;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.dry_run {
        config.notify.webhook_url = None;
    }
    config.validate()
}

fn apply_analyze_overrides(config: &mut PipelineConfig, args: &AnalyzeArgs) -> Result<(), AppError> {
    let analytics = &mut config.analytics;
    if let Some(from) = args.population_from {
        analytics.population_from = from;
    }
    if let Some(to) = args.population_to {
        analytics.population_to = to;
    }
    if let Some(series) = &args.report_series {
        analytics.report_series = series.clone();
    }
    if let Some(period) = &args.report_period {
        analytics.report_period = period.clone();
    }
    config.validate()
}

fn print_summary(summary: &IngestSummary, json: bool) -> Result<(), AppError> {
    if json {
        println!("{}", to_json(summary)?);
    } else {
        println!("{}", crate::report::format_ingest_summary(summary));
    }
    Ok(())
}

// Goes to stderr so `--json` output stays parseable.
fn print_dry_run_note(dry_run: bool) {
    if dry_run {
        eprintln!("Dry run: the keys above were not written and no notifications were sent.");
    }
}

fn print_report(report: &AnalyticsReport, json: bool) -> Result<(), AppError> {
    if json {
        println!("{}", to_json(report)?);
    } else {
        println!("{}", crate::report::format_analytics_report(report));
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::new(4, format!("Failed to encode JSON output: {e}")))
}

fn ingest_exit(summary: &IngestSummary) -> Result<(), AppError> {
    if summary.is_clean() {
        return Ok(());
    }
    let population = if summary.population.status.is_success() { "ok" } else { "failed" };
    Err(AppError::new(
        3,
        format!(
            "Ingestion finished with failures: {} of {} series failed, population {population}.",
            summary.failed(),
            summary.series.len()
        ),
    ))
}

fn analytics_exit(report: &AnalyticsReport) -> Result<(), AppError> {
    let failed = report.failed_statistics();
    if failed.is_empty() {
        return Ok(());
    }
    Err(AppError::new(4, format!("Statistics not computed: {}.", failed.join(", "))))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{LoadedTables, analyze};
    use crate::config::AnalyticsConfig;
    use crate::error::{ErrorKind, PipelineError};
    use crate::ingest::{OutcomeStatus, PopulationOutcome, SeriesOutcome};

    fn summary(series_ok: bool, population_ok: bool) -> IngestSummary {
        let status = |ok: bool| {
            if ok {
                OutcomeStatus::Succeeded {
                    key: "k".into(),
                    records: 1,
                }
            } else {
                OutcomeStatus::failed(PipelineError::upstream("down"))
            }
        };
        let ts = Utc::now();
        IngestSummary {
            as_of: ts.date_naive(),
            start_year: 2023,
            end_year: 2025,
            started_at: ts,
            finished_at: ts,
            series: vec![SeriesOutcome {
                series_id: "A".into(),
                status: status(series_ok),
            }],
            population: PopulationOutcome {
                dataset: "nation".into(),
                status: status(population_ok),
            },
            notifications_failed: 0,
        }
    }

    #[test]
    fn ingest_failures_exit_three() {
        assert!(ingest_exit(&summary(true, true)).is_ok());
        assert_eq!(ingest_exit(&summary(false, true)).unwrap_err().exit_code(), 3);
        let err = ingest_exit(&summary(true, false)).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("population failed"));
    }

    #[test]
    fn failed_statistics_exit_four() {
        let report = analyze(&LoadedTables::default(), &AnalyticsConfig::default(), None);
        assert_eq!(report.population_stats.error_kind(), Some(ErrorKind::InsufficientData));
        let err = analytics_exit(&report).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("population_stats"));
    }

    #[test]
    fn ingest_overrides_replace_catalog_and_revalidate() {
        let mut config = PipelineConfig::default();
        let args = IngestArgs {
            date: None,
            start_year: Some(2013),
            end_year: Some(2018),
            series: vec!["PRS30006032".into()],
            workers: Some(4),
            json: false,
            dry_run: false,
        };
        apply_ingest_overrides(&mut config, &args).unwrap();
        assert_eq!(config.catalog, vec!["PRS30006032"]);
        assert_eq!((config.start_year, config.end_year, config.workers), (Some(2013), Some(2018), 4));

        let bad = IngestArgs {
            start_year: Some(2020),
            end_year: Some(2010),
            ..args
        };
        assert_eq!(apply_ingest_overrides(&mut config, &bad).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn dry_run_drops_webhook() {
        let mut config = PipelineConfig::default();
        config.notify.webhook_url = Some("http://localhost:9/hook".into());
        let args = IngestArgs {
            date: None,
            start_year: None,
            end_year: None,
            series: Vec::new(),
            workers: None,
            json: false,
            dry_run: true,
        };
        apply_ingest_overrides(&mut config, &args).unwrap();
        assert_eq!(config.notify.webhook_url, None);
    }
}
