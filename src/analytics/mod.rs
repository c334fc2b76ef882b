//! Downstream analytics over the stored documents.
//!
//! Three statistics are computed independently; a failure in one is reported
//! next to the others instead of aborting the report.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AnalyticsConfig;
use crate::error::{ErrorKind, PipelineError};

pub mod load;
pub mod stats;

pub use load::{LoadIssue, LoadedTables, load_tables};
pub use stats::{BestYear, CombinedRow, PopulationStats, best_years, combined_report, population_stats};

/// Result of one statistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum StatOutcome<T> {
    Computed(T),
    Failed { kind: ErrorKind, message: String },
}

impl<T> StatOutcome<T> {
    pub fn computed(&self) -> Option<&T> {
        match self {
            StatOutcome::Computed(value) => Some(value),
            StatOutcome::Failed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            StatOutcome::Computed(_) => None,
            StatOutcome::Failed { kind, .. } => Some(*kind),
        }
    }
}

impl<T> From<Result<T, PipelineError>> for StatOutcome<T> {
    fn from(result: Result<T, PipelineError>) -> Self {
        match result {
            Ok(value) => StatOutcome::Computed(value),
            Err(err) => StatOutcome::Failed {
                kind: err.kind,
                message: err.message,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub as_of: Option<NaiveDate>,
    pub params: AnalyticsConfig,
    pub documents: usize,
    pub series_rows: usize,
    pub population_rows: usize,
    pub load_issues: Vec<LoadIssue>,
    pub population_stats: StatOutcome<PopulationStats>,
    pub best_years: StatOutcome<Vec<BestYear>>,
    pub combined_report: StatOutcome<Vec<CombinedRow>>,
}

impl AnalyticsReport {
    /// Names of the statistics that could not be computed.
    pub fn failed_statistics(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.population_stats.error_kind().is_some() {
            out.push("population_stats");
        }
        if self.best_years.error_kind().is_some() {
            out.push("best_years");
        }
        if self.combined_report.error_kind().is_some() {
            out.push("combined_report");
        }
        out
    }
}

/// Compute all three statistics from loaded tables.
pub fn analyze(tables: &LoadedTables, params: &AnalyticsConfig, as_of: Option<NaiveDate>) -> AnalyticsReport {
    let report = AnalyticsReport {
        as_of,
        params: params.clone(),
        documents: tables.documents.len(),
        series_rows: tables.series.len(),
        population_rows: tables.population.len(),
        load_issues: tables.issues.clone(),
        population_stats: population_stats(&tables.population, params.population_from, params.population_to).into(),
        best_years: best_years(&tables.series).into(),
        combined_report: combined_report(
            &tables.series,
            &tables.population,
            &params.report_series,
            &params.report_period,
        )
        .into(),
    };

    for name in report.failed_statistics() {
        warn!(statistic = name, "statistic not computed");
    }
    info!(
        documents = report.documents,
        series_rows = report.series_rows,
        population_rows = report.population_rows,
        "analytics complete"
    );
    report
}
