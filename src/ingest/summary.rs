//! Per-run ingestion results.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::domain::StorageKey;
use crate::error::{ErrorKind, PipelineError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded { key: String, records: usize },
    Failed { kind: ErrorKind, message: String },
}

impl OutcomeStatus {
    pub fn succeeded(key: &StorageKey, records: usize) -> Self {
        OutcomeStatus::Succeeded {
            key: key.path(),
            records,
        }
    }

    pub fn failed(err: PipelineError) -> Self {
        OutcomeStatus::Failed {
            kind: err.kind,
            message: err.message,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Succeeded { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OutcomeStatus::Succeeded { .. } => None,
            OutcomeStatus::Failed { kind, .. } => Some(*kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesOutcome {
    pub series_id: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopulationOutcome {
    pub dataset: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// Everything one `run_once` did, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub as_of: NaiveDate,
    pub start_year: i32,
    pub end_year: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub series: Vec<SeriesOutcome>,
    pub population: PopulationOutcome,
    /// Successful writes whose notification could not be delivered.
    pub notifications_failed: usize,
}

impl IngestSummary {
    pub fn succeeded(&self) -> usize {
        self.series.iter().filter(|s| s.status.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.series.len() - self.succeeded()
    }

    pub fn failed_series(&self) -> impl Iterator<Item = &SeriesOutcome> {
        self.series.iter().filter(|s| !s.status.is_success())
    }

    /// Series failure counts grouped by kind.
    pub fn failures_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut out = BTreeMap::new();
        for kind in self.series.iter().filter_map(|s| s.status.error_kind()) {
            *out.entry(kind).or_insert(0) += 1;
        }
        out
    }

    /// No series and no population failure.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.population.status.is_success()
    }
}
