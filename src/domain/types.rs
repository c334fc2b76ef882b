//! Shared domain types.
//!
//! These types are the persisted contract between ingestion and analytics:
//! the orchestrator writes `IngestionRecord`s at `StorageKey`s, the aggregator
//! reads them back. Nothing else is shared between the two.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One data point of one economic series.
///
/// `value` is kept exactly as the upstream API sent it. It is parsed only when
/// arithmetic needs it (see [`SeriesObservation::parsed_value`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesObservation {
    pub series_id: String,
    pub year: i32,
    /// Period code, e.g. `Q01` or `M07`.
    pub period: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_name: Option<String>,
    pub value: String,
}

impl SeriesObservation {
    /// Parse `value` as a finite decimal.
    pub fn parsed_value(&self) -> Result<f64, PipelineError> {
        let raw = self.value.trim();
        let parsed = raw.parse::<f64>().map_err(|e| {
            PipelineError::malformed(format!(
                "{} {} {}: value '{}' is not numeric ({e})",
                self.series_id, self.year, self.period, self.value
            ))
        })?;
        if !parsed.is_finite() {
            return Err(PipelineError::malformed(format!(
                "{} {} {}: value '{}' is not finite",
                self.series_id, self.year, self.period, self.value
            )));
        }
        Ok(parsed)
    }
}

/// Nation-level population for one year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationObservation {
    pub year: i32,
    pub population: u64,
}

/// Which upstream API produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    SeriesApi,
    PopulationApi,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::SeriesApi => "series_api",
            Source::PopulationApi => "population_api",
        }
    }
}

/// Top-level grouping of stored documents (the first key segment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetGroup {
    Series,
    Population,
}

impl DatasetGroup {
    pub const ALL: [DatasetGroup; 2] = [DatasetGroup::Series, DatasetGroup::Population];

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetGroup::Series => "series",
            DatasetGroup::Population => "population",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "series" => Some(DatasetGroup::Series),
            "population" => Some(DatasetGroup::Population),
            _ => None,
        }
    }
}

/// Deterministic object key: `{group}/{identifier}/{YYYY-MM-DD}.json`.
///
/// The same `(group, identifier, date)` always renders the same path, so a
/// second ingestion on the same day overwrites instead of duplicating.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    pub group: DatasetGroup,
    pub identifier: String,
    pub date: NaiveDate,
}

impl StorageKey {
    pub fn new(group: DatasetGroup, identifier: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            group,
            identifier: identifier.into(),
            date,
        }
    }

    pub fn series(series_id: &str, date: NaiveDate) -> Self {
        Self::new(DatasetGroup::Series, series_id, date)
    }

    pub fn population(dataset: &str, date: NaiveDate) -> Self {
        Self::new(DatasetGroup::Population, dataset, date)
    }

    /// Render the key as a `/`-separated path.
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}.json",
            self.group.as_str(),
            self.identifier,
            self.date.format("%Y-%m-%d")
        )
    }

    /// Recover a key from its path. Returns `None` for anything else.
    pub fn parse(path: &str) -> Option<Self> {
        let mut parts = path.split('/');
        let group = DatasetGroup::from_segment(parts.next()?)?;
        let identifier = parts.next()?;
        let file = parts.next()?;
        if parts.next().is_some() || !is_valid_identifier(identifier) {
            return None;
        }
        let date = file.strip_suffix(".json")?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        let key = Self::new(group, identifier, date);
        // Rejects unpadded dates, which would render to a different path.
        (key.path() == path).then_some(key)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Whether `id` is usable as the identifier segment of a key.
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Dataset payload of a stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Series {
        series_id: String,
        observations: Vec<SeriesObservation>,
    },
    Population {
        dataset: String,
        observations: Vec<PopulationObservation>,
    },
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Series { observations, .. } => observations.len(),
            Payload::Population { observations, .. } => observations.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn year_range(&self) -> Option<[i32; 2]> {
        let years: Vec<i32> = match self {
            Payload::Series { observations, .. } => observations.iter().map(|o| o.year).collect(),
            Payload::Population { observations, .. } => observations.iter().map(|o| o.year).collect(),
        };
        let min = years.iter().copied().min()?;
        let max = years.iter().copied().max()?;
        Some([min, max])
    }
}

/// The persisted unit: one payload plus capture metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub ingestion_timestamp: DateTime<Utc>,
    pub ingestion_date: NaiveDate,
    pub source: Source,
    pub record_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_range: Option<[i32; 2]>,
    pub payload: Payload,
}

impl IngestionRecord {
    pub fn new(
        source: Source,
        ingestion_timestamp: DateTime<Utc>,
        ingestion_date: NaiveDate,
        payload: Payload,
    ) -> Self {
        Self {
            ingestion_timestamp,
            ingestion_date,
            source,
            record_count: payload.len(),
            year_range: payload.year_range(),
            payload,
        }
    }
}
