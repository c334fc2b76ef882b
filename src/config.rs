//! Pipeline configuration.
//!
//! Everything has a default, so the binary runs without a config file. A TOML
//! file (`--config`) can override any section; CLI flags override the file.
//!
//! ```toml
//! catalog = ["PRS30006032", "CUUR0000SA0"]
//! request_delay_ms = 500
//! budget_secs = 840
//! workers = 1
//!
//! [retry]
//! max_attempts = 2
//! backoff_ms = 500
//!
//! [store]
//! root = "data"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::is_valid_identifier;
use crate::error::AppError;

pub const DEFAULT_SERIES_URL: &str = "https://api.bls.gov/publicAPI/v2/timeseries/data/";
pub const DEFAULT_POPULATION_URL: &str = "https://datausa.io/api/data?drilldowns=Nation&measures=Population";

/// Series collected when no catalog is configured.
pub const DEFAULT_CATALOG: &[&str] = &[
    // Current Population Survey
    "LNS14000000",
    "LNS12000000",
    "LNS11000000",
    "LNS13000000",
    "LNS12300000",
    "LNS11300000",
    // Current Employment Statistics
    "CES0000000001",
    "CES0500000001",
    "CES9000000001",
    "CES0600000001",
    "CES0800000001",
    "CES3000000001",
    "CES3100000001",
    "CES3200000001",
    "CES4000000001",
    "CES4142000001",
    "CES5000000001",
    "CES5500000001",
    "CES6000000001",
    "CES6500000001",
    "CES7000000001",
    "CES0500000002",
    "CES0500000003",
    "CES0500000011",
    "CES3000000002",
    "CES3000000003",
    // CPI
    "CUUR0000SA0",
    "CUUR0000SA0L1E",
    "CUUR0000SAF1",
    "CUUR0000SAH1",
    "CUUR0000SETB01",
    "CUUR0000SAM",
    "CUUR0000SAE1",
    "CUUR0000SAT1",
    // PPI
    "WPUFD49207",
    "WPUFD49104",
    "WPSSOP61",
    "WPU101",
    // Productivity and costs
    "PRS85006092",
    "PRS85006112",
    "PRS85006152",
    "PRS85006062",
    "PRS85006032",
    "PRS30006032",
    // JOLTS
    "JTS1000JOL",
    "JTS1000HIL",
    "JTS1000TSL",
    "JTS1000QUL",
    "JTS1000LDL",
    // Metro unemployment
    "LAUMT064974000000003",
    "LAUMT121470000000003",
    "LAUMT173574000000003",
    "LAUMT362034000000003",
    "LAUMT484274000000003",
    // Industry employment
    "CES1021000001",
    "CES2000000001",
    "CES4300000001",
    "CES5552000001",
    "CES6054000001",
    "CES6562000001",
    "CES7072000001",
    // Demographic unemployment rates
    "LNS14000003",
    "LNS14000006",
    "LNS14000009",
    "LNS14000012",
    "LNS14000024",
    "LNS14000025",
    "LNS14000089",
    // Other
    "CUUS0000SA0",
    "PRS88003092",
    "JTS3000HIL",
    "CES0500000007",
];

/// Immutable, validated list of series identifiers.
///
/// Cloning is cheap; the orchestrator and its workers share one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog(Arc<[String]>);

impl Catalog {
    pub fn new<I, S>(ids: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Err(AppError::new(2, "Series catalog is empty."));
        }
        let mut seen = HashSet::new();
        for id in &ids {
            if !is_valid_identifier(id) {
                return Err(AppError::new(
                    2,
                    format!("Invalid series identifier '{id}' (allowed: A-Z a-z 0-9 - _ .)."),
                ));
            }
            if !seen.insert(id.as_str()) {
                return Err(AppError::new(2, format!("Duplicate series identifier '{id}' in catalog.")));
            }
        }
        Ok(Self(ids.into()))
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Upstream retry policy, applied uniformly per upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `backoff_ms * n` before retrying.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Root directory of the object store.
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeriesApiConfig {
    pub url: String,
    /// Environment variable holding the optional registration key.
    pub api_key_env: String,
}

impl Default for SeriesApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERIES_URL.to_string(),
            api_key_env: "BLS_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PopulationApiConfig {
    pub url: String,
    /// Identifier segment of the population storage key.
    pub dataset: String,
}

impl Default for PopulationApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_POPULATION_URL.to_string(),
            dataset: "nation".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    /// POST one JSON message per successful write to this URL.
    pub webhook_url: Option<String>,
}

/// Parameters of the three downstream statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyticsConfig {
    pub population_from: i32,
    pub population_to: i32,
    pub report_series: String,
    pub report_period: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            population_from: 2013,
            population_to: 2018,
            report_series: "PRS30006032".to_string(),
            report_period: "Q01".to_string(),
        }
    }
}

/// Full pipeline configuration as read from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub catalog: Vec<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    /// Minimum spacing between consecutive upstream calls.
    pub request_delay_ms: u64,
    /// Wall-clock budget for one ingestion run.
    pub budget_secs: u64,
    pub workers: usize,
    pub retry: RetryPolicy,
    pub store: StoreConfig,
    pub series_api: SeriesApiConfig,
    pub population_api: PopulationApiConfig,
    pub notify: NotifyConfig,
    pub analytics: AnalyticsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog: DEFAULT_CATALOG.iter().map(|s| s.to_string()).collect(),
            start_year: None,
            end_year: None,
            request_delay_ms: 500,
            // 14 minutes; the scheduled job is killed at 15.
            budget_secs: 840,
            workers: 1,
            retry: RetryPolicy::default(),
            store: StoreConfig::default(),
            series_api: SeriesApiConfig::default(),
            population_api: PopulationApiConfig::default(),
            notify: NotifyConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from `path` (if given) and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    AppError::new(2, format!("Failed to read config '{}': {e}", path.display()))
                })?;
                Self::from_toml_str(&raw)
                    .map_err(|e| AppError::new(2, format!("Invalid config '{}': {e}", path.display())))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        Catalog::new(self.catalog.iter().cloned())?;
        if self.retry.max_attempts == 0 {
            return Err(AppError::new(2, "retry.max_attempts must be at least 1."));
        }
        if self.workers == 0 {
            return Err(AppError::new(2, "workers must be at least 1."));
        }
        if let (Some(start), Some(end)) = (self.start_year, self.end_year) {
            if start > end {
                return Err(AppError::new(2, format!("start_year {start} is after end_year {end}.")));
            }
        }
        if !is_valid_identifier(&self.population_api.dataset) {
            return Err(AppError::new(
                2,
                format!("Invalid population dataset name '{}'.", self.population_api.dataset),
            ));
        }
        if self.analytics.population_from > self.analytics.population_to {
            return Err(AppError::new(
                2,
                format!(
                    "analytics.population_from {} is after population_to {}.",
                    self.analytics.population_from, self.analytics.population_to
                ),
            ));
        }
        Ok(())
    }

    pub fn catalog(&self) -> Result<Catalog, AppError> {
        Catalog::new(self.catalog.iter().cloned())
    }
}
