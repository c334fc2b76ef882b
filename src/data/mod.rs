//! Upstream data sources.
//!
//! The orchestrator only sees the two traits below; the HTTP clients are one
//! implementation each. Retry and rate limiting live in [`throttle`] and are
//! applied by the caller, so a client performs exactly one request per call.

use crate::domain::{PopulationObservation, SeriesObservation};
use crate::error::PipelineError;

pub mod bls;
pub mod datausa;
pub mod throttle;

pub use bls::BlsClient;
pub use datausa::DataUsaClient;
pub use throttle::{RateLimiter, call_with_retry};

/// Economic time-series API.
pub trait SeriesSource: Send + Sync {
    /// Fetch all observations of `series_id` for `start_year..=end_year`.
    ///
    /// Any non-success response (transport, HTTP status, or a success-coded
    /// payload reporting failure) is an `Upstream` error, never an empty result.
    fn fetch(
        &self,
        series_id: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<SeriesObservation>, PipelineError>;
}

/// Demographic API.
pub trait PopulationSource: Send + Sync {
    fn fetch_population(&self) -> Result<Vec<PopulationObservation>, PipelineError>;
}

/// Shared HTTP client settings for both upstream clients.
pub(crate) fn http_client() -> Result<reqwest::blocking::Client, crate::error::AppError> {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(concat!("series-harvest/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| crate::error::AppError::new(2, format!("Failed to build HTTP client: {e}")))
}
