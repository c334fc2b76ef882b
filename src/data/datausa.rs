//! DataUSA population API integration.

use std::collections::BTreeMap;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::PopulationApiConfig;
use crate::data::PopulationSource;
use crate::domain::PopulationObservation;
use crate::error::{AppError, PipelineError};

pub struct DataUsaClient {
    client: Client,
    url: String,
}

impl DataUsaClient {
    pub fn new(config: &PopulationApiConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: super::http_client()?,
            url: config.url.clone(),
        })
    }
}

impl PopulationSource for DataUsaClient {
    fn fetch_population(&self) -> Result<Vec<PopulationObservation>, PipelineError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| PipelineError::upstream(format!("DataUSA request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::upstream(format!(
                "DataUSA request failed with status {status}."
            )));
        }

        let body = resp
            .text()
            .map_err(|e| PipelineError::upstream(format!("Failed to read DataUSA response: {e}")))?;
        let observations = decode_population_response(&body)?;
        debug!(n = observations.len(), "decoded DataUSA response");
        Ok(observations)
    }
}

#[derive(Debug, Deserialize)]
struct PopulationResponse {
    data: Vec<PopulationRow>,
}

#[derive(Debug, Deserialize)]
struct PopulationRow {
    #[serde(rename = "Year")]
    year: YearField,
    #[serde(rename = "Population")]
    population: f64,
}

/// DataUSA has served `Year` both as a number and as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum YearField {
    Number(i32),
    Text(String),
}

impl YearField {
    fn resolve(&self) -> Result<i32, PipelineError> {
        match self {
            YearField::Number(y) => Ok(*y),
            YearField::Text(s) => s
                .trim()
                .parse::<i32>()
                .map_err(|e| PipelineError::upstream(format!("Invalid DataUSA year '{s}': {e}"))),
        }
    }
}

/// Decode a DataUSA response into population rows sorted by year.
///
/// Counts arrive as floats (`316128839.0`) and are rounded to whole people.
pub fn decode_population_response(body: &str) -> Result<Vec<PopulationObservation>, PipelineError> {
    let resp: PopulationResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::upstream(format!("Failed to parse DataUSA response: {e}")))?;

    let mut by_year = BTreeMap::new();
    for row in resp.data {
        let year = row.year.resolve()?;
        if !(row.population.is_finite() && row.population >= 0.0) {
            return Err(PipelineError::upstream(format!(
                "Invalid DataUSA population {} for {year}.",
                row.population
            )));
        }
        let population = row.population.round() as u64;
        if by_year.insert(year, population).is_some() {
            return Err(PipelineError::upstream(format!("DataUSA returned year {year} twice.")));
        }
    }

    Ok(by_year
        .into_iter()
        .map(|(year, population)| PopulationObservation { year, population })
        .collect())
}
