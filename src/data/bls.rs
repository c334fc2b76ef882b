//! BLS public API (v2) integration.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SeriesApiConfig;
use crate::data::SeriesSource;
use crate::domain::SeriesObservation;
use crate::error::{AppError, PipelineError};

const STATUS_SUCCEEDED: &str = "REQUEST_SUCCEEDED";

pub struct BlsClient {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl BlsClient {
    /// Build a client from config, reading the registration key from the
    /// environment (`.env` is honored). The key is optional: BLS serves
    /// unregistered requests with lower limits.
    pub fn from_env(config: &SeriesApiConfig) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Ok(Self {
            client: super::http_client()?,
            url: config.url.clone(),
            api_key,
        })
    }
}

impl SeriesSource for BlsClient {
    fn fetch(
        &self,
        series_id: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<SeriesObservation>, PipelineError> {
        let request = SeriesRequest {
            seriesid: [series_id],
            startyear: start_year.to_string(),
            endyear: end_year.to_string(),
            registrationkey: self.api_key.as_deref(),
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .map_err(|e| PipelineError::upstream(format!("BLS request for {series_id} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::upstream(format!(
                "BLS request for {series_id} failed with status {status}."
            )));
        }

        let body = resp
            .text()
            .map_err(|e| PipelineError::upstream(format!("Failed to read BLS response for {series_id}: {e}")))?;

        let observations = decode_series_response(series_id, &body)?;
        debug!(series_id, n = observations.len(), "decoded BLS response");
        Ok(observations)
    }
}

#[derive(Debug, Serialize)]
struct SeriesRequest<'a> {
    seriesid: [&'a str; 1],
    startyear: String,
    endyear: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    registrationkey: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    status: String,
    #[serde(default)]
    message: Vec<String>,
    #[serde(rename = "Results", default)]
    results: Option<SeriesResults>,
}

#[derive(Debug, Deserialize)]
struct SeriesResults {
    #[serde(default)]
    series: Vec<SeriesBlock>,
}

#[derive(Debug, Deserialize)]
struct SeriesBlock {
    #[serde(rename = "seriesID")]
    series_id: String,
    #[serde(default)]
    data: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
struct DataPoint {
    year: String,
    period: String,
    #[serde(rename = "periodName", default)]
    period_name: Option<String>,
    value: String,
}

/// Decode a BLS v2 response body into observations for `series_id`.
///
/// Observations are returned in upstream order; `value` is left unparsed.
pub fn decode_series_response(series_id: &str, body: &str) -> Result<Vec<SeriesObservation>, PipelineError> {
    let resp: SeriesResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::upstream(format!("Failed to parse BLS response for {series_id}: {e}")))?;

    if resp.status != STATUS_SUCCEEDED {
        let detail = if resp.message.is_empty() {
            String::new()
        } else {
            format!(" ({})", resp.message.join("; "))
        };
        return Err(PipelineError::upstream(format!(
            "BLS returned status {} for {series_id}{detail}.",
            resp.status
        )));
    }

    let results = resp
        .results
        .ok_or_else(|| PipelineError::upstream(format!("BLS response for {series_id} has no Results.")))?;

    let block = results
        .series
        .into_iter()
        .find(|b| b.series_id == series_id)
        .ok_or_else(|| PipelineError::upstream(format!("BLS response does not include series {series_id}.")))?;

    let mut out = Vec::with_capacity(block.data.len());
    for point in block.data {
        let year = point.year.trim().parse::<i32>().map_err(|e| {
            PipelineError::upstream(format!("Invalid BLS year '{}' for {series_id}: {e}", point.year))
        })?;
        out.push(SeriesObservation {
            series_id: series_id.to_string(),
            year,
            period: point.period,
            period_name: point.period_name,
            value: point.value,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const OK_BODY: &str = r#"{
        "status": "REQUEST_SUCCEEDED",
        "responseTime": 120,
        "message": [],
        "Results": {
            "series": [{
                "seriesID": "PRS30006032",
                "data": [
                    {"year": "2018", "period": "Q01", "periodName": "1st Quarter", "value": "1.9", "footnotes": [{}]},
                    {"year": "2017", "period": "Q01", "periodName": "1st Quarter", "value": "1.5", "footnotes": [{}]}
                ]
            }]
        }
    }"#;

    #[test]
    fn decodes_successful_payload() {
        let obs = decode_series_response("PRS30006032", OK_BODY).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].year, 2018);
        assert_eq!(obs[0].period, "Q01");
        assert_eq!(obs[0].period_name.as_deref(), Some("1st Quarter"));
        assert_eq!(obs[0].value, "1.9");
        assert_eq!(obs[1].series_id, "PRS30006032");
    }

    #[test]
    fn failed_status_is_upstream_error_not_empty() {
        let body = r#"{"status": "REQUEST_NOT_PROCESSED", "message": ["daily threshold reached"], "Results": {}}"#;
        let err = decode_series_response("X", body).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upstream);
        assert!(err.message.contains("daily threshold reached"));
    }

    #[test]
    fn malformed_payloads_are_upstream_errors() {
        let err = decode_series_response("X", "<html>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upstream);

        let body = r#"{"status": "REQUEST_SUCCEEDED", "Results": {"series": [{"seriesID": "X", "data": [
            {"year": "20x8", "period": "M01", "value": "1"}
        ]}]}}"#;
        let err = decode_series_response("X", body).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upstream);

        let body = r#"{"status": "REQUEST_SUCCEEDED", "Results": {"series": [{"seriesID": "Y", "data": []}]}}"#;
        assert!(decode_series_response("X", body).is_err());
    }

    #[test]
    fn empty_series_is_an_empty_result() {
        let body = r#"{"status": "REQUEST_SUCCEEDED", "message": ["No Data Available for Series X Year: 2025"],
            "Results": {"series": [{"seriesID": "X", "data": []}]}}"#;
        assert!(decode_series_response("X", body).unwrap().is_empty());
    }

    #[test]
    fn request_omits_missing_registration_key() {
        let req = SeriesRequest {
            seriesid: ["X"],
            startyear: "2023".to_string(),
            endyear: "2025".to_string(),
            registrationkey: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["seriesid"][0], "X");
        assert_eq!(json["startyear"], "2023");
        assert!(json.get("registrationkey").is_none());
    }
}
