//! Rebuild the two observation tables from stored documents.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{DatasetGroup, IngestionRecord, Payload, PopulationObservation, SeriesObservation, StorageKey};
use crate::error::{ErrorKind, PipelineError};
use crate::store::{ObjectStore, get_document};

/// A stored document that was found but could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadIssue {
    pub key: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedTables {
    pub series: Vec<SeriesObservation>,
    pub population: Vec<PopulationObservation>,
    /// Keys the rows were read from.
    pub documents: Vec<String>,
    pub issues: Vec<LoadIssue>,
}

/// Read one document per identifier of both groups.
///
/// With `as_of` only documents from that date are used; otherwise the latest
/// document of each identifier. A listing or read failure aborts the load.
pub fn load_tables(store: &dyn ObjectStore, as_of: Option<NaiveDate>) -> Result<LoadedTables, PipelineError> {
    let mut tables = LoadedTables::default();

    for group in DatasetGroup::ALL {
        for key in select_keys(store.list(group)?, as_of) {
            let path = key.path();
            let record: IngestionRecord = match get_document(store, &key) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err) if err.kind == ErrorKind::MalformedValue => {
                    warn!(key = %path, error = %err.message, "skipping undecodable document");
                    tables.issues.push(LoadIssue {
                        key: path,
                        kind: err.kind,
                        message: err.message,
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };

            match (group, record.payload) {
                (DatasetGroup::Series, Payload::Series { observations, .. }) => {
                    tables.series.extend(observations);
                }
                (DatasetGroup::Population, Payload::Population { observations, .. }) => {
                    tables.population.extend(observations);
                }
                _ => {
                    warn!(key = %path, "document payload does not match its group");
                    tables.issues.push(LoadIssue {
                        key: path,
                        kind: ErrorKind::MalformedValue,
                        message: format!("Payload kind does not belong under '{}'.", group.as_str()),
                    });
                    continue;
                }
            }
            debug!(key = %path, "loaded document");
            tables.documents.push(path);
        }
    }

    Ok(tables)
}

/// One key per identifier: the one dated `as_of`, or the latest.
fn select_keys(keys: Vec<StorageKey>, as_of: Option<NaiveDate>) -> Vec<StorageKey> {
    let mut chosen: BTreeMap<String, StorageKey> = BTreeMap::new();
    for key in keys {
        if as_of.is_some_and(|d| d != key.date) {
            continue;
        }
        match chosen.get(&key.identifier) {
            Some(current) if current.date >= key.date => {}
            _ => {
                chosen.insert(key.identifier.clone(), key);
            }
        }
    }
    chosen.into_values().collect()
}
