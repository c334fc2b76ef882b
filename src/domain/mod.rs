//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - upstream observations (`SeriesObservation`, `PopulationObservation`)
//! - the persisted unit (`IngestionRecord`, `Payload`, `Source`)
//! - deterministic object keys (`StorageKey`, `DatasetGroup`)

pub mod types;

pub use types::*;
