//! Reporting: formatted terminal output for ingestion and analytics runs.

pub mod format;

pub use format::{format_analytics_report, format_ingest_summary};
