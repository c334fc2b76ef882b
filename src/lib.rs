//! `series-harvest` library crate.
//!
//! The binary (`harvest`) is a thin wrapper around this library so that:
//!
//! - ingestion and analytics are testable without spawning processes or
//!   touching the network
//! - the scheduler-facing entry point stays a single call (`Ingestor::run_once`)

pub mod analytics;
pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod io;
pub mod notify;
pub mod report;
pub mod store;
