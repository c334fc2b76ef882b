//! Input/output helpers.
//!
//! - analytics exports (CSV/JSON) (`export`)

pub mod export;

pub use export::*;
