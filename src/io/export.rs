//! Export analytics results to CSV and JSON.
//!
//! The CSV files are meant to be easy to consume in spreadsheets or
//! downstream scripts; the JSON file is the full report, failures included.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::analytics::{AnalyticsReport, BestYear, CombinedRow};
use crate::error::AppError;

pub const BEST_YEARS_FILE: &str = "best_years.csv";
pub const COMBINED_FILE: &str = "combined_report.csv";
pub const REPORT_FILE: &str = "analytics_report.json";

/// Write best-year rows to a CSV file.
pub fn write_best_years_csv(path: &Path, rows: &[BestYear]) -> Result<(), AppError> {
    write_csv(path, rows)
}

/// Write combined-report rows to a CSV file.
pub fn write_combined_csv(path: &Path, rows: &[CombinedRow]) -> Result<(), AppError> {
    write_csv(path, rows)
}

/// Write the whole analytics report as pretty JSON.
pub fn write_report_json(path: &Path, report: &AnalyticsReport) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create report JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, report)
        .map_err(|e| AppError::new(2, format!("Failed to write report JSON: {e}")))?;
    Ok(())
}

/// Write every available export into `dir`, creating it if needed.
///
/// CSVs are only written for statistics that were computed.
pub fn export_analytics(dir: &Path, report: &AnalyticsReport) -> Result<Vec<PathBuf>, AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::new(2, format!("Failed to create export dir '{}': {e}", dir.display())))?;

    let mut written = Vec::new();
    if let Some(rows) = report.best_years.computed() {
        let path = dir.join(BEST_YEARS_FILE);
        write_best_years_csv(&path, rows)?;
        written.push(path);
    }
    if let Some(rows) = report.combined_report.computed() {
        let path = dir.join(COMBINED_FILE);
        write_combined_csv(&path, rows)?;
        written.push(path);
    }
    let path = dir.join(REPORT_FILE);
    write_report_json(&path, report)?;
    written.push(path);

    info!(dir = %dir.display(), files = written.len(), "analytics exported");
    Ok(written)
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV '{}': {e}", path.display())))?;
    Ok(())
}
