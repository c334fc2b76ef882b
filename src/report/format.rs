//! Terminal formatting for run summaries and analytics reports.
//!
//! All printing goes through here so output changes stay in one file.

use crate::analytics::{AnalyticsReport, BestYear, CombinedRow, PopulationStats, StatOutcome};
use crate::ingest::{IngestSummary, OutcomeStatus};

/// Format one ingestion run: per-series outcome table plus totals.
pub fn format_ingest_summary(summary: &IngestSummary) -> String {
    let mut out = String::new();

    out.push_str("=== harvest - ingestion run ===\n");
    out.push_str(&format!("As-of: {}\n", summary.as_of));
    out.push_str(&format!("Years: {}..={}\n", summary.start_year, summary.end_year));
    let elapsed = summary.finished_at - summary.started_at;
    out.push_str(&format!(
        "Started: {} | took {:.1}s\n",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        elapsed.num_milliseconds() as f64 / 1000.0
    ));

    out.push_str("\nSeries:\n");
    push_row(&mut out, format!("{:<24} {:<10} {:>8} {}", "series_id", "status", "records", "detail"));
    push_row(&mut out, format!("{:-<24} {:-<10} {:-<8} {:-<6}", "", "", "", ""));
    for s in &summary.series {
        push_row(&mut out, outcome_row(&s.series_id, &s.status));
    }

    out.push_str("\nPopulation:\n");
    push_row(&mut out, outcome_row(&summary.population.dataset, &summary.population.status));

    out.push_str(&format!(
        "\nSucceeded: {} | Failed: {} | Population: {}\n",
        summary.succeeded(),
        summary.failed(),
        if summary.population.status.is_success() { "ok" } else { "failed" }
    ));
    let by_kind = summary.failures_by_kind();
    if !by_kind.is_empty() {
        let parts: Vec<String> = by_kind.iter().map(|(k, n)| format!("{k}={n}")).collect();
        out.push_str(&format!("Failures by kind: {}\n", parts.join(", ")));
    }
    if summary.notifications_failed > 0 {
        out.push_str(&format!("Notifications not delivered: {}\n", summary.notifications_failed));
    }

    out
}

/// Format the three statistics; a failed one prints its error in place.
pub fn format_analytics_report(report: &AnalyticsReport) -> String {
    let mut out = String::new();

    out.push_str("=== harvest - analytics ===\n");
    match report.as_of {
        Some(date) => out.push_str(&format!("Documents: {} (as of {date})\n", report.documents)),
        None => out.push_str(&format!("Documents: {} (latest per dataset)\n", report.documents)),
    }
    out.push_str(&format!(
        "Rows: series={} population={}\n",
        report.series_rows, report.population_rows
    ));
    for issue in &report.load_issues {
        out.push_str(&format!("  (skipped {}) {}: {}\n", issue.key, issue.kind, issue.message));
    }

    out.push_str(&format!(
        "\nPopulation {}..={}:\n",
        report.params.population_from, report.params.population_to
    ));
    section(&mut out, &report.population_stats, format_population_stats);

    out.push_str("\nBest year per series:\n");
    section(&mut out, &report.best_years, |rows| format_best_years(rows));

    out.push_str(&format!(
        "\nCombined report {} {}:\n",
        report.params.report_series, report.params.report_period
    ));
    section(&mut out, &report.combined_report, |rows| format_combined(rows));

    out
}

fn section<T>(out: &mut String, outcome: &StatOutcome<T>, render: impl FnOnce(&T) -> String) {
    match outcome {
        StatOutcome::Computed(value) => out.push_str(&render(value)),
        StatOutcome::Failed { kind, message } => out.push_str(&format!("  not computed ({kind}): {message}\n")),
    }
}

fn format_population_stats(stats: &PopulationStats) -> String {
    let std_dev = match stats.std_dev {
        Some(v) => format!("{v:.2}"),
        None => "n/a (single year)".to_string(),
    };
    format!("- years: {}\n- mean : {:.2}\n- std  : {std_dev}\n", stats.count, stats.mean)
}

fn format_best_years(rows: &[BestYear]) -> String {
    let mut out = String::new();
    push_row(&mut out, format!("{:<24} {:>6} {:>14}", "series_id", "year", "value"));
    push_row(&mut out, format!("{:-<24} {:-<6} {:-<14}", "", "", ""));
    for r in rows {
        push_row(
            &mut out,
            format!("{:<24} {:>6} {:>14}", truncate(&r.series_id, 24), r.year, fmt_value(r.value)),
        );
    }
    out
}

fn format_combined(rows: &[CombinedRow]) -> String {
    let mut out = String::new();
    push_row(&mut out, format!("{:>6} {:>12} {:>14}", "year", "value", "population"));
    push_row(&mut out, format!("{:-<6} {:-<12} {:-<14}", "", "", ""));
    for r in rows {
        push_row(&mut out, format!("{:>6} {:>12} {:>14}", r.year, fmt_value(r.value), r.population));
    }
    out
}

fn outcome_row(label: &str, status: &OutcomeStatus) -> String {
    match status {
        OutcomeStatus::Succeeded { key, records } => {
            format!("{:<24} {:<10} {:>8} {key}", truncate(label, 24), "ok", records)
        }
        OutcomeStatus::Failed { kind, message } => {
            format!("{:<24} {:<10} {:>8} {kind}: {message}", truncate(label, 24), "failed", "-")
        }
    }
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

/// Shortest form that round-trips, so `1.5` stays `1.5`.
fn fmt_value(v: f64) -> String {
    format!("{v}")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
