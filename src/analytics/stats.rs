//! The three downstream statistics, as pure functions over loaded rows.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::{PopulationObservation, SeriesObservation};
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationStats {
    pub from_year: i32,
    pub to_year: i32,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (N-1). Absent for a single row.
    pub std_dev: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestYear {
    pub series_id: String,
    pub year: i32,
    /// Sum of the series' values over all periods of `year`.
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRow {
    pub year: i32,
    pub value: f64,
    pub population: u64,
}

/// Mean and sample standard deviation of population over `[from_year, to_year]`.
pub fn population_stats(
    rows: &[PopulationObservation],
    from_year: i32,
    to_year: i32,
) -> Result<PopulationStats, PipelineError> {
    let values: Vec<f64> = rows
        .iter()
        .filter(|r| (from_year..=to_year).contains(&r.year))
        .map(|r| r.population as f64)
        .collect();
    if values.is_empty() {
        return Err(PipelineError::insufficient(format!(
            "No population rows between {from_year} and {to_year}."
        )));
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std_dev = (values.len() > 1).then(|| {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    });

    Ok(PopulationStats {
        from_year,
        to_year,
        count: values.len(),
        mean,
        std_dev,
    })
}

/// Year with the largest per-year sum, one row per series, ordered by series id.
///
/// Ties go to the earlier year. One unparsable value fails the whole statistic.
pub fn best_years(rows: &[SeriesObservation]) -> Result<Vec<BestYear>, PipelineError> {
    let mut sums: BTreeMap<&str, BTreeMap<i32, f64>> = BTreeMap::new();
    for row in rows {
        let value = row.parsed_value()?;
        *sums
            .entry(row.series_id.as_str())
            .or_default()
            .entry(row.year)
            .or_insert(0.0) += value;
    }

    let mut out = Vec::with_capacity(sums.len());
    for (series_id, by_year) in sums {
        let mut best: Option<(i32, f64)> = None;
        // Ascending years; only a strictly larger sum replaces the current best.
        for (year, sum) in by_year {
            if best.is_none_or(|(_, b)| sum > b) {
                best = Some((year, sum));
            }
        }
        if let Some((year, value)) = best {
            out.push(BestYear {
                series_id: series_id.to_string(),
                year,
                value,
            });
        }
    }
    Ok(out)
}

/// Join one `(series_id, period)` with population by year, ascending.
///
/// Years with no population row are left out.
pub fn combined_report(
    series_rows: &[SeriesObservation],
    population_rows: &[PopulationObservation],
    series_id: &str,
    period: &str,
) -> Result<Vec<CombinedRow>, PipelineError> {
    let selected: Vec<&SeriesObservation> = series_rows
        .iter()
        .filter(|r| r.series_id == series_id && r.period == period)
        .collect();
    if selected.is_empty() {
        return Err(PipelineError::insufficient(format!(
            "No {series_id} observations for period {period}."
        )));
    }

    let population: HashMap<i32, u64> = population_rows.iter().map(|p| (p.year, p.population)).collect();

    let mut out = Vec::new();
    for row in selected {
        let value = row.parsed_value()?;
        if let Some(&population) = population.get(&row.year) {
            out.push(CombinedRow {
                year: row.year,
                value,
                population,
            });
        }
    }
    out.sort_by_key(|r| r.year);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn obs(series_id: &str, year: i32, period: &str, value: &str) -> SeriesObservation {
        SeriesObservation {
            series_id: series_id.to_string(),
            year,
            period: period.to_string(),
            period_name: None,
            value: value.to_string(),
        }
    }

    fn pop(year: i32, population: u64) -> PopulationObservation {
        PopulationObservation { year, population }
    }

    fn six_years() -> Vec<PopulationObservation> {
        [316, 318, 320, 322, 325, 327]
            .iter()
            .zip(2013..)
            .map(|(m, year)| pop(year, m * 1_000_000))
            .collect()
    }

    #[test]
    fn population_stats_match_closed_form() {
        let stats = population_stats(&six_years(), 2013, 2018).unwrap();
        assert_eq!(stats.count, 6);
        let mean_m = stats.mean / 1e6;
        assert!((mean_m - 321.333_333_333).abs() < 1e-6, "mean={mean_m}");
        // sum of squared deviations = 87.333..., / 5 = 17.4666...
        let expected = (87.333_333_333_333_f64 / 5.0).sqrt();
        let std_m = stats.std_dev.unwrap() / 1e6;
        assert!((std_m - expected).abs() < 1e-6, "std={std_m}");
        assert!((std_m - 4.1793).abs() < 1e-4);
    }

    #[test]
    fn population_stats_respects_inclusive_range() {
        let mut rows = six_years();
        rows.push(pop(2012, 1));
        rows.push(pop(2019, 1));
        let stats = population_stats(&rows, 2013, 2018).unwrap();
        assert_eq!(stats.count, 6);

        let one = population_stats(&rows, 2015, 2015).unwrap();
        assert_eq!(one.count, 1);
        assert_eq!(one.mean, 320_000_000.0);
        assert_eq!(one.std_dev, None);
    }

    #[test]
    fn population_stats_without_rows_is_insufficient() {
        let err = population_stats(&six_years(), 1990, 1999).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientData);
        assert_eq!(population_stats(&[], 2013, 2018).unwrap_err().kind, ErrorKind::InsufficientData);
    }

    #[test]
    fn best_year_sums_periods_and_orders_by_series() {
        let rows = vec![
            obs("B", 2019, "Q01", "1"),
            obs("B", 2019, "Q02", "4"),
            obs("B", 2020, "Q01", "4.5"),
            obs("A", 2018, "M01", "10"),
            obs("A", 2019, "M01", "3"),
        ];
        let best = best_years(&rows).unwrap();
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].series_id, "A");
        assert_eq!((best[0].year, best[0].value), (2018, 10.0));
        assert_eq!(best[1].series_id, "B");
        assert_eq!((best[1].year, best[1].value), (2019, 5.0));
    }

    #[test]
    fn best_year_tie_goes_to_earlier_year() {
        let rows = vec![
            obs("A", 2020, "Q01", "2"),
            obs("A", 2018, "Q01", "1"),
            obs("A", 2018, "Q02", "1"),
            obs("A", 2019, "Q01", "0.5"),
        ];
        let best = best_years(&rows).unwrap();
        assert_eq!(best[0].year, 2018);
        assert_eq!(best[0].value, 2.0);
    }

    #[test]
    fn best_year_rejects_unparsable_value() {
        let rows = vec![obs("A", 2018, "Q01", "1"), obs("A", 2019, "Q01", "-")];
        let err = best_years(&rows).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedValue);
    }

    #[test]
    fn combined_report_joins_by_year() {
        let series = vec![
            obs("PRS30006032", 2018, "Q01", "1.9"),
            obs("PRS30006032", 2017, "Q01", "1.5"),
            obs("PRS30006032", 2017, "Q02", "0.7"),
            obs("OTHER", 2017, "Q01", "9"),
        ];
        let population = vec![pop(2017, 325_000_000), pop(2018, 327_167_439)];
        let rows = combined_report(&series, &population, "PRS30006032", "Q01").unwrap();
        assert_eq!(
            rows,
            vec![
                CombinedRow { year: 2017, value: 1.5, population: 325_000_000 },
                CombinedRow { year: 2018, value: 1.9, population: 327_167_439 },
            ]
        );
    }

    #[test]
    fn combined_report_excludes_years_without_population() {
        let series = vec![obs("S", 2016, "Q01", "1"), obs("S", 2017, "Q01", "2")];
        let population = vec![pop(2017, 10)];
        let rows = combined_report(&series, &population, "S", "Q01").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].year, 2017);
    }

    #[test]
    fn combined_report_without_series_rows_is_insufficient() {
        let series = vec![obs("S", 2017, "Q02", "1")];
        let err = combined_report(&series, &[pop(2017, 1)], "S", "Q01").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientData);
    }
}
