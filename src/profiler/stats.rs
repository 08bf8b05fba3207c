//! Series statistics
//!
//! Plain descriptive stats over a numeric series. Pure functions, no state.

use serde::Serialize;

/// Descriptive statistics for one metric series
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeriesStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

/// Compute min/max/mean/median/std-dev for a series.
///
/// Empty input yields all-zero stats. The median is the element at the floor
/// midpoint of the sorted series (upper-middle for even lengths); report
/// consumers depend on that convention, so it is not interpolated.
pub fn compute_stats(series: &[f64]) -> SeriesStats {
    if series.is_empty() {
        return SeriesStats::default();
    }

    let mut sorted = series.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let variance = sorted
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;

    SeriesStats {
        min: sorted[0],
        max: sorted[n - 1],
        mean,
        median: sorted[n / 2],
        std_dev: variance.sqrt(),
    }
}
