//! Deterministic demand-series math.
//!
//! All functions are pure and operate on a zero-filled daily series so that
//! days without shipments count as zero demand instead of being skipped.

use chrono::NaiveDate;

/// Build a contiguous daily series from sparse (date, quantity) shipment
/// totals. Days between the first and last observation with no shipments are
/// filled with zero. Input order does not matter; duplicate dates are summed.
pub fn daily_series(observations: &[(NaiveDate, i64)]) -> Vec<f64> {
    let Some(first) = observations.iter().map(|(d, _)| *d).min() else {
        return Vec::new();
    };
    let last = observations
        .iter()
        .map(|(d, _)| *d)
        .max()
        .unwrap_or(first);

    let len = (last - first).num_days() as usize + 1;
    let mut series = vec![0.0; len];
    for (date, quantity) in observations {
        let idx = (*date - first).num_days() as usize;
        series[idx] += *quantity as f64;
    }
    series
}

/// Trailing moving average over the last `window` points.
pub fn moving_average(series: &[f64], window: usize) -> Option<f64> {
    if window == 0 || series.len() < window {
        return None;
    }
    let tail = &series[series.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Simple exponential smoothing; returns the final level.
pub fn exponential_smoothing(series: &[f64], alpha: f64) -> Option<f64> {
    if series.is_empty() || !(0.0..=1.0).contains(&alpha) {
        return None;
    }
    let mut level = series[0];
    for value in &series[1..] {
        level = alpha * value + (1.0 - alpha) * level;
    }
    Some(level)
}

/// One-step-ahead backtest: forecast each point from its predecessors and
/// average the absolute errors. Lower is better.
pub fn backtest_mae<F>(series: &[f64], mut forecast: F) -> Option<f64>
where
    F: FnMut(&[f64]) -> Option<f64>,
{
    if series.len() < 2 {
        return None;
    }
    let mut total = 0.0;
    let mut count = 0usize;
    for i in 1..series.len() {
        if let Some(predicted) = forecast(&series[..i]) {
            total += (series[i] - predicted).abs();
            count += 1;
        }
    }
    (count > 0).then(|| total / count as f64)
}

/// Map a backtest error to a confidence in \[0, 1\], relative to the mean
/// demand level. Zero error gives 1.0; error equal to the mean gives 0.5.
pub fn confidence_from_mae(mae: f64, series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    if mean <= f64::EPSILON {
        return if mae <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    1.0 / (1.0 + mae / mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn daily_series_zero_fills_gaps_and_sums_duplicates() {
        let series = daily_series(&[(date(1), 5), (date(4), 3), (date(4), 2), (date(2), 1)]);
        assert_eq!(series, vec![5.0, 1.0, 0.0, 5.0]);
    }

    #[test]
    fn daily_series_empty_input() {
        assert!(daily_series(&[]).is_empty());
    }

    #[test]
    fn moving_average_uses_trailing_window() {
        let series = vec![10.0, 0.0, 2.0, 4.0];
        assert_eq!(moving_average(&series, 2), Some(3.0));
        assert_eq!(moving_average(&series, 4), Some(4.0));
        assert_eq!(moving_average(&series, 5), None);
    }

    #[test]
    fn exponential_smoothing_converges_to_constant_series() {
        let series = vec![7.0; 20];
        let level = exponential_smoothing(&series, 0.3).unwrap();
        assert!((level - 7.0).abs() < 1e-9);
    }

    #[test]
    fn backtest_mae_is_zero_for_perfectly_predictable_series() {
        let series = vec![5.0; 10];
        let mae = backtest_mae(&series, |hist| exponential_smoothing(hist, 0.5)).unwrap();
        assert!(mae.abs() < 1e-9);
    }

    #[test]
    fn confidence_decreases_with_error() {
        let series = vec![10.0; 10];
        let high = confidence_from_mae(0.0, &series);
        let mid = confidence_from_mae(10.0, &series);
        let low = confidence_from_mae(100.0, &series);
        assert_eq!(high, 1.0);
        assert!((mid - 0.5).abs() < 1e-9);
        assert!(low < mid);
    }
}
