//! Z-score outlier rejection
//!
//! Applied to derived performance ratios only. Raw physiological readings
//! (HRV, heart rate, sleep) are never filtered: an extreme night is a real
//! observation, not noise.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::models::TimeSeries;

/// Keeps points whose absolute z-score is strictly below `threshold`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierFilter {
    pub threshold: f64,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self { threshold: 3.0 }
    }
}

impl OutlierFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Z-scores against the mean and population standard deviation.
    ///
    /// With zero deviation every score is 0.
    pub fn z_scores(values: &[f64]) -> Vec<f64> {
        if values.is_empty() {
            return Vec::new();
        }
        let mean = values.iter().mean();
        let std_dev = values.iter().population_std_dev();

        if !std_dev.is_finite() || std_dev == 0.0 {
            return vec![0.0; values.len()];
        }
        values.iter().map(|v| (v - mean) / std_dev).collect()
    }

    /// Retention mask aligned with `values`
    pub fn mask(&self, values: &[f64]) -> Vec<bool> {
        Self::z_scores(values)
            .into_iter()
            .map(|z| z.abs() < self.threshold)
            .collect()
    }

    /// New series with outlying `field` values removed.
    ///
    /// Records without `field` carry no value for this metric and are dropped.
    pub fn filter(&self, series: &TimeSeries, field: &str) -> TimeSeries {
        let candidates = series.filtered(|r| r.value(field).is_some());
        let keep = self.mask(&candidates.values(field));

        let mut flags = keep.into_iter();
        let retained = candidates.filtered(|_| flags.next().unwrap_or(false));

        if retained.len() < candidates.len() {
            debug!(
                field,
                removed = candidates.len() - retained.len(),
                threshold = self.threshold,
                "Removed outliers"
            );
        }

        retained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyRecord;
    use chrono::NaiveDate;

    fn series(values: &[Option<f64>]) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        TimeSeries::try_from_records(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let record = DailyRecord::new(start + chrono::Days::new(i as u64));
                    match v {
                        Some(v) => record.with_value("performance", *v),
                        None => record,
                    }
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_identical_values_are_all_retained() {
        let input = series(&[Some(0.07); 12]);
        let output = OutlierFilter::default().filter(&input, "performance");
        assert_eq!(output, input);
    }

    #[test]
    fn test_single_spike_is_removed() {
        let mut values = vec![Some(1.0); 19];
        values.push(Some(10.0));
        let input = series(&values);

        let output = OutlierFilter::default().filter(&input, "performance");
        assert_eq!(output.len(), 19);
        assert!(output.values("performance").iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_threshold_is_strict() {
        // two-point series: both z-scores are exactly 1
        let scores = OutlierFilter::z_scores(&[2.0, 4.0]);
        assert_eq!(scores, vec![-1.0, 1.0]);
        assert_eq!(OutlierFilter::new(1.0).mask(&[2.0, 4.0]), vec![false, false]);
        assert_eq!(OutlierFilter::new(1.01).mask(&[2.0, 4.0]), vec![true, true]);
    }

    #[test]
    fn test_records_without_field_are_dropped() {
        let input = series(&[Some(1.0), None, Some(1.2)]);
        let output = OutlierFilter::default().filter(&input, "performance");
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(OutlierFilter::z_scores(&[]).is_empty());
        let output = OutlierFilter::default().filter(&TimeSeries::empty(), "performance");
        assert!(output.is_empty());
    }
}
