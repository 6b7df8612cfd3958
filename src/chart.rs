//! Renderer-agnostic chart payloads
//!
//! A chart request has exactly two outcomes: a fully built series, or
//! `InsufficientData` when fewer than two points survive filtering. The
//! renderer decides how to show either; nothing partial is ever returned.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::duration::{format_hhmm, format_hhmm_rounded};
use crate::models::TimeSeries;

/// Message shown in place of a chart that has too few points
pub const INSUFFICIENT_DATA_MESSAGE: &str = "Not enough data. Try a different date range.";

/// Result of a chart request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "chart", rename_all = "snake_case")]
pub enum ChartOutcome<T = ChartSeries> {
    Rendered(T),
    InsufficientData,
}

impl<T> ChartOutcome<T> {
    pub fn is_rendered(&self) -> bool {
        matches!(self, ChartOutcome::Rendered(_))
    }

    pub fn rendered(&self) -> Option<&T> {
        match self {
            ChartOutcome::Rendered(chart) => Some(chart),
            ChartOutcome::InsufficientData => None,
        }
    }

    /// User-facing text for the no-data state
    pub fn message(&self) -> Option<&'static str> {
        match self {
            ChartOutcome::Rendered(_) => None,
            ChartOutcome::InsufficientData => Some(INSUFFICIENT_DATA_MESSAGE),
        }
    }
}

/// How each point's hover label is formatted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointFormat {
    /// Seconds as "HHhMM", truncated to the minute
    Duration,
    /// Fixed decimals with an optional unit suffix
    Decimal {
        places: usize,
        suffix: Option<String>,
    },
}

impl PointFormat {
    pub fn label(&self, value: f64) -> String {
        match self {
            PointFormat::Duration => format_hhmm(value),
            PointFormat::Decimal { places, suffix } => match suffix {
                Some(unit) => format!("{:.*} {}", places, value, unit),
                None => format!("{:.*}", places, value),
            },
        }
    }
}

/// Rendering hints for one metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderHints {
    /// Axis ticks are reformatted as durations
    pub duration_axis: bool,
    pub point_format: PointFormat,
}

impl RenderHints {
    pub fn duration() -> Self {
        Self {
            duration_axis: true,
            point_format: PointFormat::Duration,
        }
    }

    pub fn decimal(places: usize, suffix: Option<&str>) -> Self {
        Self {
            duration_axis: false,
            point_format: PointFormat::Decimal {
                places,
                suffix: suffix.map(str::to_string),
            },
        }
    }
}

/// Ordinary least squares fit of value against date ordinal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    /// Change in value per day
    pub slope: f64,
    /// Value at ordinal 0
    pub intercept: f64,
    /// Fitted value at each x, in series order
    pub points: Vec<f64>,
}

impl TrendLine {
    /// Fit y = slope·x + intercept. `None` for fewer than two points or
    /// when all x are equal.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<TrendLine> {
        if xs.len() != ys.len() || xs.len() < 2 {
            return None;
        }

        let mean_x = xs.iter().mean();
        let mean_y = ys.iter().mean();

        let (sxy, sxx) = xs
            .iter()
            .zip(ys)
            .fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
                let dx = x - mean_x;
                (sxy + dx * (y - mean_y), sxx + dx * dx)
            });

        if sxx == 0.0 || !sxx.is_finite() {
            return None;
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;
        // evaluated around the means to keep large date ordinals from eating precision
        let points = xs.iter().map(|x| mean_y + slope * (x - mean_x)).collect();

        Some(TrendLine {
            slope,
            intercept,
            points,
        })
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// One labelled axis tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub value: f64,
    pub label: String,
}

/// Duration-axis tick layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSettings {
    pub max_ticks: usize,
    pub rounding_minutes: u32,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            max_ticks: 7,
            rounding_minutes: 10,
        }
    }
}

/// Evenly spaced duration ticks from `min` (inclusive) towards `max`
/// (exclusive). The step is `round((max - min) / max_ticks)` seconds; a zero
/// step yields a single tick at `mean`.
pub fn duration_ticks(min: f64, max: f64, mean: f64, settings: &TickSettings) -> Vec<Tick> {
    let tick = |value: f64| Tick {
        value,
        label: format_hhmm_rounded(value, settings.rounding_minutes),
    };

    let max_ticks = settings.max_ticks.max(1);
    let step = ((max - min) / max_ticks as f64).round_ties_even();
    if step.is_nan() || step <= 0.0 {
        return vec![tick(mean)];
    }

    (0..max_ticks)
        .map(|k| min + k as f64 * step)
        .take_while(|v| *v < max)
        .map(tick)
        .collect()
}

/// Plotted metric with trend, mean reference and labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub field: String,
    pub x: Vec<NaiveDate>,
    pub y: Vec<f64>,
    pub trend: TrendLine,
    pub mean: f64,
    /// Present for duration-valued axes only
    pub ticks: Option<Vec<Tick>>,
    pub point_labels: Vec<String>,
}

/// One line of a comparison chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySeries {
    pub name: String,
    pub field: String,
    pub y: Vec<f64>,
    pub mean: f64,
    pub point_labels: Vec<String>,
}

/// Several duration metrics on a shared date axis, without trend lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonChart {
    pub x: Vec<NaiveDate>,
    pub series: Vec<OverlaySeries>,
    pub ticks: Vec<Tick>,
}

/// Builds chart payloads from filtered series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartSeriesBuilder {
    min_points: usize,
    ticks: TickSettings,
}

impl Default for ChartSeriesBuilder {
    fn default() -> Self {
        Self::new(2, TickSettings::default())
    }
}

impl ChartSeriesBuilder {
    /// `min_points` below 2 is raised to 2, a trend needs two points
    pub fn new(min_points: usize, ticks: TickSettings) -> Self {
        Self {
            min_points: min_points.max(2),
            ticks,
        }
    }

    pub fn build(&self, series: &TimeSeries, field: &str, hints: &RenderHints) -> ChartOutcome {
        let points = series.points(field);
        if points.len() < self.min_points {
            debug!(field, points = points.len(), "Not enough points to chart");
            return ChartOutcome::InsufficientData;
        }

        let (x, y): (Vec<NaiveDate>, Vec<f64>) = points.into_iter().unzip();
        let ordinals: Vec<f64> = x.iter().map(|d| f64::from(d.num_days_from_ce())).collect();

        let trend = match TrendLine::fit(&ordinals, &y) {
            Some(trend) => trend,
            None => return ChartOutcome::InsufficientData,
        };

        let mean = y.iter().mean();
        let ticks = hints.duration_axis.then(|| {
            let (min, max) = min_max(&y);
            duration_ticks(min, max, mean, &self.ticks)
        });
        let point_labels = y.iter().map(|v| hints.point_format.label(*v)).collect();

        ChartOutcome::Rendered(ChartSeries {
            field: field.to_string(),
            x,
            y,
            trend,
            mean,
            ticks,
            point_labels,
        })
    }

    /// Overlay of duration metrics, given as `(display name, field)` pairs.
    /// Only days carrying every field are plotted.
    pub fn build_comparison(
        &self,
        series: &TimeSeries,
        metrics: &[(&str, &str)],
    ) -> ChartOutcome<ComparisonChart> {
        let days = series.filtered(|r| metrics.iter().all(|(_, f)| r.value(f).is_some()));
        if metrics.is_empty() || days.len() < self.min_points {
            return ChartOutcome::InsufficientData;
        }

        let overlays: Vec<OverlaySeries> = metrics
            .iter()
            .map(|(name, field)| {
                let y = days.values(field);
                OverlaySeries {
                    name: name.to_string(),
                    field: field.to_string(),
                    mean: y.iter().mean(),
                    point_labels: y.iter().map(|v| format_hhmm(*v)).collect(),
                    y,
                }
            })
            .collect();

        let all: Vec<f64> = overlays.iter().flat_map(|o| o.y.iter().copied()).collect();
        let (min, max) = min_max(&all);
        let ticks = duration_ticks(min, max, all.iter().mean(), &self.ticks);

        ChartOutcome::Rendered(ComparisonChart {
            x: days.dates(),
            series: overlays,
            ticks,
        })
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyRecord;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    fn series(field: &str, points: &[(u32, f64)]) -> TimeSeries {
        TimeSeries::try_from_records(
            points
                .iter()
                .map(|(d, v)| DailyRecord::new(day(*d)).with_value(field, *v))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_ols_reproduces_known_line() {
        let trend = TrendLine::fit(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert_eq!(trend.slope, 2.0);
        assert_eq!(trend.intercept, 0.0);
        assert_eq!(trend.points, vec![2.0, 4.0, 6.0]);
        assert_eq!(trend.evaluate(10.0), 20.0);
    }

    #[test]
    fn test_ols_rejects_degenerate_input() {
        assert!(TrendLine::fit(&[1.0], &[1.0]).is_none());
        assert!(TrendLine::fit(&[3.0, 3.0], &[1.0, 2.0]).is_none());
        assert!(TrendLine::fit(&[1.0, 2.0], &[1.0]).is_none());
    }

    #[test]
    fn test_fewer_than_two_points_is_insufficient() {
        let builder = ChartSeriesBuilder::default();
        let hints = RenderHints::decimal(0, Some("ms"));

        let outcome = builder.build(&TimeSeries::empty(), "hrv", &hints);
        assert_eq!(outcome, ChartOutcome::InsufficientData);
        assert_eq!(outcome.message(), Some(INSUFFICIENT_DATA_MESSAGE));

        let one = series("hrv", &[(1, 40.0)]);
        assert!(!builder.build(&one, "hrv", &hints).is_rendered());
    }

    #[test]
    fn test_two_points_trend_passes_through_both() {
        let s = series("hrv", &[(1, 40.0), (8, 54.0)]);
        let hints = RenderHints::decimal(0, Some("ms"));
        let outcome = ChartSeriesBuilder::default().build(&s, "hrv", &hints);
        let chart = outcome.rendered().unwrap();

        assert!((chart.trend.slope - 2.0).abs() < 1e-12);
        assert!((chart.trend.points[0] - 40.0).abs() < 1e-9);
        assert!((chart.trend.points[1] - 54.0).abs() < 1e-9);
        assert_eq!(chart.mean, 47.0);
        assert_eq!(chart.ticks, None);
        assert_eq!(chart.point_labels, vec!["40 ms", "54 ms"]);
    }

    #[test]
    fn test_duration_chart_has_ticks_and_truncated_labels() {
        let s = series(
            "total",
            &[(1, 21_600.0), (2, 25_200.0), (3, 28_800.0), (4, 5_430.0)],
        );
        let chart = ChartSeriesBuilder::default()
            .build(&s, "total", &RenderHints::duration())
            .rendered()
            .cloned()
            .unwrap();

        assert_eq!(chart.point_labels, vec!["06h00", "07h00", "08h00", "01h30"]);

        // step = round((28800 - 5430) / 7) = 3339
        let ticks = chart.ticks.unwrap();
        assert_eq!(ticks.len(), 7);
        assert_eq!(ticks[0].value, 5430.0);
        assert_eq!(ticks[0].label, "01h30");
        assert_eq!(ticks[1].value, 5430.0 + 3339.0);
        assert!(ticks.iter().all(|t| t.value < 28_800.0));
    }

    #[test]
    fn test_tick_rounding_and_labels() {
        let ticks = duration_ticks(5430.0, 5430.0 + 7.0 * 600.0, 6000.0, &TickSettings::default());
        let labels: Vec<&str> = ticks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["01h30", "01h40", "01h50", "02h00", "02h10", "02h20", "02h30"]
        );
    }

    #[test]
    fn test_zero_step_yields_single_tick_at_mean() {
        let ticks = duration_ticks(3600.0, 3603.0, 3601.5, &TickSettings::default());
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].value, 3601.5);
        assert_eq!(ticks[0].label, "01h00");

        let s = series("total", &[(1, 3600.0), (2, 3600.0)]);
        let chart = ChartSeriesBuilder::default().build(&s, "total", &RenderHints::duration());
        assert_eq!(chart.rendered().unwrap().ticks.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_comparison_chart_shares_axis() {
        let s = TimeSeries::try_from_records(vec![
            DailyRecord::new(day(1))
                .with_value("deep", 3600.0)
                .with_value("rem", 5400.0),
            DailyRecord::new(day(2)).with_value("deep", 4200.0),
            DailyRecord::new(day(3))
                .with_value("deep", 4800.0)
                .with_value("rem", 6600.0),
        ])
        .unwrap();

        let outcome = ChartSeriesBuilder::default()
            .build_comparison(&s, &[("Deep sleep", "deep"), ("REM sleep", "rem")]);
        let chart = outcome.rendered().unwrap();

        assert_eq!(chart.x, vec![day(1), day(3)]);
        assert_eq!(chart.series[0].mean, 4200.0);
        assert_eq!(chart.series[1].mean, 6000.0);
        assert_eq!(chart.series[1].point_labels, vec!["01h30", "01h50"]);
        assert_eq!(chart.ticks[0].value, 3600.0);

        let sparse = series("deep", &[(1, 3600.0), (2, 4000.0)]);
        assert!(!ChartSeriesBuilder::default()
            .build_comparison(&sparse, &[("Deep sleep", "deep"), ("REM sleep", "rem")])
            .is_rendered());
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome: ChartOutcome = ChartOutcome::InsufficientData;
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "insufficient_data");
    }
}
