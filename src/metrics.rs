//! Scalar rollups for dashboard summary cards
//!
//! Values are computed in `f64` and handed out as `Decimal` rounded half to
//! even at the requested precision.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::duration::format_hhmm;
use crate::error::SeriesError;
use crate::models::TimeSeries;

/// Rollup applied to a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    Mean,
    Sum,
    Count,
    /// Value of the most recent record carrying the field
    Latest,
}

/// Decimal places kept in a summary value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    /// Rates and durations
    Integer,
    /// Ratios
    TwoDecimals,
    Places(u32),
}

impl Precision {
    pub fn decimal_places(&self) -> u32 {
        match self {
            Precision::Integer => 0,
            Precision::TwoDecimals => 2,
            Precision::Places(dp) => *dp,
        }
    }
}

/// Human-readable rendering of a summary value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayUnit {
    Milliseconds,
    BeatsPerMinute,
    /// Seconds rendered as "HHhMM"
    Duration,
    Kilometers,
    Percent,
    Plain,
}

/// What to compute for one summary card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    pub field: String,
    pub aggregate: Aggregate,
    pub precision: Precision,
    pub unit: DisplayUnit,
}

impl MetricSpec {
    pub fn new(
        name: impl Into<String>,
        field: impl Into<String>,
        aggregate: Aggregate,
        precision: Precision,
        unit: DisplayUnit,
    ) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            aggregate,
            precision,
            unit,
        }
    }
}

/// Named scalar derived from a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub name: String,
    pub aggregate: Aggregate,
    pub value: Decimal,
    /// Number of records that contributed
    pub count: usize,
    pub unit: DisplayUnit,
}

impl MetricSummary {
    /// Value rendered in its display unit
    pub fn display(&self) -> String {
        match self.unit {
            DisplayUnit::Milliseconds => format!("{} ms", self.value),
            DisplayUnit::BeatsPerMinute => format!("{} bpm", self.value),
            DisplayUnit::Duration => format_hhmm(self.value.to_f64().unwrap_or(f64::NAN)),
            DisplayUnit::Kilometers => format!("{} km", group_thousands(self.value)),
            DisplayUnit::Percent => format!("{}%", self.value),
            DisplayUnit::Plain => self.value.to_string(),
        }
    }

    /// Copy of this summary with `offset` added, re-rounded to `precision`
    pub fn offset_by(&self, offset: Decimal, precision: Precision) -> MetricSummary {
        MetricSummary {
            value: (self.value + offset).round_dp(precision.decimal_places()),
            ..self.clone()
        }
    }

    /// This value as a percentage of `whole`
    pub fn percent_of(
        &self,
        name: impl Into<String>,
        whole: Decimal,
        precision: Precision,
    ) -> Result<MetricSummary, SeriesError> {
        if whole.is_zero() {
            return Err(SeriesError::NonFinite {
                field: self.name.clone(),
            });
        }
        Ok(MetricSummary {
            name: name.into(),
            aggregate: self.aggregate,
            value: (self.value / whole * Decimal::ONE_HUNDRED).round_dp(precision.decimal_places()),
            count: self.count,
            unit: DisplayUnit::Percent,
        })
    }
}

/// Space-separated thousands, e.g. "12 345"
fn group_thousands(value: Decimal) -> String {
    let text = value.to_string();
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::new();
    for (i, ch) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    match fraction {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

/// Computes rollups over a series field
pub struct MetricAggregator;

impl MetricAggregator {
    pub fn mean(series: &TimeSeries, field: &str) -> Result<f64, SeriesError> {
        let values = Self::non_empty(series, field)?;
        Ok(values.iter().mean())
    }

    pub fn sum(series: &TimeSeries, field: &str) -> Result<f64, SeriesError> {
        let values = Self::non_empty(series, field)?;
        Ok(values.iter().sum())
    }

    pub fn count(series: &TimeSeries, field: &str) -> Result<usize, SeriesError> {
        Ok(Self::non_empty(series, field)?.len())
    }

    pub fn latest(series: &TimeSeries, field: &str) -> Result<f64, SeriesError> {
        series
            .iter()
            .rev()
            .find_map(|r| r.value(field))
            .ok_or_else(|| SeriesError::EmptySeries {
                field: field.to_string(),
            })
    }

    /// Compute one summary card
    pub fn summarize(series: &TimeSeries, spec: &MetricSpec) -> Result<MetricSummary, SeriesError> {
        let count = Self::count(series, &spec.field)?;
        let raw = match spec.aggregate {
            Aggregate::Mean => Self::mean(series, &spec.field)?,
            Aggregate::Sum => Self::sum(series, &spec.field)?,
            Aggregate::Count => count as f64,
            Aggregate::Latest => Self::latest(series, &spec.field)?,
        };

        let value = Decimal::from_f64(raw)
            .ok_or_else(|| SeriesError::NonFinite {
                field: spec.field.clone(),
            })?
            .round_dp(spec.precision.decimal_places());

        Ok(MetricSummary {
            name: spec.name.clone(),
            aggregate: spec.aggregate,
            value,
            count,
            unit: spec.unit,
        })
    }

    fn non_empty(series: &TimeSeries, field: &str) -> Result<Vec<f64>, SeriesError> {
        let values = series.values(field);
        if values.is_empty() {
            return Err(SeriesError::EmptySeries {
                field: field.to_string(),
            });
        }
        Ok(values)
    }
}
