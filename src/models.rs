use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SeriesError;

/// Canonical field names shared by the source schemas, dashboard and CLI
pub mod fields {
    /// Total sleep in seconds
    pub const TOTAL_SLEEP: &str = "total_sleep_duration";
    /// Deep sleep in seconds
    pub const DEEP_SLEEP: &str = "deep_sleep_duration";
    /// REM sleep in seconds
    pub const REM_SLEEP: &str = "rem_sleep_duration";
    /// Nightly average HRV in milliseconds
    pub const AVERAGE_HRV: &str = "average_hrv";
    /// Lowest overnight heart rate in bpm
    pub const LOWEST_HEART_RATE: &str = "lowest_heart_rate";

    /// Run distance in kilometers
    pub const DISTANCE_KM: &str = "distance_km";
    /// Run duration in seconds
    pub const DURATION_S: &str = "duration_s";
    /// Average heart rate during the run in bpm
    pub const AVG_HEART_RATE: &str = "avg_heart_rate";
    /// Derived speed in km/h
    pub const PACE_KMH: &str = "pace_kmh";
    /// Derived speed per heartbeat (km/h per bpm)
    pub const PERFORMANCE: &str = "performance";

    /// Aerobic capacity in mL/min·kg
    pub const VO2MAX: &str = "vo2max";
}

/// Loosely-typed value as delivered by a provider export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl FieldValue {
    /// True for null values and blank strings
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Textual form of the value, `None` when blank
    pub fn to_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Numeric form of the value.
    ///
    /// Blank values yield `Ok(None)`; text that does not parse as a finite
    /// number yields `Err` with the offending text.
    pub fn to_number(&self) -> Result<Option<f64>, String> {
        match self {
            FieldValue::Number(n) if n.is_finite() => Ok(Some(*n)),
            FieldValue::Number(n) => Err(n.to_string()),
            FieldValue::Null => Ok(None),
            FieldValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                match trimmed.parse::<f64>() {
                    Ok(n) if n.is_finite() => Ok(Some(n)),
                    _ => Err(trimmed.to_string()),
                }
            }
            FieldValue::Bool(b) => Err(b.to_string()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// One raw provider record: field name to loosely-typed value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub fields: BTreeMap<String, FieldValue>,
}

impl RawObservation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

impl FromIterator<(String, FieldValue)> for RawObservation {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Canonical per-day record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    /// Calendar day, no time component
    pub date: NaiveDate,

    /// Categorical value used for same-day priority (e.g. sleep type)
    pub category: Option<String>,

    /// Named numeric fields
    pub values: BTreeMap<String, f64>,
}

impl DailyRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            category: None,
            values: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_value(mut self, field: impl Into<String>, value: f64) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    pub fn value(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }
}

/// Ascending, duplicate-free sequence of daily records.
///
/// Every transformation returns a new series; an existing series is never
/// modified, so a snapshot can be shared between concurrent readers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    records: Vec<DailyRecord>,
}

impl TimeSeries {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a series from records in any order, rejecting repeated dates
    pub fn try_from_records(mut records: Vec<DailyRecord>) -> Result<Self, SeriesError> {
        records.sort_by_key(|r| r.date);
        if let Some(pair) = records.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(SeriesError::DuplicateDate { date: pair[0].date });
        }
        Ok(Self { records })
    }

    /// Caller guarantees ascending, unique dates
    pub(crate) fn from_sorted_unchecked(records: Vec<DailyRecord>) -> Self {
        debug_assert!(records.windows(2).all(|w| w[0].date < w[1].date));
        Self { records }
    }

    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DailyRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|r| r.date).collect()
    }

    /// (date, value) pairs for records that carry `field`
    pub fn points(&self, field: &str) -> Vec<(NaiveDate, f64)> {
        self.records
            .iter()
            .filter_map(|r| r.value(field).map(|v| (r.date, v)))
            .collect()
    }

    /// Values of `field`, skipping records that lack it
    pub fn values(&self, field: &str) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.value(field)).collect()
    }

    /// New series containing the records that satisfy `keep`, order preserved
    pub fn filtered<F>(&self, mut keep: F) -> TimeSeries
    where
        F: FnMut(&DailyRecord) -> bool,
    {
        Self::from_sorted_unchecked(self.records.iter().filter(|r| keep(r)).cloned().collect())
    }

    /// New series with each record transformed; dates must be left untouched
    pub fn map_records<F>(&self, f: F) -> TimeSeries
    where
        F: FnMut(&DailyRecord) -> DailyRecord,
    {
        Self::from_sorted_unchecked(self.records.iter().map(f).collect())
    }
}

impl<'a> IntoIterator for &'a TimeSeries {
    type Item = &'a DailyRecord;
    type IntoIter = std::slice::Iter<'a, DailyRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
