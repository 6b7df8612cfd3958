//! Provider source definitions
//!
//! Each provider pairs a `SourceSchema` (where the date and fields live) with
//! a `DuplicatePolicy` (how same-day records collapse):
//!
//! | source       | date                          | same-day rule                    |
//! |--------------|-------------------------------|----------------------------------|
//! | sleep        | `day`                         | sleep-type priority table        |
//! | activity log | 2nd token of `Date` range     | combine (sum distance/duration)  |
//! | fitness test | `Date`                        | first in input order             |

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dedup::{CategoryPriority, CombineRule, Deduplicator, DuplicatePolicy};
use crate::error::RecordError;
use crate::models::{fields, DailyRecord, RawObservation, TimeSeries};
use crate::normalize::{DateRule, FieldMapping, RecordNormalizer, SourceSchema};

/// Schema plus same-day policy for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub schema: SourceSchema,
    pub policy: DuplicatePolicy,
}

/// Canonical series for one source plus the observations that were rejected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingested {
    pub series: TimeSeries,
    pub rejected: Vec<RecordError>,
}

impl SourceDefinition {
    /// Overnight sleep sessions from the ring provider
    pub fn sleep() -> Self {
        Self {
            schema: SourceSchema {
                name: "sleep".to_string(),
                date_rule: DateRule::field("day"),
                category_field: Some("type".to_string()),
                fields: vec![
                    FieldMapping::optional("total_sleep_duration", fields::TOTAL_SLEEP),
                    FieldMapping::optional("deep_sleep_duration", fields::DEEP_SLEEP),
                    FieldMapping::optional("rem_sleep_duration", fields::REM_SLEEP),
                    FieldMapping::optional("average_hrv", fields::AVERAGE_HRV),
                    FieldMapping::optional("lowest_heart_rate", fields::LOWEST_HEART_RATE),
                ],
            },
            policy: DuplicatePolicy::Priority(CategoryPriority::sleep()),
        }
    }

    /// Workout log export; each row spans a "start - end" date range
    pub fn activity_log() -> Self {
        Self {
            schema: SourceSchema {
                name: "activity-log".to_string(),
                date_rule: DateRule::range_end("Date"),
                category_field: Some("Activity".to_string()),
                fields: vec![
                    FieldMapping::optional("Distance(km)", fields::DISTANCE_KM),
                    FieldMapping::optional("Duration(s)", fields::DURATION_S),
                    FieldMapping::optional("Heart rate: Average(count/min)", fields::AVG_HEART_RATE),
                ],
            },
            policy: DuplicatePolicy::Combine(CombineRule {
                additive: vec![fields::DISTANCE_KM.to_string(), fields::DURATION_S.to_string()],
                weight_field: Some(fields::DURATION_S.to_string()),
            }),
        }
    }

    /// Aerobic capacity measurements
    pub fn fitness_test() -> Self {
        Self {
            schema: SourceSchema {
                name: "fitness-test".to_string(),
                date_rule: DateRule::field("Date"),
                category_field: None,
                fields: vec![FieldMapping::required("VO2 Max(mL/min·kg)", fields::VO2MAX)
                    .or_alias("VO2 Max(mL/minÂ·kg)")
                    .or_alias("VO2 Max")],
            },
            policy: DuplicatePolicy::Priority(CategoryPriority::input_order()),
        }
    }

    /// Normalize and collapse to one record per day
    pub fn ingest(&self, observations: &[RawObservation]) -> Ingested {
        self.ingest_where(observations, |_| true)
    }

    /// Like `ingest`, keeping only normalized records that satisfy `keep`
    /// before same-day collapsing
    pub fn ingest_where<F>(&self, observations: &[RawObservation], keep: F) -> Ingested
    where
        F: Fn(&DailyRecord) -> bool,
    {
        let batch = RecordNormalizer::new(self.schema.clone()).normalize_batch(observations);
        let kept: Vec<DailyRecord> = batch.records.into_iter().filter(|r| keep(r)).collect();
        let series = Deduplicator::new(self.policy.clone()).merge(&kept);

        info!(
            source = %self.schema.name,
            observations = observations.len(),
            rejected = batch.rejected.len(),
            days = series.len(),
            "Ingested source"
        );

        Ingested {
            series,
            rejected: batch.rejected,
        }
    }
}

/// Which activity-log rows count as qualifying runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFilter {
    pub activity_type: String,
    /// Exclusive lower bound
    pub min_distance_km: f64,
}

impl RunFilter {
    pub fn accepts(&self, record: &DailyRecord) -> bool {
        record.category.as_deref() == Some(self.activity_type.as_str())
            && record
                .value(fields::DISTANCE_KM)
                .is_some_and(|km| km > self.min_distance_km)
    }
}

/// Ingest the activity log as one combined run per day with derived
/// pace and performance
pub fn ingest_runs(observations: &[RawObservation], filter: &RunFilter) -> Ingested {
    let ingested = SourceDefinition::activity_log().ingest_where(observations, |r| filter.accepts(r));
    Ingested {
        series: derive_performance(&ingested.series),
        rejected: ingested.rejected,
    }
}

/// Adds `pace_kmh` (distance·3600/duration) and `performance`
/// (pace / average heart rate). Days missing an input or with a zero
/// denominator get neither.
pub fn derive_performance(series: &TimeSeries) -> TimeSeries {
    series.map_records(|record| {
        let mut derived = record.clone();
        let distance = record.value(fields::DISTANCE_KM);
        let duration = record.value(fields::DURATION_S).filter(|d| *d > 0.0);
        let heart_rate = record.value(fields::AVG_HEART_RATE).filter(|hr| *hr > 0.0);

        if let (Some(distance), Some(duration)) = (distance, duration) {
            let pace = distance * 3600.0 / duration;
            derived.values.insert(fields::PACE_KMH.to_string(), pace);
            if let Some(hr) = heart_rate {
                derived.values.insert(fields::PERFORMANCE.to_string(), pace / hr);
            }
        }
        derived
    })
}
