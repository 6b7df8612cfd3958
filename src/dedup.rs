//! Same-day deduplication
//!
//! Providers can deliver several records for one calendar day (a main sleep
//! plus a nap, two runs). Each source declares a `DuplicatePolicy` that
//! collapses them into exactly one record per day.
//!
//! The sleep priority ("long" sessions over shorter ones) mirrors the
//! provider's current category vocabulary. If the provider renames or adds
//! sleep types, unknown names fall back to lexicographic order, which may
//! not be what the data owner expects; revisit `CategoryPriority::sleep`
//! whenever the vocabulary changes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{DailyRecord, TimeSeries};

/// Named priority table over a category field.
///
/// Ranking order: categories listed in the table (in table order), then
/// unlisted categories in lexicographic order, then records without a
/// category. Equal ranks keep input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPriority {
    pub name: String,
    pub ranking: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank<'a> {
    Listed(usize),
    Unlisted(&'a str),
    Missing,
}

impl CategoryPriority {
    pub fn new<I, S>(name: impl Into<String>, ranking: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            ranking: ranking.into_iter().map(Into::into).collect(),
        }
    }

    /// Oura sleep types: the main overnight session is the most representative
    /// record of a day, naps and rest periods only stand in when it is absent.
    pub fn sleep() -> Self {
        Self::new("sleep-type", ["long_sleep", "sleep", "late_nap", "rest"])
    }

    /// No preference: first record of the day in input order wins
    pub fn input_order() -> Self {
        Self::new("input-order", Vec::<String>::new())
    }

    fn rank<'a>(&self, category: Option<&'a str>) -> Rank<'a> {
        match category {
            None => Rank::Missing,
            Some(c) => match self.ranking.iter().position(|r| r == c) {
                Some(pos) => Rank::Listed(pos),
                None => Rank::Unlisted(c),
            },
        }
    }
}

/// Combine same-day records into one instead of choosing one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombineRule {
    /// Fields summed across the day's records
    pub additive: Vec<String>,

    /// Other fields are averaged, weighted by this field when present and
    /// positive; otherwise a plain mean
    pub weight_field: Option<String>,
}

/// Per-source rule for collapsing same-day records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Keep the single highest-priority record of each day
    Priority(CategoryPriority),

    /// Merge all records of each day into one
    Combine(CombineRule),
}

/// Collapses daily records to one per date, ascending
pub struct Deduplicator {
    policy: DuplicatePolicy,
}

impl Deduplicator {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DuplicatePolicy {
        &self.policy
    }

    pub fn merge(&self, records: &[DailyRecord]) -> TimeSeries {
        let mut by_day: BTreeMap<NaiveDate, Vec<&DailyRecord>> = BTreeMap::new();
        for record in records {
            by_day.entry(record.date).or_default().push(record);
        }

        let merged: Vec<DailyRecord> = by_day
            .into_values()
            .map(|day| match &self.policy {
                DuplicatePolicy::Priority(priority) => Self::pick(priority, &day),
                DuplicatePolicy::Combine(rule) => Self::combine(rule, &day),
            })
            .collect();

        if merged.len() < records.len() {
            debug!(
                input = records.len(),
                output = merged.len(),
                "Collapsed same-day records"
            );
        }

        TimeSeries::from_sorted_unchecked(merged)
    }

    fn pick(priority: &CategoryPriority, day: &[&DailyRecord]) -> DailyRecord {
        // min_by_key returns the first of equal minima, so ties keep input order
        day.iter()
            .min_by_key(|r| priority.rank(r.category.as_deref()))
            .map(|r| (*r).clone())
            .unwrap_or_else(|| unreachable!("day groups are never empty"))
    }

    fn combine(rule: &CombineRule, day: &[&DailyRecord]) -> DailyRecord {
        if day.len() == 1 {
            return day[0].clone();
        }

        let mut merged = DailyRecord::new(day[0].date);
        merged.category = day[0].category.clone();

        let mut names: Vec<&String> = day.iter().flat_map(|r| r.values.keys()).collect();
        names.sort();
        names.dedup();

        for name in names {
            let present: Vec<&&DailyRecord> =
                day.iter().filter(|r| r.values.contains_key(name)).collect();

            let value = if rule.additive.iter().any(|a| a == name) {
                present.iter().filter_map(|r| r.value(name)).sum::<f64>()
            } else {
                let weighted: Vec<(f64, f64)> = rule
                    .weight_field
                    .as_deref()
                    .map(|w| {
                        present
                            .iter()
                            .filter_map(|r| Some((r.value(name)?, r.value(w)?)))
                            .filter(|(_, weight)| *weight > 0.0)
                            .collect()
                    })
                    .unwrap_or_default();

                let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
                if !weighted.is_empty() && weighted.len() == present.len() && total_weight > 0.0
                {
                    weighted.iter().map(|(v, w)| v * w).sum::<f64>() / total_weight
                } else {
                    let values: Vec<f64> = present.iter().filter_map(|r| r.value(name)).collect();
                    values.iter().sum::<f64>() / values.len() as f64
                }
            };

            merged.values.insert(name.clone(), value);
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 5, d).unwrap()
    }

    #[test]
    fn test_sleep_priority_prefers_long_sleep() {
        let dedup = Deduplicator::new(DuplicatePolicy::Priority(CategoryPriority::sleep()));
        let records = vec![
            DailyRecord::new(day(2))
                .with_category("late_nap")
                .with_value("total", 1800.0),
            DailyRecord::new(day(2))
                .with_category("long_sleep")
                .with_value("total", 25200.0),
            DailyRecord::new(day(1))
                .with_category("rest")
                .with_value("total", 600.0),
        ];

        let series = dedup.merge(&records);
        assert_eq!(series.dates(), vec![day(1), day(2)]);
        assert_eq!(series.records()[1].category.as_deref(), Some("long_sleep"));
        assert_eq!(series.records()[1].value("total"), Some(25200.0));
    }

    #[test]
    fn test_unlisted_categories_sort_lexicographically() {
        let dedup = Deduplicator::new(DuplicatePolicy::Priority(CategoryPriority::sleep()));
        let records = vec![
            DailyRecord::new(day(1)).with_category("short"),
            DailyRecord::new(day(1)),
            DailyRecord::new(day(1)).with_category("long"),
        ];
        let series = dedup.merge(&records);
        assert_eq!(series.len(), 1);
        assert_eq!(series.records()[0].category.as_deref(), Some("long"));
    }

    #[test]
    fn test_ties_keep_input_order() {
        let dedup = Deduplicator::new(DuplicatePolicy::Priority(CategoryPriority::input_order()));
        let records = vec![
            DailyRecord::new(day(3)).with_value("vo2max", 47.1),
            DailyRecord::new(day(3)).with_value("vo2max", 48.0),
        ];
        let series = dedup.merge(&records);
        assert_eq!(series.records()[0].value("vo2max"), Some(47.1));
    }

    #[test]
    fn test_combine_sums_and_weights() {
        let dedup = Deduplicator::new(DuplicatePolicy::Combine(CombineRule {
            additive: vec!["distance".to_string(), "duration".to_string()],
            weight_field: Some("duration".to_string()),
        }));
        let records = vec![
            DailyRecord::new(day(4))
                .with_value("distance", 5.0)
                .with_value("duration", 1800.0)
                .with_value("hr", 140.0),
            DailyRecord::new(day(4))
                .with_value("distance", 10.0)
                .with_value("duration", 3600.0)
                .with_value("hr", 155.0),
        ];

        let series = dedup.merge(&records);
        let merged = &series.records()[0];
        assert_eq!(merged.value("distance"), Some(15.0));
        assert_eq!(merged.value("duration"), Some(5400.0));
        // (140 * 1800 + 155 * 3600) / 5400 = 150
        assert!((merged.value("hr").unwrap() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_combine_falls_back_to_plain_mean() {
        let dedup = Deduplicator::new(DuplicatePolicy::Combine(CombineRule {
            additive: vec![],
            weight_field: Some("duration".to_string()),
        }));
        let records = vec![
            DailyRecord::new(day(4)).with_value("hr", 140.0),
            DailyRecord::new(day(4)).with_value("hr", 150.0),
        ];
        let series = dedup.merge(&records);
        assert_eq!(series.records()[0].value("hr"), Some(145.0));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let dedup = Deduplicator::new(DuplicatePolicy::Priority(CategoryPriority::sleep()));
        let records = vec![
            DailyRecord::new(day(1)).with_category("sleep"),
            DailyRecord::new(day(1)).with_category("long_sleep"),
            DailyRecord::new(day(2)).with_category("rest"),
        ];
        let once = dedup.merge(&records);
        let twice = dedup.merge(once.records());
        assert_eq!(once, twice);
    }
}
