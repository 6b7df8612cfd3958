use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::TimeSeries;
use crate::normalize::parse_calendar_date;

/// Inclusive calendar-date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window from date or datetime strings; time-of-day is discarded
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self::new(parse_calendar_date(start)?, parse_calendar_date(end)?))
    }

    /// Window spanning the whole series, `None` when it is empty
    pub fn covering(series: &TimeSeries) -> Option<Self> {
        Some(Self::new(series.first_date()?, series.last_date()?))
    }

    /// Smallest window covering every non-empty series
    pub fn covering_all<'a, I>(series: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a TimeSeries>,
    {
        series
            .into_iter()
            .filter_map(Self::covering)
            .reduce(|a, b| Self::new(a.start.min(b.start), a.end.max(b.end)))
    }

    /// A window whose start falls after its end selects nothing
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Records dated inside the window, order preserved
    pub fn select(&self, series: &TimeSeries) -> TimeSeries {
        if self.is_empty() {
            return TimeSeries::empty();
        }
        series.filtered(|r| self.contains(r.date))
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyRecord;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn series(days: &[u32]) -> TimeSeries {
        TimeSeries::try_from_records(days.iter().map(|d| DailyRecord::new(day(*d))).collect())
            .unwrap()
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let s = series(&[1, 5, 10, 15, 20]);
        let selected = DateWindow::new(day(5), day(15)).select(&s);
        assert_eq!(selected.dates(), vec![day(5), day(10), day(15)]);
    }

    #[test]
    fn test_reversed_window_is_empty() {
        let s = series(&[1, 5, 10]);
        let window = DateWindow::new(day(10), day(1));
        assert!(window.is_empty());
        assert!(window.select(&s).is_empty());
    }

    #[test]
    fn test_covering_window_selects_everything() {
        let s = series(&[3, 4, 9]);
        let window = DateWindow::covering(&s).unwrap();
        assert_eq!(window.select(&s), s);
        assert_eq!(DateWindow::covering(&TimeSeries::empty()), None);
    }

    #[test]
    fn test_parse_strips_time_of_day() {
        let window = DateWindow::parse("2024-01-05T18:45:00", "2024-01-10 00:00:01").unwrap();
        assert_eq!(window, DateWindow::new(day(5), day(10)));

        // end-of-window record survives even though the query carried a time
        let s = series(&[5, 10]);
        assert_eq!(window.select(&s).len(), 2);
        assert!(DateWindow::parse("soon", "2024-01-10").is_none());
    }

    #[test]
    fn test_covering_all() {
        let a = series(&[5, 9]);
        let b = series(&[2, 7]);
        let window = DateWindow::covering_all([&a, &b, &TimeSeries::empty()]).unwrap();
        assert_eq!(window, DateWindow::new(day(2), day(9)));
    }
}
