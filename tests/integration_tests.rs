use chrono::NaiveDate;
use rust_decimal_macros::dec;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

use healthtrend::chart::{TrendLine, INSUFFICIENT_DATA_MESSAGE};
use healthtrend::duration::{format_hhmm, format_hhmm_rounded};
use healthtrend::error::RecordError;
use healthtrend::import::{read_csv_observations, read_sleep_payload, ImportManager};
use healthtrend::models::{fields, RawObservation};
use healthtrend::{
    AppConfig, ChartMetric, Dashboard, DashboardSnapshot, DateWindow, MetricAggregator,
    MetricChart, MetricSpec, SourceDefinition,
};

/// Integration tests that exercise the pipeline from exported files to charts

const SLEEP_PAYLOAD: &str = r#"{
  "data": [
    {"day": "2023-05-01", "type": "long_sleep", "total_sleep_duration": 21600,
     "deep_sleep_duration": 3600, "rem_sleep_duration": 5400,
     "average_hrv": 40, "lowest_heart_rate": 50},
    {"day": "2023-05-02", "type": "late_nap", "total_sleep_duration": 1800,
     "deep_sleep_duration": 0, "rem_sleep_duration": 0,
     "average_hrv": 60, "lowest_heart_rate": 70},
    {"day": "2023-05-02", "type": "long_sleep", "total_sleep_duration": 25200,
     "deep_sleep_duration": 4200, "rem_sleep_duration": 6000,
     "average_hrv": 44, "lowest_heart_rate": 52},
    {"day": "2023-05-03", "type": "long_sleep", "total_sleep_duration": 28800,
     "deep_sleep_duration": 4800, "rem_sleep_duration": 6600,
     "average_hrv": 49, "lowest_heart_rate": 51,
     "readiness": {"score": 77}},
    {"type": "rest"}
  ]
}"#;

const ACTIVITY_EXPORT: &str = "\
Date,Activity,Distance(km),Duration(s),Heart rate: Average(count/min)
2023-05-01 06:30:00 - 2023-05-01 07:00:00,Running,5.0,1800,140
2023-05-01 18:00:00 - 2023-05-01 18:05:00,Running,0.5,300,100
2023-05-02 12:00:00 - 2023-05-02 12:40:00,Walking,3.0,2400,95
2023-05-03 06:00:00 - 2023-05-03 07:00:00,Running,10.0,3600,150
2023-05-03 19:00:00 - 2023-05-03 19:12:00,Running,2.0,720,160
";

const FITNESS_EXPORT: &str = "\
Date,VO2 Max(mL/min·kg)
2023-05-01 08:00:00,45.5
2023-05-03 08:00:00,46.25
";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn write_exports(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    let sleep = dir.join("sleep.json");
    let activities = dir.join("activities.csv");
    let fitness = dir.join("fitness.csv");
    fs::write(&sleep, SLEEP_PAYLOAD).unwrap();
    fs::write(&activities, ACTIVITY_EXPORT).unwrap();
    fs::write(&fitness, FITNESS_EXPORT).unwrap();
    config.sources.sleep = Some(sleep);
    config.sources.activities = Some(activities);
    config.sources.fitness = Some(fitness);
    config
}

fn load(config: &AppConfig) -> DashboardSnapshot {
    let sleep = read_sleep_payload(config.sources.sleep.as_ref().unwrap()).unwrap();
    let activities = read_csv_observations(config.sources.activities.as_ref().unwrap()).unwrap();
    let fitness = read_csv_observations(config.sources.fitness.as_ref().unwrap()).unwrap();
    DashboardSnapshot::from_observations(&sleep, &activities, &fitness, config).unwrap()
}

#[test]
fn test_long_session_survives_merge_and_mean_sleep() {
    let observations = vec![
        RawObservation::new()
            .with("day", "2023-01-01")
            .with("type", "short")
            .with("total_sleep_duration", 1800.0),
        RawObservation::new()
            .with("day", "2023-01-01")
            .with("type", "long")
            .with("total_sleep_duration", 6.0 * 3600.0),
        RawObservation::new()
            .with("day", "2023-01-02")
            .with("type", "long")
            .with("total_sleep_duration", 7.0 * 3600.0),
        RawObservation::new()
            .with("day", "2023-01-03")
            .with("type", "long")
            .with("total_sleep_duration", 8.0 * 3600.0),
    ];

    let series = SourceDefinition::sleep().ingest(&observations).series;
    assert_eq!(series.len(), 3);
    assert_eq!(series.records()[0].category.as_deref(), Some("long"));

    let summary = MetricAggregator::summarize(
        &series,
        &MetricSpec::new(
            "Average sleep duration",
            fields::TOTAL_SLEEP,
            healthtrend::metrics::Aggregate::Mean,
            healthtrend::metrics::Precision::Integer,
            healthtrend::metrics::DisplayUnit::Duration,
        ),
    )
    .unwrap();
    assert_eq!(summary.display(), "07h00");
}

#[test]
fn test_dashboard_from_exported_files() {
    let dir = tempdir().unwrap();
    let config = write_exports(dir.path());
    let snapshot = load(&config);

    // nap on 05-02 loses to the long sleep, dateless row is rejected
    assert_eq!(snapshot.sleep().len(), 3);
    assert_eq!(snapshot.sleep().values(fields::AVERAGE_HRV), vec![40.0, 44.0, 49.0]);

    // short jog and walk dropped, two evening runs combined
    assert_eq!(snapshot.runs().dates(), vec![date(2023, 5, 1), date(2023, 5, 3)]);
    let combined = &snapshot.runs().records()[1];
    assert_eq!(combined.value(fields::DISTANCE_KM), Some(12.0));
    assert_eq!(combined.value(fields::DURATION_S), Some(4320.0));
    let weighted_hr = combined.value(fields::AVG_HEART_RATE).unwrap();
    assert!((weighted_hr - (150.0 * 3600.0 + 160.0 * 720.0) / 4320.0).abs() < 1e-9);

    let cards = snapshot.cards();
    assert_eq!(cards.average_hrv.display(), "44 ms");
    assert_eq!(cards.average_lowest_heart_rate.display(), "51 bpm");
    assert_eq!(cards.average_total_sleep.display(), "07h00");
    assert_eq!(cards.latest_vo2max.value, dec!(46.25));
    assert_eq!(cards.total_distance.display(), "17 km");
    assert_eq!(cards.goal_progress.value, dec!(0.04));

    assert_eq!(
        snapshot.full_window(),
        Some(DateWindow::new(date(2023, 5, 1), date(2023, 5, 3)))
    );
}

#[test]
fn test_window_query_mixes_rendered_and_insufficient() {
    let dir = tempdir().unwrap();
    let snapshot = load(&write_exports(dir.path()));

    let window = DateWindow::parse("2023-05-02", "2023-05-03T23:59:59").unwrap();
    let view = snapshot.query(Some(window));

    let hrv = view.hrv.rendered().unwrap();
    assert_eq!(hrv.x, vec![date(2023, 5, 2), date(2023, 5, 3)]);
    // two points: the trend passes through both
    assert!((hrv.trend.points[0] - 44.0).abs() < 1e-9);
    assert!((hrv.trend.points[1] - 49.0).abs() < 1e-9);

    let total = view.total_sleep.rendered().unwrap();
    assert_eq!(total.point_labels, vec!["07h00", "08h00"]);
    assert!(!total.ticks.as_ref().unwrap().is_empty());

    assert_eq!(view.performance.message(), Some(INSUFFICIENT_DATA_MESSAGE));
    assert_eq!(view.vo2max.message(), Some(INSUFFICIENT_DATA_MESSAGE));
    assert!(view.deep_vs_rem.is_rendered());

    let full = snapshot.query(None);
    assert_eq!(full.performance.rendered().unwrap().y.len(), 2);
    assert_eq!(full.vo2max.rendered().unwrap().y, vec![45.5, 46.25]);
}

#[test]
fn test_chart_payload_serializes_with_status() {
    let dir = tempdir().unwrap();
    let snapshot = load(&write_exports(dir.path()));

    let rendered = serde_json::to_value(snapshot.chart(ChartMetric::DeepSleep, None)).unwrap();
    assert_eq!(rendered["status"], "rendered");
    assert_eq!(rendered["chart"]["field"], fields::DEEP_SLEEP);

    let window = DateWindow::new(date(2023, 5, 3), date(2023, 5, 3));
    let empty = serde_json::to_value(snapshot.chart(ChartMetric::DeepVsRem, Some(&window))).unwrap();
    assert_eq!(empty["status"], "insufficient_data");
}

#[test]
fn test_malformed_observation_only_skips_itself() {
    let observations = vec![
        RawObservation::new().with("Date", "2023-05-01").with("VO2 Max(mL/min·kg)", 45.0),
        RawObservation::new().with("Date", "last tuesday").with("VO2 Max(mL/min·kg)", 46.0),
        RawObservation::new().with("Date", "2023-05-03").with("VO2 Max(mL/min·kg)", "n/a"),
        RawObservation::new().with("Date", "2023-05-04").with("VO2 Max(mL/min·kg)", 47.0),
    ];

    let ingested = SourceDefinition::fitness_test().ingest(&observations);
    assert_eq!(ingested.series.values(fields::VO2MAX), vec![45.0, 47.0]);
    assert_eq!(ingested.rejected.len(), 2);
    assert!(matches!(ingested.rejected[0], RecordError::UnparsableDate { index: 1, .. }));
    assert!(matches!(ingested.rejected[1], RecordError::NotNumeric { index: 2, .. }));
}

#[test]
fn test_refresh_under_concurrent_queries() {
    let dir = tempdir().unwrap();
    let config = write_exports(dir.path());
    let dashboard = Arc::new(Dashboard::new(load(&config)));

    let sleep = read_sleep_payload(config.sources.sleep.as_ref().unwrap()).unwrap();
    let activities = read_csv_observations(config.sources.activities.as_ref().unwrap()).unwrap();
    let fitness = read_csv_observations(config.sources.fitness.as_ref().unwrap()).unwrap();
    let first_two_nights = &sleep[..3];

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let dashboard = Arc::clone(&dashboard);
            scope.spawn(move || {
                for _ in 0..50 {
                    let snapshot = dashboard.snapshot();
                    let view = snapshot.query(None);
                    // cards and charts always come from the same generation
                    let nights = view.hrv.rendered().map(|c| c.y.len()).unwrap_or(0);
                    assert_eq!(nights, snapshot.sleep().len());
                    assert_eq!(view.cards.average_hrv.count, nights);
                }
            });
        }

        for _ in 0..10 {
            let next = DashboardSnapshot::from_observations(
                first_two_nights,
                &activities,
                &fitness,
                &config,
            )
            .unwrap();
            dashboard.refresh(next);
        }
    });

    assert_eq!(dashboard.snapshot().sleep().len(), 2);
}

#[test]
fn test_import_manager_reads_both_exports() {
    let dir = tempdir().unwrap();
    let config = write_exports(dir.path());
    let manager = ImportManager::new();

    let sleep = manager.import_file(config.sources.sleep.as_ref().unwrap()).unwrap();
    let activities = manager.import_file(config.sources.activities.as_ref().unwrap()).unwrap();
    assert_eq!(sleep.len(), 5);
    assert_eq!(activities.len(), 5);
}

#[test]
fn test_reference_numbers() {
    let trend = TrendLine::fit(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
    assert!((trend.slope - 2.0).abs() < 1e-12);
    assert!(trend.intercept.abs() < 1e-12);

    assert_eq!(format_hhmm(5400.0), "01h30");
    assert_eq!(format_hhmm_rounded(5430.0, 10), "01h30");
    assert_eq!(format_hhmm(5430.0), "01h30");
    assert_eq!(format_hhmm(5399.0), "01h29");
}
