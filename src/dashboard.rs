//! Dashboard snapshot and per-query chart bundle
//!
//! A `DashboardSnapshot` holds the ingested series and the summary cards,
//! both computed once. Queries only read from it, and `Dashboard::refresh`
//! installs a replacement snapshot without disturbing queries already holding
//! the previous one.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::chart::{ChartOutcome, ChartSeriesBuilder, ComparisonChart, RenderHints};
use crate::config::{AnalysisSettings, AppConfig, RunSettings};
use crate::error::{HealthError, Result};
use crate::metrics::{Aggregate, DisplayUnit, MetricAggregator, MetricSpec, MetricSummary, Precision};
use crate::models::{fields, RawObservation, TimeSeries};
use crate::range::DateWindow;
use crate::sources::{ingest_runs, SourceDefinition};

/// Fixed summary cards over the full ingested history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryCards {
    pub average_hrv: MetricSummary,
    pub average_lowest_heart_rate: MetricSummary,
    pub average_total_sleep: MetricSummary,
    pub latest_vo2max: MetricSummary,
    pub total_distance: MetricSummary,
    pub goal_progress: MetricSummary,
}

impl SummaryCards {
    pub fn compute(
        sleep: &TimeSeries,
        runs: &TimeSeries,
        fitness: &TimeSeries,
        running: &RunSettings,
    ) -> Result<Self> {
        let average_hrv = MetricAggregator::summarize(
            sleep,
            &MetricSpec::new(
                "Average HRV",
                fields::AVERAGE_HRV,
                Aggregate::Mean,
                Precision::Integer,
                DisplayUnit::Milliseconds,
            ),
        )?;
        let average_lowest_heart_rate = MetricAggregator::summarize(
            sleep,
            &MetricSpec::new(
                "Average lowest heart rate",
                fields::LOWEST_HEART_RATE,
                Aggregate::Mean,
                Precision::Integer,
                DisplayUnit::BeatsPerMinute,
            ),
        )?;
        let average_total_sleep = MetricAggregator::summarize(
            sleep,
            &MetricSpec::new(
                "Average sleep duration",
                fields::TOTAL_SLEEP,
                Aggregate::Mean,
                Precision::Integer,
                DisplayUnit::Duration,
            ),
        )?;
        let latest_vo2max = MetricAggregator::summarize(
            fitness,
            &MetricSpec::new(
                "VO2 max",
                fields::VO2MAX,
                Aggregate::Latest,
                Precision::TwoDecimals,
                DisplayUnit::Plain,
            ),
        )?;

        let run_distance = MetricAggregator::summarize(
            runs,
            &MetricSpec::new(
                "Total distance run",
                fields::DISTANCE_KM,
                Aggregate::Sum,
                Precision::Integer,
                DisplayUnit::Kilometers,
            ),
        )?;
        let total_distance =
            run_distance.offset_by(to_decimal("prior_km", running.prior_km)?, Precision::Integer);
        let goal_progress = total_distance.percent_of(
            "Around the earth",
            to_decimal("goal_km", running.goal_km)?,
            Precision::TwoDecimals,
        )?;

        Ok(Self {
            average_hrv,
            average_lowest_heart_rate,
            average_total_sleep,
            latest_vo2max,
            total_distance,
            goal_progress,
        })
    }

    /// Cards in display order
    pub fn all(&self) -> [&MetricSummary; 6] {
        [
            &self.average_hrv,
            &self.average_lowest_heart_rate,
            &self.average_total_sleep,
            &self.latest_vo2max,
            &self.total_distance,
            &self.goal_progress,
        ]
    }
}

fn to_decimal(setting: &str, value: f64) -> Result<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| {
        HealthError::Configuration(format!("{} must be a finite number, got {}", setting, value))
    })
}

/// Charts the dashboard can render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChartMetric {
    Hrv,
    Performance,
    Vo2max,
    TotalSleep,
    DeepVsRem,
    DeepSleep,
    RemSleep,
}

impl ChartMetric {
    pub const ALL: [ChartMetric; 7] = [
        ChartMetric::Hrv,
        ChartMetric::Performance,
        ChartMetric::Vo2max,
        ChartMetric::TotalSleep,
        ChartMetric::DeepVsRem,
        ChartMetric::DeepSleep,
        ChartMetric::RemSleep,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ChartMetric::Hrv => "hrv",
            ChartMetric::Performance => "performance",
            ChartMetric::Vo2max => "vo2max",
            ChartMetric::TotalSleep => "total-sleep",
            ChartMetric::DeepVsRem => "deep-vs-rem",
            ChartMetric::DeepSleep => "deep-sleep",
            ChartMetric::RemSleep => "rem-sleep",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ChartMetric::Hrv => "Heart rate variability",
            ChartMetric::Performance => "Zone 2 performance (km/h per bpm)",
            ChartMetric::Vo2max => "VO2 max",
            ChartMetric::TotalSleep => "Total sleep",
            ChartMetric::DeepVsRem => "Deep vs REM sleep",
            ChartMetric::DeepSleep => "Deep sleep",
            ChartMetric::RemSleep => "REM sleep",
        }
    }
}

impl fmt::Display for ChartMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChartMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        ChartMetric::ALL
            .into_iter()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| format!("Unknown chart metric: {}", s))
    }
}

/// One chart, either a single trended series or an overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricChart {
    Series(ChartOutcome),
    Comparison(ChartOutcome<ComparisonChart>),
}

impl MetricChart {
    pub fn is_rendered(&self) -> bool {
        match self {
            MetricChart::Series(outcome) => outcome.is_rendered(),
            MetricChart::Comparison(outcome) => outcome.is_rendered(),
        }
    }

    pub fn message(&self) -> Option<&'static str> {
        match self {
            MetricChart::Series(outcome) => outcome.message(),
            MetricChart::Comparison(outcome) => outcome.message(),
        }
    }
}

/// Everything the rendering layer needs for one date-range request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    /// `None` when the full history was used
    pub window: Option<DateWindow>,
    pub cards: SummaryCards,
    pub hrv: ChartOutcome,
    pub performance: ChartOutcome,
    pub vo2max: ChartOutcome,
    pub total_sleep: ChartOutcome,
    pub deep_vs_rem: ChartOutcome<ComparisonChart>,
    pub deep_sleep: ChartOutcome,
    pub rem_sleep: ChartOutcome,
}

/// Which ingested series a chart reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Sleep,
    Runs,
    Fitness,
}

impl ChartMetric {
    fn source(&self) -> Source {
        match self {
            ChartMetric::Performance => Source::Runs,
            ChartMetric::Vo2max => Source::Fitness,
            _ => Source::Sleep,
        }
    }

    /// Field and hints for single-series charts, `None` for the overlay
    fn trended(&self) -> Option<(&'static str, RenderHints)> {
        match self {
            ChartMetric::Hrv => Some((fields::AVERAGE_HRV, RenderHints::decimal(0, Some("ms")))),
            ChartMetric::Performance => Some((fields::PERFORMANCE, RenderHints::decimal(3, None))),
            ChartMetric::Vo2max => Some((fields::VO2MAX, RenderHints::decimal(2, None))),
            ChartMetric::TotalSleep => Some((fields::TOTAL_SLEEP, RenderHints::duration())),
            ChartMetric::DeepSleep => Some((fields::DEEP_SLEEP, RenderHints::duration())),
            ChartMetric::RemSleep => Some((fields::REM_SLEEP, RenderHints::duration())),
            ChartMetric::DeepVsRem => None,
        }
    }
}

const SLEEP_STAGES: [(&str, &str); 2] = [
    ("Deep sleep", fields::DEEP_SLEEP),
    ("REM sleep", fields::REM_SLEEP),
];

/// Series restricted to one query window, outliers already removed
struct Windowed {
    sleep: TimeSeries,
    runs: TimeSeries,
    fitness: TimeSeries,
}

impl Windowed {
    fn get(&self, source: Source) -> &TimeSeries {
        match source {
            Source::Sleep => &self.sleep,
            Source::Runs => &self.runs,
            Source::Fitness => &self.fitness,
        }
    }
}

/// Immutable ingested state behind one dashboard generation
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    sleep: TimeSeries,
    runs: TimeSeries,
    fitness: TimeSeries,
    cards: SummaryCards,
    analysis: AnalysisSettings,
}

impl DashboardSnapshot {
    /// Assemble from already-merged series. Fails when any card's history
    /// is empty.
    pub fn build(
        sleep: TimeSeries,
        runs: TimeSeries,
        fitness: TimeSeries,
        config: &AppConfig,
    ) -> Result<Self> {
        config.analysis.validate()?;
        let cards = SummaryCards::compute(&sleep, &runs, &fitness, &config.running)?;

        info!(
            sleep_days = sleep.len(),
            run_days = runs.len(),
            fitness_days = fitness.len(),
            "Built dashboard snapshot"
        );

        Ok(Self {
            sleep,
            runs,
            fitness,
            cards,
            analysis: config.analysis.clone(),
        })
    }

    /// Normalize, merge and assemble from raw provider observations.
    /// Rejected observations are logged and skipped.
    pub fn from_observations(
        sleep: &[RawObservation],
        activities: &[RawObservation],
        fitness: &[RawObservation],
        config: &AppConfig,
    ) -> Result<Self> {
        let sleep = SourceDefinition::sleep().ingest(sleep);
        let runs = ingest_runs(activities, &config.running.filter());
        let fitness = SourceDefinition::fitness_test().ingest(fitness);

        let rejected = sleep.rejected.len() + runs.rejected.len() + fitness.rejected.len();
        if rejected > 0 {
            warn!(rejected, "Some observations were rejected during ingest");
        }

        Self::build(sleep.series, runs.series, fitness.series, config)
    }

    pub fn sleep(&self) -> &TimeSeries {
        &self.sleep
    }

    pub fn runs(&self) -> &TimeSeries {
        &self.runs
    }

    pub fn fitness(&self) -> &TimeSeries {
        &self.fitness
    }

    pub fn cards(&self) -> &SummaryCards {
        &self.cards
    }

    pub fn analysis(&self) -> &AnalysisSettings {
        &self.analysis
    }

    /// Window spanning every ingested series
    pub fn full_window(&self) -> Option<DateWindow> {
        DateWindow::covering_all([&self.sleep, &self.runs, &self.fitness])
    }

    fn series(&self, source: Source) -> &TimeSeries {
        match source {
            Source::Sleep => &self.sleep,
            Source::Runs => &self.runs,
            Source::Fitness => &self.fitness,
        }
    }

    /// Range selection, then outlier removal for the run series
    fn prepare(&self, source: Source, window: Option<&DateWindow>) -> TimeSeries {
        let selected = match window {
            Some(window) => window.select(self.series(source)),
            None => self.series(source).clone(),
        };
        match source {
            Source::Runs => self
                .analysis
                .outlier_filter()
                .filter(&selected, fields::PERFORMANCE),
            _ => selected,
        }
    }

    /// Single-series chart; the overlay metric has no single-series form
    fn trended(
        builder: &ChartSeriesBuilder,
        series: &TimeSeries,
        metric: ChartMetric,
    ) -> ChartOutcome {
        match metric.trended() {
            Some((field, hints)) => builder.build(series, field, &hints),
            None => ChartOutcome::InsufficientData,
        }
    }

    /// Render a single chart for the window, or the full history
    pub fn chart(&self, metric: ChartMetric, window: Option<&DateWindow>) -> MetricChart {
        let series = self.prepare(metric.source(), window);
        let builder = self.analysis.chart_builder();
        match metric {
            ChartMetric::DeepVsRem => {
                MetricChart::Comparison(builder.build_comparison(&series, &SLEEP_STAGES))
            }
            _ => MetricChart::Series(Self::trended(&builder, &series, metric)),
        }
    }

    /// Every dashboard chart for the window plus the fixed cards
    pub fn query(&self, window: Option<DateWindow>) -> DashboardView {
        let w = window.as_ref();
        let data = Windowed {
            sleep: self.prepare(Source::Sleep, w),
            runs: self.prepare(Source::Runs, w),
            fitness: self.prepare(Source::Fitness, w),
        };
        let builder = self.analysis.chart_builder();

        debug!(
            window = ?window,
            sleep_days = data.sleep.len(),
            run_days = data.runs.len(),
            fitness_days = data.fitness.len(),
            "Dashboard query"
        );

        let trended =
            |metric: ChartMetric| Self::trended(&builder, data.get(metric.source()), metric);

        DashboardView {
            window,
            cards: self.cards.clone(),
            hrv: trended(ChartMetric::Hrv),
            performance: trended(ChartMetric::Performance),
            vo2max: trended(ChartMetric::Vo2max),
            total_sleep: trended(ChartMetric::TotalSleep),
            deep_vs_rem: builder.build_comparison(&data.sleep, &SLEEP_STAGES),
            deep_sleep: trended(ChartMetric::DeepSleep),
            rem_sleep: trended(ChartMetric::RemSleep),
        }
    }
}

/// Shared handle onto the current snapshot
#[derive(Debug)]
pub struct Dashboard {
    current: RwLock<Arc<DashboardSnapshot>>,
}

impl Dashboard {
    pub fn new(snapshot: DashboardSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot queries currently read from
    pub fn snapshot(&self) -> Arc<DashboardSnapshot> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// Install a new snapshot, returning the one it replaced. Holders of the
    /// old `Arc` keep reading it unchanged.
    pub fn refresh(&self, snapshot: DashboardSnapshot) -> Arc<DashboardSnapshot> {
        let next = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = std::mem::replace(&mut *guard, next);
        info!(
            sleep_days = guard.sleep.len(),
            run_days = guard.runs.len(),
            "Dashboard refreshed"
        );
        previous
    }

    pub fn query(&self, window: Option<DateWindow>) -> DashboardView {
        self.snapshot().query(window)
    }

    pub fn chart(&self, metric: ChartMetric, window: Option<DateWindow>) -> MetricChart {
        self.snapshot().chart(metric, window.as_ref())
    }
}
