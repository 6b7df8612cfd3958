// Library interface for HealthTrend modules
// The CLI and the integration tests both build on it

pub mod chart;
pub mod config;
pub mod dashboard;
pub mod dedup;
pub mod duration;
pub mod error;
pub mod import;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod outliers;
pub mod range;
pub mod sources;

// Re-export commonly used types for convenience
pub use models::*;
pub use chart::{ChartOutcome, ChartSeries, ChartSeriesBuilder, ComparisonChart, RenderHints, TrendLine};
pub use config::AppConfig;
pub use dashboard::{ChartMetric, Dashboard, DashboardSnapshot, DashboardView, MetricChart, SummaryCards};
pub use dedup::{CategoryPriority, Deduplicator, DuplicatePolicy};
pub use error::{HealthError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use metrics::{MetricAggregator, MetricSpec, MetricSummary};
pub use normalize::{RecordNormalizer, SourceSchema};
pub use outliers::OutlierFilter;
pub use range::DateWindow;
pub use sources::{RunFilter, SourceDefinition};
