use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::chart::{ChartSeriesBuilder, TickSettings};
use crate::error::HealthError;
use crate::logging::LogConfig;
use crate::outliers::OutlierFilter;
use crate::sources::RunFilter;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging output
    #[serde(default)]
    pub logging: LogConfig,

    /// Chart and filtering parameters
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Run selection and distance goal
    #[serde(default)]
    pub running: RunSettings,

    /// Provider export locations
    #[serde(default)]
    pub sources: SourcePaths,
}

/// Chart and filtering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Absolute z-score at or above which a performance point is dropped
    pub outlier_z_threshold: f64,

    /// Maximum number of duration-axis ticks
    pub max_ticks: usize,

    /// Tick labels round to this many minutes
    pub tick_rounding_minutes: u32,

    /// Fewer points than this render as "not enough data"
    pub min_chart_points: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            outlier_z_threshold: 3.0,
            max_ticks: 7,
            tick_rounding_minutes: 10,
            min_chart_points: 2,
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> std::result::Result<(), HealthError> {
        if !self.outlier_z_threshold.is_finite() || self.outlier_z_threshold <= 0.0 {
            return Err(HealthError::Configuration(format!(
                "outlier_z_threshold must be a positive number, got {}",
                self.outlier_z_threshold
            )));
        }
        if self.max_ticks == 0 {
            return Err(HealthError::Configuration(
                "max_ticks must be at least 1".to_string(),
            ));
        }
        if self.tick_rounding_minutes == 0 {
            return Err(HealthError::Configuration(
                "tick_rounding_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn outlier_filter(&self) -> OutlierFilter {
        OutlierFilter::new(self.outlier_z_threshold)
    }

    pub fn chart_builder(&self) -> ChartSeriesBuilder {
        ChartSeriesBuilder::new(
            self.min_chart_points,
            TickSettings {
                max_ticks: self.max_ticks,
                rounding_minutes: self.tick_rounding_minutes,
            },
        )
    }
}

/// Run selection and distance goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Activity type that counts as a run
    pub activity_type: String,

    /// Runs must be strictly longer than this
    pub min_distance_km: f64,

    /// Kilometers logged before the activity export starts
    pub prior_km: f64,

    /// Distance goal, the earth's circumference by default
    pub goal_km: f64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            activity_type: "Running".to_string(),
            min_distance_km: 1.0,
            prior_km: 0.0,
            goal_km: 40_075.0,
        }
    }
}

impl RunSettings {
    pub fn filter(&self) -> RunFilter {
        RunFilter {
            activity_type: self.activity_type.clone(),
            min_distance_km: self.min_distance_km,
        }
    }
}

/// Provider export locations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcePaths {
    /// JSON sleep payload
    pub sleep: Option<PathBuf>,

    /// Activity log CSV export
    pub activities: Option<PathBuf>,

    /// Fitness test CSV export
    pub fitness: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        config
            .analysis
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".healthtrend")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    path = %config_path.display(),
                    error = %err,
                    "Config not loaded, using defaults"
                );
                Self::default()
            }
        }
    }
}
