//! Unified error hierarchy for HealthTrend
//!
//! Record-level failures (`RecordError`) abort a single observation, series-level
//! failures (`SeriesError`) signal a violated precondition on a whole series.
//! A chart with too few points is not an error; see `chart::ChartOutcome`.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all HealthTrend operations
#[derive(Debug, Error)]
pub enum HealthError {
    /// A raw observation could not be normalized
    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] RecordError),

    /// A series-level precondition was violated
    #[error("Series error: {0}")]
    Series(#[from] SeriesError),

    /// Reading a provider export failed
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Normalization failures for a single observation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// Required field absent or null
    #[error("record {index}: missing field '{field}'")]
    MissingField { index: usize, field: String },

    /// Date-bearing field present but not a calendar date
    #[error("record {index}: unparsable date in '{field}': {value:?}")]
    UnparsableDate {
        index: usize,
        field: String,
        value: String,
    },

    /// Range string did not contain the requested boundary
    #[error("record {index}: '{field}' has no token {token} when split on {delimiter:?}")]
    MissingRangeBoundary {
        index: usize,
        field: String,
        delimiter: String,
        token: usize,
    },

    /// Field present but not interpretable as a number
    #[error("record {index}: field '{field}' is not numeric: {value:?}")]
    NotNumeric {
        index: usize,
        field: String,
        value: String,
    },
}

impl RecordError {
    /// Position of the offending observation in its batch
    pub fn index(&self) -> usize {
        match self {
            RecordError::MissingField { index, .. }
            | RecordError::UnparsableDate { index, .. }
            | RecordError::MissingRangeBoundary { index, .. }
            | RecordError::NotNumeric { index, .. } => *index,
        }
    }
}

/// Whole-series errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    /// Aggregation requested over zero values
    #[error("Empty series: no values for '{field}'")]
    EmptySeries { field: String },

    /// Two records share a date where one-per-day is required
    #[error("Duplicate date in series: {date}")]
    DuplicateDate { date: NaiveDate },

    /// A rollup produced a value that cannot be represented
    #[error("Non-finite result for '{field}'")]
    NonFinite { field: String },
}

/// Errors from the import adapters
#[derive(Debug, Error)]
pub enum ImportError {
    /// CSV reader failure
    #[error("CSV error in {path}: {reason}")]
    Csv { path: PathBuf, reason: String },

    /// JSON payload failure
    #[error("JSON error in {path}: {reason}")]
    Json { path: PathBuf, reason: String },

    /// Payload parsed but has an unexpected shape
    #[error("Invalid payload structure in {path}: {reason}")]
    InvalidStructure { path: PathBuf, reason: String },

    /// No reader handles the file's extension
    #[error("Unsupported file format: {path}")]
    UnsupportedFormat { path: PathBuf },
}

/// Result type alias for HealthTrend operations
pub type Result<T> = std::result::Result<T, HealthError>;

impl HealthError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            HealthError::MalformedRecord(_) => ErrorSeverity::Warning,
            HealthError::Series(SeriesError::EmptySeries { .. }) => ErrorSeverity::Critical,
            HealthError::Series(SeriesError::DuplicateDate { .. }) => ErrorSeverity::Error,
            HealthError::Configuration(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            HealthError::MalformedRecord(err) => {
                format!("Skipped an unreadable record: {}", err)
            }
            HealthError::Series(SeriesError::EmptySeries { field }) => {
                format!(
                    "No history available for {}. Check that the data source is not empty.",
                    field
                )
            }
            HealthError::Import(ImportError::Csv { path, .. }) => {
                format!("Could not read export file: {}", path.display())
            }
            HealthError::Import(ImportError::UnsupportedFormat { path }) => {
                format!(
                    "Don't know how to read {}. Expected a .csv export or a .json payload.",
                    path.display()
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Startup cannot continue
    Critical,
    /// Operation failed
    Error,
    /// Operation degraded, processing continues
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical | ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
