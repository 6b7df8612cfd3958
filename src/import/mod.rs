//! Readers turning provider exports into `RawObservation`s
//!
//! Only tabular shape is handled here. Field names are left exactly as the
//! provider wrote them; mapping to canonical names happens in `normalize`.

use std::path::Path;
use tracing::info;

use crate::error::{ImportError, Result};
use crate::models::RawObservation;

pub mod csv;
pub mod json;

pub use self::csv::{read_csv_observations, CsvReader};
pub use self::json::{read_sleep_payload, JsonPayloadReader};

/// Trait for reading observations from different file formats
pub trait ObservationFormat {
    /// Check if this reader can handle the given file
    fn can_import(&self, file_path: &Path) -> bool;

    /// Read every observation in the file, in file order
    fn read_observations(&self, file_path: &Path) -> Result<Vec<RawObservation>>;

    /// Get the format name for this reader
    fn format_name(&self) -> &'static str;
}

pub(crate) fn has_extension(file_path: &Path, wanted: &str) -> bool {
    file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}

/// Picks a reader by file extension
pub struct ImportManager {
    formats: Vec<Box<dyn ObservationFormat>>,
}

impl ImportManager {
    /// Create a manager with all available readers
    pub fn new() -> Self {
        let formats: Vec<Box<dyn ObservationFormat>> =
            vec![Box::new(CsvReader::new()), Box::new(JsonPayloadReader::new())];
        Self { formats }
    }

    /// Read a single file, auto-detecting the format
    pub fn import_file(&self, file_path: &Path) -> Result<Vec<RawObservation>> {
        let format = self
            .formats
            .iter()
            .find(|f| f.can_import(file_path))
            .ok_or_else(|| ImportError::UnsupportedFormat {
                path: file_path.to_path_buf(),
            })?;

        let observations = format.read_observations(file_path)?;
        info!(
            path = %file_path.display(),
            format = format.format_name(),
            observations = observations.len(),
            "Imported file"
        );
        Ok(observations)
    }

    pub fn can_import_file(&self, file_path: &Path) -> bool {
        self.formats.iter().any(|f| f.can_import(file_path))
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}
