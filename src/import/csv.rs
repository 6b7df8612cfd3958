use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::{ImportError, Result};
use crate::import::{has_extension, ObservationFormat};
use crate::models::{FieldValue, RawObservation};

/// Reader for header-first CSV exports
pub struct CsvReader {
    delimiter: u8,
}

impl CsvReader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Read observations from any byte source; `origin` names it in errors
    pub fn read_from<R: Read>(&self, source: R, origin: &Path) -> Result<Vec<RawObservation>> {
        let csv_error = |err: csv::Error| ImportError::Csv {
            path: origin.to_path_buf(),
            reason: err.to_string(),
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        let headers = reader.headers().map_err(csv_error)?.clone();
        let mut observations = Vec::new();

        for result in reader.records() {
            let record = result.map_err(csv_error)?;
            observations.push(Self::observation(&headers, &record));
        }

        debug!(
            path = %origin.display(),
            columns = headers.len(),
            rows = observations.len(),
            "Read CSV export"
        );
        Ok(observations)
    }

    /// Short rows leave trailing columns out rather than null
    fn observation(headers: &StringRecord, record: &StringRecord) -> RawObservation {
        headers
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.to_string(), parse_cell(cell)))
            .collect()
    }
}

impl Default for CsvReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationFormat for CsvReader {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, "csv")
    }

    fn read_observations(&self, file_path: &Path) -> Result<Vec<RawObservation>> {
        let file = File::open(file_path)?;
        self.read_from(file, file_path)
    }

    fn format_name(&self) -> &'static str {
        "CSV"
    }
}

/// Empty cells are null, finite numbers are numeric, anything else is text
fn parse_cell(cell: &str) -> FieldValue {
    if cell.is_empty() {
        return FieldValue::Null;
    }
    match cell.parse::<f64>() {
        Ok(number) if number.is_finite() => FieldValue::Number(number),
        _ => FieldValue::Text(cell.to_string()),
    }
}

/// Read every row of a CSV export
pub fn read_csv_observations<P: AsRef<Path>>(path: P) -> Result<Vec<RawObservation>> {
    CsvReader::new().read_observations(path.as_ref())
}
