use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

use crate::error::{ImportError, Result};
use crate::import::{has_extension, ObservationFormat};
use crate::models::{FieldValue, RawObservation};

/// Reader for JSON payloads shaped `{"data": [{...}, ...]}` or `[{...}, ...]`
pub struct JsonPayloadReader;

impl JsonPayloadReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read_from<R: Read>(&self, source: R, origin: &Path) -> Result<Vec<RawObservation>> {
        let payload: Value = serde_json::from_reader(source).map_err(|err| ImportError::Json {
            path: origin.to_path_buf(),
            reason: err.to_string(),
        })?;
        let invalid = |reason: String| ImportError::InvalidStructure {
            path: origin.to_path_buf(),
            reason,
        };

        let items = match payload {
            Value::Array(items) => items,
            Value::Object(mut envelope) => match envelope.remove("data") {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    let reason = format!("\"data\" is {}, expected an array", kind(&other));
                    return Err(invalid(reason).into());
                }
                None => return Err(invalid("object without a \"data\" array".to_string()).into()),
            },
            other => return Err(invalid(format!("top level is {}", kind(&other))).into()),
        };

        let mut observations = Vec::with_capacity(items.len());
        for (position, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(fields) => observations.push(Self::observation(fields)),
                other => {
                    let reason =
                        format!("item {} is {}, expected an object", position, kind(&other));
                    return Err(invalid(reason).into());
                }
            }
        }

        debug!(path = %origin.display(), items = observations.len(), "Read JSON payload");
        Ok(observations)
    }

    /// Scalars only; nested contributor objects and sample arrays are dropped
    fn observation(fields: Map<String, Value>) -> RawObservation {
        fields
            .into_iter()
            .filter_map(|(name, value)| {
                let value = match value {
                    Value::Null => FieldValue::Null,
                    Value::Bool(flag) => FieldValue::Bool(flag),
                    Value::Number(number) => FieldValue::Number(number.as_f64()?),
                    Value::String(text) => FieldValue::Text(text),
                    Value::Array(_) | Value::Object(_) => return None,
                };
                Some((name, value))
            })
            .collect()
    }
}

impl Default for JsonPayloadReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationFormat for JsonPayloadReader {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, "json")
    }

    fn read_observations(&self, file_path: &Path) -> Result<Vec<RawObservation>> {
        let file = File::open(file_path)?;
        self.read_from(BufReader::new(file), file_path)
    }

    fn format_name(&self) -> &'static str {
        "JSON"
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Read a sleep payload as saved from the provider API
pub fn read_sleep_payload<P: AsRef<Path>>(path: P) -> Result<Vec<RawObservation>> {
    JsonPayloadReader::new().read_observations(path.as_ref())
}
