//! Record normalization
//!
//! Turns loosely-typed provider observations into `DailyRecord`s keyed by a
//! validated calendar date. Each source describes its layout with a
//! `SourceSchema`; normalization is a pure transform.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RecordError;
use crate::models::{DailyRecord, FieldValue, RawObservation};

/// How the date key is extracted from an observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateRule {
    /// The named field holds a date or datetime
    Field(String),

    /// The named field holds a range such as `"start - end"`; the token at
    /// `token` (zero-based) after splitting on `delimiter` is the date
    RangeBoundary {
        field: String,
        delimiter: String,
        token: usize,
    },
}

impl DateRule {
    pub fn field(name: impl Into<String>) -> Self {
        DateRule::Field(name.into())
    }

    /// Second token of a `" - "` delimited range
    pub fn range_end(name: impl Into<String>) -> Self {
        DateRule::RangeBoundary {
            field: name.into(),
            delimiter: " - ".to_string(),
            token: 1,
        }
    }

    fn field_name(&self) -> &str {
        match self {
            DateRule::Field(name) => name,
            DateRule::RangeBoundary { field, .. } => field,
        }
    }
}

/// Numeric field carried over from a source observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field name in the provider payload
    pub source: String,

    /// Canonical name in the `DailyRecord`
    pub canonical: String,

    /// Alternative spellings of `source` in older exports
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Reject the observation when the field is absent or blank
    pub required: bool,
}

impl FieldMapping {
    pub fn optional(source: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            canonical: canonical.into(),
            aliases: Vec::new(),
            required: false,
        }
    }

    pub fn or_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    fn lookup<'a>(&self, observation: &'a RawObservation) -> Option<&'a FieldValue> {
        observation
            .get(&self.source)
            .or_else(|| self.aliases.iter().find_map(|a| observation.get(a)))
    }

    pub fn required(source: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            required: true,
            ..Self::optional(source, canonical)
        }
    }
}

/// Layout of one provider's records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSchema {
    /// Source name used in logs
    pub name: String,

    pub date_rule: DateRule,

    /// Categorical field copied into `DailyRecord::category`
    pub category_field: Option<String>,

    pub fields: Vec<FieldMapping>,
}

/// Outcome of normalizing a batch: accepted records plus per-record rejections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub records: Vec<DailyRecord>,
    pub rejected: Vec<RecordError>,
}

/// Normalizer bound to one source schema
pub struct RecordNormalizer {
    schema: SourceSchema,
}

impl RecordNormalizer {
    pub fn new(schema: SourceSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    /// Normalize a single observation. `index` is its position in the batch
    /// and is carried into any error.
    pub fn normalize(
        &self,
        index: usize,
        observation: &RawObservation,
    ) -> Result<DailyRecord, RecordError> {
        let date = self.extract_date(index, observation)?;
        let mut record = DailyRecord::new(date);

        if let Some(category_field) = &self.schema.category_field {
            record.category = observation.get(category_field).and_then(FieldValue::to_text);
        }

        for mapping in &self.schema.fields {
            let value = match mapping.lookup(observation) {
                Some(raw) => raw.to_number().map_err(|text| RecordError::NotNumeric {
                    index,
                    field: mapping.source.clone(),
                    value: text,
                })?,
                None => None,
            };

            match value {
                Some(v) => {
                    record.values.insert(mapping.canonical.clone(), v);
                }
                None if mapping.required => {
                    return Err(RecordError::MissingField {
                        index,
                        field: mapping.source.clone(),
                    });
                }
                None => {}
            }
        }

        Ok(record)
    }

    /// Normalize a batch. A malformed observation is rejected on its own and
    /// does not abort the rest of the batch.
    pub fn normalize_batch(&self, observations: &[RawObservation]) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        for (index, observation) in observations.iter().enumerate() {
            match self.normalize(index, observation) {
                Ok(record) => batch.records.push(record),
                Err(err) => {
                    warn!(source = %self.schema.name, error = %err, "Rejected observation");
                    batch.rejected.push(err);
                }
            }
        }

        debug!(
            source = %self.schema.name,
            accepted = batch.records.len(),
            rejected = batch.rejected.len(),
            "Normalized batch"
        );

        batch
    }

    fn extract_date(
        &self,
        index: usize,
        observation: &RawObservation,
    ) -> Result<NaiveDate, RecordError> {
        let field = self.schema.date_rule.field_name();
        let raw = observation
            .get(field)
            .filter(|v| !v.is_blank())
            .ok_or_else(|| RecordError::MissingField {
                index,
                field: field.to_string(),
            })?;

        let text = match raw {
            FieldValue::Text(s) => s.as_str(),
            other => {
                return Err(RecordError::UnparsableDate {
                    index,
                    field: field.to_string(),
                    value: other.to_text().unwrap_or_default(),
                })
            }
        };

        let candidate = match &self.schema.date_rule {
            DateRule::Field(_) => text,
            DateRule::RangeBoundary {
                delimiter, token, ..
            } => text
                .split(delimiter.as_str())
                .nth(*token)
                .ok_or_else(|| RecordError::MissingRangeBoundary {
                    index,
                    field: field.to_string(),
                    delimiter: delimiter.clone(),
                    token: *token,
                })?,
        };

        parse_calendar_date(candidate).ok_or_else(|| RecordError::UnparsableDate {
            index,
            field: field.to_string(),
            value: candidate.trim().to_string(),
        })
    }
}

/// Parse a date or datetime string and keep only its calendar date.
///
/// Datetimes with an offset keep the date as written, not the UTC date.
pub fn parse_calendar_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();

    let date_formats = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];
    for format in &date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }

    let datetime_formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for format in &datetime_formats {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(s, format) {
            return Some(datetime.date());
        }
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
        return Some(datetime.naive_local().date());
    }

    let offset_formats = ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%dT%H:%M:%S%z"];
    for format in &offset_formats {
        if let Ok(datetime) = DateTime::parse_from_str(s, format) {
            return Some(datetime.naive_local().date());
        }
    }

    None
}
