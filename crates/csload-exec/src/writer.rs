//! One parsed record → one sink row.
//!
//! Target columns are filled in ascending order. Defaults go through the null
//! rules first; source fields are null when empty (or equal to the null
//! token), parsed with a date format for DATE/DATETIME targets when one is
//! configured, and otherwise handed to the sink as text for it to coerce.
//! Conversion statuses other than `Ok` are logged but never fail the row.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::warn;

use csload_core::config::LoadConfig;
use csload_core::mapping::{ColumnMapping, MappingEntry};
use csload_core::schema::{DataType, Field, Schema};
use csload_core::sink::{BulkSink, SinkError};
use csload_core::types::{ConversionStatus, Scalar};
use csload_io::ErrorLog;

pub struct RowWriter<'a> {
    schema: &'a Schema,
    mapping: &'a ColumnMapping,
    date_format: Option<&'a str>,
    null_token: Option<&'a str>,
    error_log: Option<&'a ErrorLog>,
}

/// Which input produced a value, as written to the error log.
#[derive(Clone, Copy)]
enum Origin {
    Default,
    Field(usize),
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Default => f.write_str("default"),
            Origin::Field(i) => write!(f, "{i}"),
        }
    }
}

impl<'a> RowWriter<'a> {
    pub fn new(schema: &'a Schema, mapping: &'a ColumnMapping, config: &'a LoadConfig) -> Self {
        Self {
            schema,
            mapping,
            date_format: config.date_format.as_deref(),
            null_token: config.null_token.as_deref(),
            error_log: None,
        }
    }

    pub fn with_error_log(mut self, log: Option<&'a ErrorLog>) -> Self {
        self.error_log = log;
        self
    }

    /// Stage every target column of `record` and write the row.
    ///
    /// Returns the number of non-`Ok` conversions.
    pub fn write(&self, sink: &mut dyn BulkSink, record: &[String]) -> Result<u64, SinkError> {
        let mut warnings = 0;
        for (col, field) in self.schema.fields.iter().enumerate() {
            let (origin, status) = match self.mapping.entry(col) {
                Some(MappingEntry::SourceField(i)) => {
                    let raw = record.get(*i).map(String::as_str).unwrap_or("");
                    (Origin::Field(*i), self.write_field(sink, col, field, raw)?)
                }
                Some(MappingEntry::LiteralDefault(v)) => {
                    (Origin::Default, self.write_default(sink, col, field, Some(v.as_str()))?)
                }
                Some(MappingEntry::SchemaDefault) | None => (
                    Origin::Default,
                    self.write_default(sink, col, field, field.default.as_deref())?,
                ),
            };
            if !status.is_ok() {
                warnings += 1;
                self.log(status, origin, record);
            }
        }
        sink.write_row()?;
        Ok(warnings)
    }

    fn write_default(
        &self,
        sink: &mut dyn BulkSink,
        col: usize,
        field: &Field,
        default: Option<&str>,
    ) -> Result<ConversionStatus, SinkError> {
        match default {
            None => sink.set_null(col),
            Some(d) if self.is_null_token(d) || (d.is_empty() && field.nullable) => {
                sink.set_null(col)
            }
            Some(d) => sink.set_value(col, Scalar::Str(d.to_string())),
        }
    }

    fn write_field(
        &self,
        sink: &mut dyn BulkSink,
        col: usize,
        field: &Field,
        raw: &str,
    ) -> Result<ConversionStatus, SinkError> {
        if raw.is_empty() || self.is_null_token(raw) {
            return sink.set_null(col);
        }

        if field.data_type.is_temporal() {
            if let Some(fmt) = self.mapping.date_format(col).or(self.date_format) {
                return match parse_temporal(field.data_type, raw, fmt) {
                    Some(value) => sink.set_value(col, value),
                    None => {
                        sink.set_null(col)?;
                        Ok(ConversionStatus::Invalid)
                    }
                };
            }
        }

        if field.data_type.is_numeric() && raw == "true" {
            return sink.set_value(col, Scalar::I64(1));
        }

        sink.set_value(col, Scalar::Str(raw.to_string()))
    }

    fn is_null_token(&self, s: &str) -> bool {
        self.null_token == Some(s)
    }

    fn log(&self, status: ConversionStatus, origin: Origin, record: &[String]) {
        if let Some(log) = self.error_log {
            if let Err(e) = log.append(status.as_str(), origin, record) {
                warn!("{e}");
            }
        }
    }
}

/// Parse `raw` with a strftime `fmt`. A DATETIME column accepts a date-only
/// format (midnight); a DATE column accepts a format with a time part.
fn parse_temporal(data_type: DataType, raw: &str, fmt: &str) -> Option<Scalar> {
    let raw = raw.trim();
    match data_type {
        DataType::Date => NaiveDate::parse_from_str(raw, fmt)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, fmt).map(|dt| dt.date()))
            .ok()
            .map(Scalar::Date),
        DataType::DateTime => NaiveDateTime::parse_from_str(raw, fmt)
            .or_else(|_| {
                NaiveDate::parse_from_str(raw, fmt).map(|d| d.and_time(NaiveTime::MIN))
            })
            .ok()
            .map(Scalar::DateTime),
        _ => None,
    }
}
