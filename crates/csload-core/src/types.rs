//! Logical values and the coercion rules every sink applies.
//!
//! The row writer hands a sink loosely typed `Scalar`s (usually raw text); the
//! sink coerces them to the declared column type through [`coerce`] and
//! reports how faithful the stored value is via [`ConversionStatus`].

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::schema::{DataType, Field};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Scalar {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I32(_) => Some(DataType::Int32),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F32(_) => Some(DataType::Float32),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
            Scalar::Date(_) => Some(DataType::Date),
            Scalar::DateTime(_) => Some(DataType::DateTime),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Zero value stored when a conversion is invalid.
    pub fn zero(data_type: DataType) -> Scalar {
        match data_type {
            DataType::Boolean => Scalar::Bool(false),
            DataType::Int32 => Scalar::I32(0),
            DataType::Int64 => Scalar::I64(0),
            DataType::Float32 => Scalar::F32(0.0),
            DataType::Float64 => Scalar::F64(0.0),
            DataType::Utf8 => Scalar::Str(String::new()),
            DataType::Date => Scalar::Date(NaiveDate::default()),
            DataType::DateTime => Scalar::DateTime(NaiveDateTime::default()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("NULL"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::I32(i) => write!(f, "{i}"),
            Scalar::I64(i) => write!(f, "{i}"),
            Scalar::F32(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Scalar::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Outcome of coercing one value into its target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversionStatus {
    Ok,
    Saturated,
    Invalid,
    Truncated,
}

impl ConversionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConversionStatus::Ok)
    }

    /// Label used in the error log.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Ok => "OK",
            ConversionStatus::Saturated => "SATURATED",
            ConversionStatus::Invalid => "INVALID",
            ConversionStatus::Truncated => "TRUNCATED",
        }
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Coerce `value` into the type declared by `field`.
pub fn coerce(field: &Field, value: Scalar) -> (Scalar, ConversionStatus) {
    if value.is_null() {
        return coerce_null(field);
    }
    match field.data_type {
        DataType::Int32 => coerce_int(value, i32::MIN as i64, i32::MAX as i64, |v| {
            Scalar::I32(v as i32)
        }),
        DataType::Int64 => coerce_int(value, i64::MIN, i64::MAX, Scalar::I64),
        DataType::Float32 => coerce_float(value, true),
        DataType::Float64 => coerce_float(value, false),
        DataType::Boolean => coerce_bool(value),
        DataType::Utf8 => coerce_text(value, field.max_len),
        DataType::Date => coerce_date(value),
        DataType::DateTime => coerce_datetime(value),
    }
}

/// What a sink stores for an explicit null.
///
/// Non-nullable columns fall back to their schema default (or the type's zero
/// value) and report `Invalid`.
pub fn coerce_null(field: &Field) -> (Scalar, ConversionStatus) {
    if field.nullable {
        return (Scalar::Null, ConversionStatus::Ok);
    }
    let stored = match &field.default {
        Some(default) => {
            let (v, _) = coerce(
                &Field {
                    nullable: true,
                    ..field.clone()
                },
                Scalar::Str(default.clone()),
            );
            if v.is_null() {
                Scalar::zero(field.data_type)
            } else {
                v
            }
        }
        None => Scalar::zero(field.data_type),
    };
    (stored, ConversionStatus::Invalid)
}

fn coerce_int(
    value: Scalar,
    min: i64,
    max: i64,
    make: impl Fn(i64) -> Scalar,
) -> (Scalar, ConversionStatus) {
    let clamp = |v: i128| -> (Scalar, ConversionStatus) {
        if v < min as i128 {
            (make(min), ConversionStatus::Saturated)
        } else if v > max as i128 {
            (make(max), ConversionStatus::Saturated)
        } else {
            (make(v as i64), ConversionStatus::Ok)
        }
    };
    let from_float = |f: f64| -> (Scalar, ConversionStatus) {
        if f.is_nan() {
            return (make(0), ConversionStatus::Invalid);
        }
        if f < min as f64 {
            return (make(min), ConversionStatus::Saturated);
        }
        // `i64::MAX as f64` rounds up to 2^63, so compare against the first
        // value past the bound, which is exact for both widths.
        if f >= (max as i128 + 1) as f64 {
            return (make(max), ConversionStatus::Saturated);
        }
        let whole = f.trunc();
        let status = if whole == f {
            ConversionStatus::Ok
        } else {
            ConversionStatus::Truncated
        };
        (make(whole as i64), status)
    };

    match value {
        Scalar::I32(v) => clamp(v as i128),
        Scalar::I64(v) => clamp(v as i128),
        Scalar::Bool(b) => clamp(b as i128),
        Scalar::F32(f) => from_float(f as f64),
        Scalar::F64(f) => from_float(f),
        Scalar::Str(s) => {
            let t = s.trim();
            if let Ok(v) = t.parse::<i128>() {
                clamp(v)
            } else if is_integer_literal(t) {
                // Too large even for i128; sign decides the bound.
                if t.starts_with('-') {
                    (make(min), ConversionStatus::Saturated)
                } else {
                    (make(max), ConversionStatus::Saturated)
                }
            } else if let Ok(f) = t.parse::<f64>() {
                from_float(f)
            } else {
                (make(0), ConversionStatus::Invalid)
            }
        }
        Scalar::Date(_) | Scalar::DateTime(_) | Scalar::Null => (make(0), ConversionStatus::Invalid),
    }
}

fn is_integer_literal(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn coerce_float(value: Scalar, single: bool) -> (Scalar, ConversionStatus) {
    let make = |f: f64| {
        if single {
            Scalar::F32(f as f32)
        } else {
            Scalar::F64(f)
        }
    };
    let parsed = match value {
        Scalar::I32(v) => Some(v as f64),
        Scalar::I64(v) => Some(v as f64),
        Scalar::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
        Scalar::F32(v) => Some(v as f64),
        Scalar::F64(v) => Some(v),
        Scalar::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        None => (make(0.0), ConversionStatus::Invalid),
        Some(f) if single && f.is_finite() && f.abs() > f32::MAX as f64 => {
            (make(f.signum() * f32::MAX as f64), ConversionStatus::Saturated)
        }
        Some(f) => (make(f), ConversionStatus::Ok),
    }
}

fn coerce_bool(value: Scalar) -> (Scalar, ConversionStatus) {
    match value {
        Scalar::Bool(b) => (Scalar::Bool(b), ConversionStatus::Ok),
        Scalar::I32(v) => (Scalar::Bool(v != 0), ConversionStatus::Ok),
        Scalar::I64(v) => (Scalar::Bool(v != 0), ConversionStatus::Ok),
        Scalar::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => (Scalar::Bool(true), ConversionStatus::Ok),
            "false" | "0" => (Scalar::Bool(false), ConversionStatus::Ok),
            _ => (Scalar::Bool(false), ConversionStatus::Invalid),
        },
        _ => (Scalar::Bool(false), ConversionStatus::Invalid),
    }
}

fn coerce_text(value: Scalar, max_len: Option<usize>) -> (Scalar, ConversionStatus) {
    let text = match value {
        Scalar::Str(s) => s,
        other => other.to_string(),
    };
    match max_len {
        Some(max) if text.chars().count() > max => (
            Scalar::Str(text.chars().take(max).collect()),
            ConversionStatus::Truncated,
        ),
        _ => (Scalar::Str(text), ConversionStatus::Ok),
    }
}

fn coerce_date(value: Scalar) -> (Scalar, ConversionStatus) {
    match value {
        Scalar::Date(d) => (Scalar::Date(d), ConversionStatus::Ok),
        Scalar::DateTime(dt) => {
            let status = if dt.time() == NaiveTime::MIN {
                ConversionStatus::Ok
            } else {
                ConversionStatus::Truncated
            };
            (Scalar::Date(dt.date()), status)
        }
        Scalar::Str(s) => {
            let t = s.trim();
            if let Some(d) = parse_date(t) {
                return (Scalar::Date(d), ConversionStatus::Ok);
            }
            match parse_datetime(t) {
                Some(dt) => coerce_date(Scalar::DateTime(dt)),
                None => (Scalar::zero(DataType::Date), ConversionStatus::Invalid),
            }
        }
        _ => (Scalar::zero(DataType::Date), ConversionStatus::Invalid),
    }
}

fn coerce_datetime(value: Scalar) -> (Scalar, ConversionStatus) {
    match value {
        Scalar::DateTime(dt) => (Scalar::DateTime(dt), ConversionStatus::Ok),
        Scalar::Date(d) => (
            Scalar::DateTime(d.and_time(NaiveTime::MIN)),
            ConversionStatus::Ok,
        ),
        Scalar::Str(s) => {
            let t = s.trim();
            if let Some(dt) = parse_datetime(t) {
                (Scalar::DateTime(dt), ConversionStatus::Ok)
            } else if let Some(d) = parse_date(t) {
                (
                    Scalar::DateTime(d.and_time(NaiveTime::MIN)),
                    ConversionStatus::Ok,
                )
            } else {
                (Scalar::zero(DataType::DateTime), ConversionStatus::Invalid)
            }
        }
        _ => (Scalar::zero(DataType::DateTime), ConversionStatus::Invalid),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}
