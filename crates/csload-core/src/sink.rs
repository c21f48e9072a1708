//! The destination store as seen by the loader.
//!
//! A `Catalog` describes tables and opens bulk loads; a `BulkSink` receives one
//! row at a time and is committed or rolled back exactly once per run. The
//! sink's own transactional guarantee is what makes a rolled back run leave
//! no partial rows behind.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::Schema;
use crate::types::{ConversionStatus, Scalar};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("table {database}.{table} not found")]
    TableNotFound { database: String, table: String },

    #[error("column {0} out of range")]
    ColumnOutOfRange(usize),

    #[error("bulk load already finished")]
    Finished,

    #[error("sink rejected row: {0}")]
    Rejected(String),

    #[error("sink I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink encoding: {0}")]
    Encoding(String),
}

/// Counters reported by a sink when a bulk load finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub execution_time: Duration,
    pub rows_inserted: u64,
    pub truncated: u64,
    pub saturated: u64,
    pub invalid: u64,
}

impl LoadSummary {
    /// Count one non-`Ok` conversion.
    pub fn record(&mut self, status: ConversionStatus) {
        match status {
            ConversionStatus::Ok => {}
            ConversionStatus::Saturated => self.saturated += 1,
            ConversionStatus::Invalid => self.invalid += 1,
            ConversionStatus::Truncated => self.truncated += 1,
        }
    }
}

pub trait BulkSink: Send {
    /// Stage a value for `col` in the current row, coercing it to the column type.
    fn set_value(&mut self, col: usize, value: Scalar) -> Result<ConversionStatus, SinkError>;

    /// Stage a NULL for `col` in the current row.
    fn set_null(&mut self, col: usize) -> Result<ConversionStatus, SinkError>;

    /// Append the staged row.
    fn write_row(&mut self) -> Result<(), SinkError>;

    /// Make all written rows visible. Called at most once.
    fn commit(&mut self) -> Result<LoadSummary, SinkError>;

    /// Discard all written rows. Called at most once.
    fn rollback(&mut self) -> Result<(), SinkError>;

    fn summary(&self) -> LoadSummary;
}

pub trait Catalog: Send + Sync {
    fn resolve_schema(&self, database: &str, table: &str) -> Result<Schema, SinkError>;

    fn begin_bulk_load(&self, database: &str, table: &str)
        -> Result<Box<dyn BulkSink>, SinkError>;
}
