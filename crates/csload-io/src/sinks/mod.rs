//! `Catalog`/`BulkSink` implementations.
//!
//! - `memory`: in-process tables for tests, with failure injection.
//! - `fs`: table directories holding a JSON schema and JSON-lines data.
//!
//! Both stage rows through [`StagedRow`], which applies the shared coercion
//! rules and keeps the conversion counters.

mod fs;
mod memory;

pub use fs::{FsBulkSink, FsCatalog};
pub use memory::{MemoryBulkSink, MemoryCatalog};

use std::time::Instant;

use csload_core::schema::Schema;
use csload_core::sink::{LoadSummary, SinkError};
use csload_core::types::{coerce, coerce_null, ConversionStatus, Scalar};

/// The row under construction plus the load's running summary.
pub(crate) struct StagedRow {
    schema: Schema,
    values: Vec<Option<Scalar>>,
    summary: LoadSummary,
    started: Instant,
    finished: bool,
}

impl StagedRow {
    pub(crate) fn new(schema: Schema) -> Self {
        let width = schema.len();
        Self {
            schema,
            values: vec![None; width],
            summary: LoadSummary::default(),
            started: Instant::now(),
            finished: false,
        }
    }

    pub(crate) fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn ensure_open(&self) -> Result<(), SinkError> {
        if self.finished {
            Err(SinkError::Finished)
        } else {
            Ok(())
        }
    }

    pub(crate) fn set(&mut self, col: usize, value: Scalar) -> Result<ConversionStatus, SinkError> {
        self.ensure_open()?;
        let field = self
            .schema
            .field(col)
            .ok_or(SinkError::ColumnOutOfRange(col))?;
        let (stored, status) = coerce(field, value);
        self.values[col] = Some(stored);
        self.summary.record(status);
        Ok(status)
    }

    pub(crate) fn set_null(&mut self, col: usize) -> Result<ConversionStatus, SinkError> {
        self.set(col, Scalar::Null)
    }

    /// Complete the row; columns never set are treated as NULL.
    pub(crate) fn take_row(&mut self) -> Result<Vec<Scalar>, SinkError> {
        self.ensure_open()?;
        let mut row = Vec::with_capacity(self.values.len());
        for (col, slot) in self.values.iter_mut().enumerate() {
            let value = match slot.take() {
                Some(v) => v,
                None => {
                    let (v, status) = coerce_null(&self.schema.fields[col]);
                    self.summary.record(status);
                    v
                }
            };
            row.push(value);
        }
        self.summary.rows_inserted += 1;
        Ok(row)
    }

    /// Mark finished and return the summary with the elapsed time.
    pub(crate) fn finish(&mut self, committed: bool) -> LoadSummary {
        self.finished = true;
        self.summary.execution_time = self.started.elapsed();
        if !committed {
            self.summary.rows_inserted = 0;
        }
        self.summary.clone()
    }

    pub(crate) fn summary(&self) -> LoadSummary {
        let mut s = self.summary.clone();
        if !self.finished {
            s.execution_time = self.started.elapsed();
        }
        s
    }
}
