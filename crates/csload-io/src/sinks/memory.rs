//! In-memory catalog for tests.
//!
//! Tables live behind one shared mutex so tests can inspect committed rows
//! after a run. Written rows stay private to the bulk load until commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use csload_core::schema::Schema;
use csload_core::sink::{BulkSink, Catalog, LoadSummary, SinkError};
use csload_core::types::{ConversionStatus, Scalar};

use super::StagedRow;

type TableKey = (String, String);

#[derive(Default)]
struct MemoryTable {
    schema: Schema,
    rows: Vec<Vec<Scalar>>,
    commits: u64,
    rollbacks: u64,
    /// Fail the Nth `write_row` (1-based) of every bulk load.
    fail_on_row: Option<u64>,
}

/// Thread-safe in-memory catalog.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    tables: Arc<Mutex<HashMap<TableKey, MemoryTable>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, database: &str, table: &str, schema: Schema) {
        self.lock().insert(
            key(database, table),
            MemoryTable {
                schema,
                ..Default::default()
            },
        );
    }

    /// Committed rows of a table (empty if unknown).
    pub fn rows(&self, database: &str, table: &str) -> Vec<Vec<Scalar>> {
        self.lock()
            .get(&key(database, table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn commits(&self, database: &str, table: &str) -> u64 {
        self.lock()
            .get(&key(database, table))
            .map(|t| t.commits)
            .unwrap_or(0)
    }

    pub fn rollbacks(&self, database: &str, table: &str) -> u64 {
        self.lock()
            .get(&key(database, table))
            .map(|t| t.rollbacks)
            .unwrap_or(0)
    }

    /// Make the `n`th `write_row` (1-based) of later bulk loads fail.
    pub fn fail_on_row(&self, database: &str, table: &str, n: u64) {
        if let Some(t) = self.lock().get_mut(&key(database, table)) {
            t.fail_on_row = Some(n);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TableKey, MemoryTable>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Catalog for MemoryCatalog {
    fn resolve_schema(&self, database: &str, table: &str) -> Result<Schema, SinkError> {
        self.lock()
            .get(&key(database, table))
            .map(|t| t.schema.clone())
            .ok_or_else(|| not_found(database, table))
    }

    fn begin_bulk_load(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Box<dyn BulkSink>, SinkError> {
        let (schema, fail_on_row) = {
            let tables = self.lock();
            let t = tables
                .get(&key(database, table))
                .ok_or_else(|| not_found(database, table))?;
            (t.schema.clone(), t.fail_on_row)
        };
        Ok(Box::new(MemoryBulkSink {
            catalog: self.clone(),
            key: key(database, table),
            staged: StagedRow::new(schema),
            pending: Vec::new(),
            fail_on_row,
            written: 0,
        }))
    }
}

pub struct MemoryBulkSink {
    catalog: MemoryCatalog,
    key: TableKey,
    staged: StagedRow,
    pending: Vec<Vec<Scalar>>,
    fail_on_row: Option<u64>,
    written: u64,
}

impl BulkSink for MemoryBulkSink {
    fn set_value(&mut self, col: usize, value: Scalar) -> Result<ConversionStatus, SinkError> {
        self.staged.set(col, value)
    }

    fn set_null(&mut self, col: usize) -> Result<ConversionStatus, SinkError> {
        self.staged.set_null(col)
    }

    fn write_row(&mut self) -> Result<(), SinkError> {
        self.written += 1;
        if self.fail_on_row == Some(self.written) {
            return Err(SinkError::Rejected(format!(
                "injected failure on row {}",
                self.written
            )));
        }
        let row = self.staged.take_row()?;
        self.pending.push(row);
        Ok(())
    }

    fn commit(&mut self) -> Result<LoadSummary, SinkError> {
        self.staged.ensure_open()?;
        let mut tables = self.catalog.lock();
        let t = tables
            .get_mut(&self.key)
            .ok_or_else(|| not_found(&self.key.0, &self.key.1))?;
        t.rows.append(&mut self.pending);
        t.commits += 1;
        Ok(self.staged.finish(true))
    }

    fn rollback(&mut self) -> Result<(), SinkError> {
        self.staged.ensure_open()?;
        self.pending.clear();
        self.staged.finish(false);
        if let Some(t) = self.catalog.lock().get_mut(&self.key) {
            t.rollbacks += 1;
        }
        Ok(())
    }

    fn summary(&self) -> LoadSummary {
        self.staged.summary()
    }
}

fn key(database: &str, table: &str) -> TableKey {
    (database.to_string(), table.to_string())
}

fn not_found(database: &str, table: &str) -> SinkError {
    SinkError::TableNotFound {
        database: database.to_string(),
        table: table.to_string(),
    }
}
