//! Table directories on the local filesystem.
//!
//! Layout under the catalog root:
//! - `<database>/<table>.schema.json`: the serialized `Schema`
//! - `<database>/<table>.jsonl`: committed rows, one JSON object per line
//! - `<database>/.<table>.<uuid>.staging`: rows of an open bulk load
//!
//! Commit appends the staging file to the table file and removes it; rollback
//! only removes it. A commit that fails partway cuts the table file back to
//! its previous length and can still be rolled back.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use csload_core::schema::Schema;
use csload_core::sink::{BulkSink, Catalog, LoadSummary, SinkError};
use csload_core::types::{ConversionStatus, Scalar};

use super::StagedRow;

#[derive(Debug, Clone)]
pub struct FsCatalog {
    root: PathBuf,
}

impl FsCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn schema_path(&self, database: &str, table: &str) -> PathBuf {
        self.root.join(database).join(format!("{table}.schema.json"))
    }

    pub fn data_path(&self, database: &str, table: &str) -> PathBuf {
        self.root.join(database).join(format!("{table}.jsonl"))
    }

    /// Write (or replace) a table's schema file.
    pub fn create_table(&self, database: &str, table: &str, schema: &Schema) -> io::Result<()> {
        let path = self.schema_path(database, table);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(schema)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }
}

impl Catalog for FsCatalog {
    fn resolve_schema(&self, database: &str, table: &str) -> Result<Schema, SinkError> {
        let path = self.schema_path(database, table);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SinkError::TableNotFound {
                    database: database.to_string(),
                    table: table.to_string(),
                })
            }
            Err(e) => return Err(SinkError::Io(e)),
        };
        serde_json::from_str(&text)
            .map_err(|e| SinkError::Encoding(format!("{}: {e}", path.display())))
    }

    fn begin_bulk_load(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Box<dyn BulkSink>, SinkError> {
        let schema = self.resolve_schema(database, table)?;
        let dir = self.root.join(database);
        let staging_path = dir.join(format!(".{table}.{}.staging", Uuid::new_v4()));
        let file = File::create(&staging_path)?;
        debug!(staging = %staging_path.display(), "bulk load started");
        Ok(Box::new(FsBulkSink {
            data_path: self.data_path(database, table),
            staging_path,
            writer: Some(BufWriter::new(file)),
            staged: StagedRow::new(schema),
            committed: false,
        }))
    }
}

pub struct FsBulkSink {
    data_path: PathBuf,
    staging_path: PathBuf,
    writer: Option<BufWriter<File>>,
    staged: StagedRow,
    committed: bool,
}

impl FsBulkSink {
    fn writer(&mut self) -> Result<&mut BufWriter<File>, SinkError> {
        self.writer.as_mut().ok_or(SinkError::Finished)
    }

    /// Append the staging file to the table file, all or nothing.
    fn append_staged(&self) -> Result<(), SinkError> {
        let mut staged = File::open(&self.staging_path)?;
        let mut data = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.data_path)?;
        let before = data.metadata()?.len();
        let appended = io::copy(&mut staged, &mut data).and_then(|_| data.sync_all());
        if let Err(e) = appended {
            if let Err(t) = data.set_len(before).and_then(|()| data.sync_all()) {
                warn!(data = %self.data_path.display(), "could not cut back table file: {t}");
            }
            return Err(SinkError::Io(e));
        }
        Ok(())
    }
}

impl BulkSink for FsBulkSink {
    fn set_value(&mut self, col: usize, value: Scalar) -> Result<ConversionStatus, SinkError> {
        self.staged.set(col, value)
    }

    fn set_null(&mut self, col: usize) -> Result<ConversionStatus, SinkError> {
        self.staged.set_null(col)
    }

    fn write_row(&mut self) -> Result<(), SinkError> {
        let row = self.staged.take_row()?;
        let mut obj = BTreeMap::new();
        for (field, value) in self.staged.schema().fields.iter().zip(&row) {
            obj.insert(field.name.clone(), scalar_to_json(value));
        }
        let line = serde_json::to_string(&obj).map_err(|e| SinkError::Encoding(e.to_string()))?;
        writeln!(self.writer()?, "{line}")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<LoadSummary, SinkError> {
        let mut writer = self.writer.take().ok_or(SinkError::Finished)?;
        writer.flush()?;
        drop(writer);

        self.append_staged()?;
        self.committed = true;
        if let Err(e) = fs::remove_file(&self.staging_path) {
            warn!(staging = %self.staging_path.display(), "could not remove staging file: {e}");
        }
        let summary = self.staged.finish(true);
        debug!(
            rows = summary.rows_inserted,
            data = %self.data_path.display(),
            "bulk load committed"
        );
        Ok(summary)
    }

    fn rollback(&mut self) -> Result<(), SinkError> {
        if self.committed {
            return Err(SinkError::Finished);
        }
        // Also reached after a failed commit, which already closed the writer.
        self.writer = None;
        self.staged.finish(false);
        debug!(staging = %self.staging_path.display(), "bulk load rolled back");
        match fs::remove_file(&self.staging_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SinkError::Io(e)),
        }
    }

    fn summary(&self) -> LoadSummary {
        self.staged.summary()
    }
}

fn scalar_to_json(v: &Scalar) -> serde_json::Value {
    use Scalar::*;
    match v {
        Null => serde_json::Value::Null,
        Bool(b) => serde_json::Value::Bool(*b),
        I32(i) => serde_json::Value::from(*i),
        I64(i) => serde_json::Value::from(*i),
        F32(f) => serde_json::Value::from(*f as f64),
        F64(f) => serde_json::Value::from(*f),
        Str(s) => serde_json::Value::String(s.clone()),
        Date(_) | DateTime(_) => serde_json::Value::String(v.to_string()),
    }
}
