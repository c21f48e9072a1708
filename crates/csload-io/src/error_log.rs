//! Append-only text log of skipped records and conversion warnings.
//!
//! One line per event: `kind, column_or_field_index, comma_joined_raw_values`.
//! The validator and sink-writer stages both append, so every append takes
//! the one mutex around the writer.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

pub const ERROR_LOG_HEADER: &str = "error_type, column_nr, parsed_raw_row_values";

pub struct ErrorLog {
    writer: Mutex<Box<dyn Write + Send>>,
    path: Option<PathBuf>,
    entries: AtomicU64,
}

impl ErrorLog {
    /// `<input>.<epoch-millis>.err` next to the input file.
    pub fn create_for_input(input: &Path) -> Result<Self> {
        let mut name = input.as_os_str().to_owned();
        name.push(format!(".{}.err", now_millis()));
        Self::create_at(PathBuf::from(name))
    }

    pub fn create_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| {
            Error::ErrorLog(format!("can't write to error file {}: {e}", path.display()))
        })?;
        let mut log = Self::to_writer(BufWriter::new(file))?;
        log.path = Some(path);
        Ok(log)
    }

    /// Log into an arbitrary writer; the header line is written immediately.
    pub fn to_writer(writer: impl Write + Send + 'static) -> Result<Self> {
        let mut writer: Box<dyn Write + Send> = Box::new(writer);
        writeln!(writer, "{ERROR_LOG_HEADER}")
            .map_err(|e| Error::ErrorLog(format!("write header: {e}")))?;
        Ok(Self {
            writer: Mutex::new(writer),
            path: None,
            entries: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Events appended so far.
    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }

    pub fn append(&self, kind: &str, column: impl Display, raw: &[String]) -> Result<()> {
        let line = format!("{kind}, {column}, {}", raw.join(","));
        let mut w = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(w, "{line}").map_err(|e| Error::ErrorLog(format!("append: {e}")))?;
        self.entries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let mut w = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        w.flush().map_err(|e| Error::ErrorLog(format!("flush: {e}")))
    }
}

impl Drop for ErrorLog {
    fn drop(&mut self) {
        let w = self.writer.get_mut().unwrap_or_else(PoisonError::into_inner);
        let _ = w.flush();
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
