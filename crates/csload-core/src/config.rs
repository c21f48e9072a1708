//! Load configuration that the CLI and tests build and the pipeline consumes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Field separator, quote (enclose-by), and escape characters.
///
/// All three are single ASCII bytes. Quote and escape may be the same byte
/// (the classic doubled-quote convention); the delimiter must differ from both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub escape: u8,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            escape: b'"',
        }
    }
}

impl Dialect {
    /// Build a dialect from user-supplied strings, each exactly one ASCII character.
    pub fn from_strs(delimiter: &str, quote: &str, escape: &str) -> Result<Self> {
        let d = Self {
            delimiter: single_ascii("delimiter", delimiter)?,
            quote: single_ascii("enclose-by character", quote)?,
            escape: single_ascii("escape character", escape)?,
        };
        d.validate()?;
        Ok(d)
    }

    pub fn validate(&self) -> Result<()> {
        if self.delimiter == self.quote || self.delimiter == self.escape {
            return Err(Error::Config(format!(
                "delimiter must differ from the enclose-by and escape characters \
                 (delimiter: {:?}, enclose-by: {:?}, escape: {:?})",
                self.delimiter as char, self.quote as char, self.escape as char
            )));
        }
        for (what, b) in [
            ("delimiter", self.delimiter),
            ("enclose-by character", self.quote),
            ("escape character", self.escape),
        ] {
            if b == b'\n' || !b.is_ascii() {
                return Err(Error::Config(format!(
                    "{what} must be a single ASCII character other than newline"
                )));
            }
        }
        Ok(())
    }
}

pub fn single_ascii(what: &str, s: &str) -> Result<u8> {
    match s.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(Error::Config(format!(
            "{what} needs to be one ASCII character, got {:?} (length {})",
            s,
            s.chars().count()
        ))),
    }
}

/// What to do with a record whose field count differs from the first record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Abort the run and roll back.
    #[default]
    Strict,
    /// Count the record, optionally log it, and continue.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub dialect: Dialect,

    /// Pipeline-wide input format for DATE/DATETIME targets (strftime syntax).
    pub date_format: Option<String>,

    /// Field text that is loaded as NULL in addition to the empty string.
    pub null_token: Option<String>,

    pub malformed: MalformedPolicy,

    /// First record is a header and is not loaded.
    pub has_header: bool,

    /// Write conversion warnings and skipped records to an error log.
    pub error_log: bool,

    /// Target columns left unmapped fall back to the schema default instead of
    /// failing resolution.
    pub default_unmapped: bool,

    /// Bytes read from the source per block.
    pub read_block_size: usize,

    /// Slots in the reader → tokenizer buffer (each slot holds one block).
    pub byte_buffer_capacity: usize,

    /// Slots in the tokenizer → sink-writer buffer (each slot holds one row).
    pub row_buffer_capacity: usize,

    /// Pause after a blocked buffer wakes up, in microseconds. Zero disables it.
    pub wait_grace_us: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            date_format: None,
            null_token: None,
            malformed: MalformedPolicy::Strict,
            has_header: false,
            error_log: false,
            default_unmapped: false,
            read_block_size: 64 * 1024,
            byte_buffer_capacity: 64,
            row_buffer_capacity: 1024,
            wait_grace_us: 0,
        }
    }
}

impl LoadConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `CSLOAD_DELIMITER`, `CSLOAD_ENCLOSE_BY`, `CSLOAD_ESCAPE`: dialect characters
    /// - `CSLOAD_DATE_FORMAT`: pipeline-wide date format
    /// - `CSLOAD_NULL_TOKEN`: additional NULL marker
    /// - `CSLOAD_READ_BLOCK_SIZE`: read block size in bytes
    /// - `CSLOAD_BYTE_BUFFER_CAPACITY`: reader buffer slots
    /// - `CSLOAD_ROW_BUFFER_CAPACITY`: row buffer slots
    /// - `CSLOAD_WAIT_GRACE_US`: grace pause after a buffer wake-up
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("CSLOAD_DELIMITER") {
            if let Ok(b) = single_ascii("delimiter", &s) {
                cfg.dialect.delimiter = b;
            }
        }

        if let Ok(s) = std::env::var("CSLOAD_ENCLOSE_BY") {
            if let Ok(b) = single_ascii("enclose-by character", &s) {
                cfg.dialect.quote = b;
            }
        }

        if let Ok(s) = std::env::var("CSLOAD_ESCAPE") {
            if let Ok(b) = single_ascii("escape character", &s) {
                cfg.dialect.escape = b;
            }
        }

        if let Ok(s) = std::env::var("CSLOAD_DATE_FORMAT") {
            cfg.date_format = Some(s);
        }

        if let Ok(s) = std::env::var("CSLOAD_NULL_TOKEN") {
            cfg.null_token = Some(s);
        }

        if let Ok(s) = std::env::var("CSLOAD_READ_BLOCK_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.read_block_size = v;
            }
        }

        if let Ok(s) = std::env::var("CSLOAD_BYTE_BUFFER_CAPACITY") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.byte_buffer_capacity = v;
            }
        }

        if let Ok(s) = std::env::var("CSLOAD_ROW_BUFFER_CAPACITY") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.row_buffer_capacity = v;
            }
        }

        if let Ok(s) = std::env::var("CSLOAD_WAIT_GRACE_US") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.wait_grace_us = v;
            }
        }

        cfg
    }

    pub fn wait_grace(&self) -> Duration {
        Duration::from_micros(self.wait_grace_us)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.dialect.validate()?;
        if self.read_block_size == 0 {
            return Err(Error::Config("read block size must be positive".into()));
        }
        // A ring of N slots holds N-1 items.
        if self.byte_buffer_capacity < 2 || self.row_buffer_capacity < 2 {
            return Err(Error::Config(
                "buffer capacities must be at least 2 slots".into(),
            ));
        }
        if let Some(fmt) = &self.date_format {
            if fmt.is_empty() {
                return Err(Error::Config("date format must not be empty".into()));
            }
        }
        Ok(())
    }
}
