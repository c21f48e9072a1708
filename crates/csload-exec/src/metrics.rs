//! Stage counters.
//!
//! Each stage owns its own counters and hands them back when it is joined;
//! nothing here is shared between threads.

use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub blocks: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorStats {
    /// Records tokenized, including a header and malformed records.
    pub records: u64,
    pub malformed_skipped: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub rows_written: u64,
    /// Non-`Ok` conversion statuses seen by the row writer.
    pub conversion_warnings: u64,
}

pub fn emit_stage_done(stage: &str, key_values: &[(&str, u64)]) {
    let fields = key_values
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");
    debug!(stage, "stage finished: {fields}");
}
