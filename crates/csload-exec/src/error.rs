use thiserror::Error;

use csload_core::sink::SinkError;

use crate::pipeline::LoadReport;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Io(#[from] csload_io::Error),

    #[error(
        "record {record} has {found} fields, expected {expected} as in the first record; values: {values}"
    )]
    Malformed {
        record: u64,
        expected: usize,
        found: usize,
        values: String,
    },

    #[error("sink: {0}")]
    Sink(#[from] SinkError),

    #[error("{0} stage panicked")]
    StagePanicked(&'static str),
}

/// A run that ended in the `Failed` state.
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct LoadFailure {
    pub cause: PipelineError,
    /// The sink rolled back every row written during the run.
    pub rolled_back: bool,
    /// Counters up to the point of failure.
    pub report: LoadReport,
}
