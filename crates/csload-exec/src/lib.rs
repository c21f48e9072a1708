#![forbid(unsafe_code)]
//! csload-exec: runs one load.
//!
//! - `pipeline`: reader → tokenizer/validator → sink-writer on scoped threads,
//!   wired through two `BoundedRingBuffer`s and one shared `failed` flag
//! - `writer`: turns one parsed record into sink calls via the `ColumnMapping`
//! - `metrics`: per-stage counters, logged at debug level when a stage ends

pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod writer;

pub use error::{LoadFailure, PipelineError};
pub use pipeline::{IngestionPipeline, LoadReport};
pub use writer::RowWriter;
