#![forbid(unsafe_code)]
//! csload-io: everything between the input file and the destination store.
//!
//! - `ring`: single-producer/single-consumer bounded FIFO with an end-of-input signal
//! - `tokenizer`: byte-level delimited/quoted/escaped field state machine
//! - `buf`: block reader over the input and the first-record width probe
//! - `error_log`: shared append-only log for skipped records and conversion warnings
//! - `sinks`: `MemoryCatalog` (tests) and `FsCatalog` (table directories)

pub mod buf;
pub mod error;
pub mod error_log;
pub mod ring;
pub mod sinks;
pub mod tokenizer;

pub use buf::{probe_first_record, BlockReader, FirstRecord};
pub use error::{Error, Result};
pub use error_log::ErrorLog;
pub use ring::BoundedRingBuffer;
pub use tokenizer::{RecordSplitter, Token, Tokenizer};
