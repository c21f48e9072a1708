#![forbid(unsafe_code)]
//! csload: streaming bulk loader for delimited text.
//!
//! Facade over the workspace crates; the integration tests and benchmarks
//! in this package exercise them together.

pub use csload_core::prelude::*;
pub use csload_exec::{IngestionPipeline, LoadFailure, LoadReport, PipelineError, RowWriter};
pub use csload_io::sinks::{FsCatalog, MemoryCatalog};
pub use csload_io::{probe_first_record, BoundedRingBuffer, ErrorLog, RecordSplitter};
pub use csload_planner::{
    load_mapping_file, parse_mapping_rules, MappingResolver, MappingRule, ResolvedMapping,
};
