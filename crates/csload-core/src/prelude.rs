//! Convenient re-exports for downstream crates.

pub use crate::config::{Dialect, LoadConfig, MalformedPolicy};
pub use crate::error::{Error, Result};
pub use crate::mapping::{ColumnMapping, MappingEntry};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::sink::{BulkSink, Catalog, LoadSummary, SinkError};
pub use crate::types::{ConversionStatus, Scalar};
