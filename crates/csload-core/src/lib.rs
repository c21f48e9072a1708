#![forbid(unsafe_code)]
//! csload-core: pure data shared by every other crate.
//!
//! - `schema`: destination table description (types, nullability, defaults)
//! - `types`: `Scalar` values, `ConversionStatus`, and the shared coercion rules
//! - `mapping`: the resolved `ColumnMapping` table
//! - `config`: `LoadConfig` and the tokenizer `Dialect`
//! - `sink`: the `Catalog`/`BulkSink` collaborator contract
//!
//! No threads and no file IO live here.

pub mod config;
pub mod error;
pub mod mapping;
pub mod prelude;
pub mod schema;
pub mod sink;
pub mod types;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
