#![forbid(unsafe_code)]
//! csload-planner: from mapping rules to a resolved `ColumnMapping`.
//!
//! - `dsl`: YAML mapping file → ordered `MappingRule` records
//! - `rules`: the rule records the resolver consumes
//! - `resolve`: implicit/explicit resolution against the destination schema
//!
//! Resolution happens once, before the pipeline starts; every failure here is
//! a configuration error.

pub mod dsl;
pub mod error;
pub mod resolve;
pub mod rules;

pub use dsl::yaml::{load_mapping_file, parse_mapping_rules};
pub use error::{MappingError, Result};
pub use resolve::{MappingResolver, MappingWarning, ResolvedMapping};
pub use rules::{DefaultValue, MappingRule, SourceRef};
