//! Resolved column mapping: how each target column gets its value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where a target column's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingEntry {
    /// Value of the source field at this index.
    SourceField(usize),
    /// The destination schema's own default.
    SchemaDefault,
    /// A default supplied by a mapping rule.
    LiteralDefault(String),
}

/// One entry per target column, indexed by target ordinal.
///
/// Built by the planner's resolver; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    entries: Vec<MappingEntry>,
    /// Per-target date format overrides (DATE/DATETIME targets only).
    date_formats: BTreeMap<usize, String>,
}

impl ColumnMapping {
    pub fn new(entries: Vec<MappingEntry>, date_formats: BTreeMap<usize, String>) -> Self {
        Self {
            entries,
            date_formats,
        }
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn entry(&self, target: usize) -> Option<&MappingEntry> {
        self.entries.get(target)
    }

    pub fn date_format(&self, target: usize) -> Option<&str> {
        self.date_formats.get(&target).map(String::as_str)
    }

    pub fn date_formats(&self) -> &BTreeMap<usize, String> {
        &self.date_formats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest source field index referenced, if any.
    pub fn max_source_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                MappingEntry::SourceField(i) => Some(*i),
                _ => None,
            })
            .max()
    }
}
