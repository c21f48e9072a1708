//! Load-time resolution of mapping rules into a `ColumnMapping`.
//!
//! Implicit mode maps target `i` to source field `i`. Explicit mode applies
//! rules in order: later bindings of the same target overwrite earlier ones,
//! and unusable rules are skipped. Both are reported as `MappingWarning`s and
//! never fail resolution. Only a target left without any binding (with
//! defaulting disabled) is fatal.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{info, warn};

use csload_core::mapping::{ColumnMapping, MappingEntry};
use csload_core::schema::Schema;

use crate::error::{MappingError, Result};
use crate::rules::{DefaultValue, MappingRule, SourceRef};

/// A rule that was ignored or overridden.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingWarning {
    #[error("source column {index} is out of bounds (source has {width} fields); mapping ignored")]
    SourceOutOfBounds { index: usize, width: usize },

    #[error("source column {0} is not a header name; mapping ignored")]
    UnknownSourceName(String),

    #[error("no target column specified for source column {index}; mapping ignored")]
    MissingTarget { index: usize },

    #[error("target column {target:?} could not be found; mapping ignored")]
    UnknownTarget { target: String },

    #[error("no default value specified for target column {target:?}; definition ignored")]
    MissingDefaultValue { target: String },

    #[error("existing mapping {previous:?} for target column {target} is overwritten")]
    Overwritten {
        target: usize,
        previous: MappingEntry,
    },

    #[error("format for target column {target} ignored: column is not DATE or DATETIME")]
    FormatIgnored { target: usize },

    #[error("rule `{0}` is not supported and will be ignored")]
    Unsupported(String),
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMapping {
    pub mapping: ColumnMapping,
    pub warnings: Vec<MappingWarning>,
    /// Informational messages (defaults applied, unused source fields).
    pub notices: Vec<String>,
}

pub struct MappingResolver<'a> {
    schema: &'a Schema,
    source_width: usize,
    header: Option<&'a [String]>,
    default_unmapped: bool,
}

impl<'a> MappingResolver<'a> {
    pub fn new(schema: &'a Schema, source_width: usize) -> Self {
        Self {
            schema,
            source_width,
            header: None,
            default_unmapped: false,
        }
    }

    /// Header names, so column rules may name source fields.
    pub fn with_header(mut self, names: &'a [String]) -> Self {
        self.header = Some(names);
        self
    }

    /// Bind targets no rule covers to `SchemaDefault` instead of failing.
    pub fn default_unmapped(mut self, enabled: bool) -> Self {
        self.default_unmapped = enabled;
        self
    }

    /// Target ordinal first, column name second.
    pub fn resolve_target(&self, ident: &str) -> Option<usize> {
        if let Ok(i) = ident.trim().parse::<usize>() {
            if i < self.schema.len() {
                return Some(i);
            }
        }
        self.schema.index_of(ident)
    }

    /// Target `i` ← source field `i`.
    pub fn implicit(&self) -> Result<ResolvedMapping> {
        let targets = self.schema.len();
        let mut notices = Vec::new();

        if self.source_width < targets && !self.default_unmapped {
            return Err(MappingError::InsufficientSource {
                source_width: self.source_width,
                target_width: targets,
            });
        }
        if self.source_width > targets {
            notices.push(format!(
                "source has {} fields, target table has {} columns; remaining source fields are unused",
                self.source_width, targets
            ));
        }

        let entries = (0..targets)
            .map(|i| {
                if i < self.source_width {
                    MappingEntry::SourceField(i)
                } else {
                    notices.push(self.default_notice(i));
                    MappingEntry::SchemaDefault
                }
            })
            .collect();

        for n in &notices {
            info!("{n}");
        }
        Ok(ResolvedMapping {
            mapping: ColumnMapping::new(entries, BTreeMap::new()),
            warnings: Vec::new(),
            notices,
        })
    }

    /// Apply `rules` in order.
    pub fn explicit(&self, rules: &[MappingRule]) -> Result<ResolvedMapping> {
        let mut state = ExplicitState::default();

        for rule in rules {
            match rule {
                MappingRule::Column {
                    source,
                    target,
                    format,
                } => self.apply_column(&mut state, source, target.as_deref(), format.as_deref()),
                MappingRule::TargetDefault { target, value } => {
                    self.apply_default(&mut state, target, value.as_ref())
                }
                MappingRule::Unsupported(text) => {
                    state.warn(MappingWarning::Unsupported(text.clone()))
                }
            }
        }

        let mut entries = Vec::with_capacity(self.schema.len());
        let mut notices = Vec::new();
        for (col, field) in self.schema.fields.iter().enumerate() {
            match state.bound.remove(&col) {
                Some(entry) => entries.push(entry),
                None if self.default_unmapped => {
                    let n = self.default_notice(col);
                    info!("{n}");
                    notices.push(n);
                    entries.push(MappingEntry::SchemaDefault);
                }
                None => {
                    return Err(MappingError::Unmapped {
                        column: col,
                        name: field.name.clone(),
                    })
                }
            }
        }

        Ok(ResolvedMapping {
            mapping: ColumnMapping::new(entries, state.formats),
            warnings: state.warnings,
            notices,
        })
    }

    fn apply_column(
        &self,
        state: &mut ExplicitState,
        source: &SourceRef,
        target: Option<&str>,
        format: Option<&str>,
    ) {
        let index = match source {
            SourceRef::Skip => {
                state.next_source += 1;
                return;
            }
            SourceRef::Next => {
                let i = state.next_source;
                state.next_source += 1;
                i
            }
            SourceRef::Index(i) => *i,
            SourceRef::Name(name) => {
                match self
                    .header
                    .and_then(|h| h.iter().position(|n| n == name))
                {
                    Some(i) => i,
                    None => {
                        state.warn(MappingWarning::UnknownSourceName(name.clone()));
                        return;
                    }
                }
            }
        };

        if index >= self.source_width {
            state.warn(MappingWarning::SourceOutOfBounds {
                index,
                width: self.source_width,
            });
            return;
        }
        let Some(target) = target else {
            state.warn(MappingWarning::MissingTarget { index });
            return;
        };
        let Some(col) = self.resolve_target(target) else {
            state.warn(MappingWarning::UnknownTarget {
                target: target.to_string(),
            });
            return;
        };

        state.bind(col, MappingEntry::SourceField(index));

        // A rebinding drops whatever override the earlier rule carried.
        state.formats.remove(&col);
        if let Some(fmt) = format {
            let temporal = self
                .schema
                .field(col)
                .map(|f| f.data_type.is_temporal())
                .unwrap_or(false);
            if temporal {
                state.formats.insert(col, fmt.to_string());
            } else {
                state.warn(MappingWarning::FormatIgnored { target: col });
            }
        }
    }

    fn apply_default(&self, state: &mut ExplicitState, target: &str, value: Option<&DefaultValue>) {
        let Some(col) = self.resolve_target(target) else {
            state.warn(MappingWarning::UnknownTarget {
                target: target.to_string(),
            });
            return;
        };
        let Some(value) = value else {
            state.warn(MappingWarning::MissingDefaultValue {
                target: target.to_string(),
            });
            return;
        };
        let entry = match value {
            DefaultValue::Schema => MappingEntry::SchemaDefault,
            DefaultValue::Literal(v) => MappingEntry::LiteralDefault(v.clone()),
        };
        state.bind(col, entry);
    }

    fn default_notice(&self, col: usize) -> String {
        let name = self
            .schema
            .field(col)
            .map(|f| f.name.as_str())
            .unwrap_or("?");
        format!("using default value for target column {col}: {name}")
    }
}

#[derive(Default)]
struct ExplicitState {
    bound: BTreeMap<usize, MappingEntry>,
    formats: BTreeMap<usize, String>,
    next_source: usize,
    warnings: Vec<MappingWarning>,
}

impl ExplicitState {
    fn bind(&mut self, col: usize, entry: MappingEntry) {
        if let Some(previous) = self.bound.insert(col, entry) {
            self.warn(MappingWarning::Overwritten {
                target: col,
                previous,
            });
        }
    }

    fn warn(&mut self, w: MappingWarning) {
        warn!("{w}");
        self.warnings.push(w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csload_core::schema::{DataType, Field};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("born", DataType::Date, true),
        ])
    }

    #[test]
    fn implicit_maps_identity_and_ignores_extra_source_fields() {
        let s = schema();
        let r = MappingResolver::new(&s, 4).implicit().unwrap();
        assert_eq!(
            r.mapping.entries(),
            &[
                MappingEntry::SourceField(0),
                MappingEntry::SourceField(1),
                MappingEntry::SourceField(2)
            ]
        );
        assert_eq!(r.notices.len(), 1);
    }

    #[test]
    fn implicit_defaults_trailing_targets_when_enabled() {
        let s = schema();
        let r = MappingResolver::new(&s, 2)
            .default_unmapped(true)
            .implicit()
            .unwrap();
        assert_eq!(r.mapping.entry(2), Some(&MappingEntry::SchemaDefault));
        assert!(r.notices[0].contains("born"));
    }

    #[test]
    fn ordinal_is_tried_before_name() {
        let s = Schema::new(vec![
            Field::new("1", DataType::Utf8, true),
            Field::new("x", DataType::Utf8, true),
        ]);
        let res = MappingResolver::new(&s, 2);
        assert_eq!(res.resolve_target("1"), Some(1));
        assert_eq!(res.resolve_target("x"), Some(1));
        assert_eq!(res.resolve_target("7"), None);
    }

    #[test]
    fn implicit_counter_and_skip() {
        let s = schema();
        let rules = vec![
            MappingRule::column(SourceRef::Next, "id"),
            MappingRule::Column {
                source: SourceRef::Skip,
                target: None,
                format: None,
            },
            MappingRule::column(SourceRef::Next, "name"),
            MappingRule::column(SourceRef::Index(0), "born"),
        ];
        let r = MappingResolver::new(&s, 3).explicit(&rules).unwrap();
        assert_eq!(
            r.mapping.entries(),
            &[
                MappingEntry::SourceField(0),
                MappingEntry::SourceField(2),
                MappingEntry::SourceField(0)
            ]
        );
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn bad_column_rules_are_ignored_with_warnings() {
        let s = schema();
        let rules = vec![
            MappingRule::column(SourceRef::Index(9), "id"),
            MappingRule::Column {
                source: SourceRef::Index(0),
                target: None,
                format: None,
            },
            MappingRule::column(SourceRef::Index(0), "nope"),
            MappingRule::column(SourceRef::Name("id".into()), "id"),
            MappingRule::Unsupported("{}".into()),
        ];
        let r = MappingResolver::new(&s, 3)
            .default_unmapped(true)
            .explicit(&rules)
            .unwrap();
        assert_eq!(r.warnings.len(), 5);
        assert!(r
            .mapping
            .entries()
            .iter()
            .all(|e| *e == MappingEntry::SchemaDefault));
    }

    #[test]
    fn header_names_resolve_sources() {
        let s = schema();
        let header = vec!["born".to_string(), "ident".to_string(), "who".to_string()];
        let rules = vec![
            MappingRule::column(SourceRef::Name("ident".into()), "id"),
            MappingRule::column(SourceRef::Name("who".into()), "name"),
            MappingRule::column(SourceRef::Name("born".into()), "born"),
        ];
        let r = MappingResolver::new(&s, 3)
            .with_header(&header)
            .explicit(&rules)
            .unwrap();
        assert_eq!(r.mapping.entry(0), Some(&MappingEntry::SourceField(1)));
        assert_eq!(r.mapping.entry(2), Some(&MappingEntry::SourceField(0)));
    }

    #[test]
    fn format_applies_to_temporal_targets_only_and_is_replaced() {
        let s = schema();
        let rules = vec![
            MappingRule::column(SourceRef::Index(2), "born").with_format("%d/%m/%Y"),
            MappingRule::column(SourceRef::Index(2), "born").with_format("%Y%m%d"),
            MappingRule::column(SourceRef::Index(0), "id").with_format("%Y"),
            MappingRule::column(SourceRef::Index(1), "name"),
        ];
        let r = MappingResolver::new(&s, 3).explicit(&rules).unwrap();
        assert_eq!(r.mapping.date_format(2), Some("%Y%m%d"));
        assert_eq!(r.mapping.date_format(0), None);
        assert!(r
            .warnings
            .contains(&MappingWarning::FormatIgnored { target: 0 }));
    }

    #[test]
    fn default_rules() {
        let s = schema();
        let rules = vec![
            MappingRule::column(SourceRef::Index(0), "id"),
            MappingRule::target_default("name", "default"),
            MappingRule::target_default("born", "2000-01-01"),
            MappingRule::TargetDefault {
                target: "id".into(),
                value: None,
            },
        ];
        let r = MappingResolver::new(&s, 1).explicit(&rules).unwrap();
        assert_eq!(r.mapping.entry(0), Some(&MappingEntry::SourceField(0)));
        assert_eq!(r.mapping.entry(1), Some(&MappingEntry::SchemaDefault));
        assert_eq!(
            r.mapping.entry(2),
            Some(&MappingEntry::LiteralDefault("2000-01-01".into()))
        );
        assert_eq!(
            r.warnings,
            vec![MappingWarning::MissingDefaultValue {
                target: "id".into()
            }]
        );
    }

    #[test]
    fn unmapped_target_fails_without_defaulting() {
        let s = schema();
        let rules = vec![MappingRule::column(SourceRef::Index(0), "id")];
        let err = MappingResolver::new(&s, 3).explicit(&rules).unwrap_err();
        assert!(matches!(err, MappingError::Unmapped { column: 1, .. }));
    }
}
