//! Mapping rules as handed to the resolver, in file order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which source field a column rule reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceRef {
    /// The next implicit position (`column:` with no value).
    Next,
    /// An explicit 0-based field index.
    Index(usize),
    /// A header name; only resolvable when the input declares a header.
    Name(String),
    /// Consume one implicit position without mapping it.
    Skip,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Next => f.write_str("<next>"),
            SourceRef::Index(i) => write!(f, "{i}"),
            SourceRef::Name(n) => write!(f, "{n:?}"),
            SourceRef::Skip => f.write_str("<skip>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// `value: default`: use the destination schema's default.
    Schema,
    Literal(String),
}

impl DefaultValue {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text == "default" {
            DefaultValue::Schema
        } else {
            DefaultValue::Literal(text)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingRule {
    /// Bind a source field to a target column.
    Column {
        source: SourceRef,
        /// Target ordinal or name, unresolved.
        target: Option<String>,
        /// Date format override for DATE/DATETIME targets.
        format: Option<String>,
    },
    /// Bind a target column to a default.
    TargetDefault {
        target: String,
        value: Option<DefaultValue>,
    },
    /// Neither `column` nor `target`; kept so the resolver can warn about it.
    Unsupported(String),
}

impl MappingRule {
    pub fn column(source: SourceRef, target: impl Into<String>) -> Self {
        MappingRule::Column {
            source,
            target: Some(target.into()),
            format: None,
        }
    }

    pub fn target_default(target: impl Into<String>, value: impl Into<String>) -> Self {
        MappingRule::TargetDefault {
            target: target.into(),
            value: Some(DefaultValue::from_text(value)),
        }
    }

    pub fn with_format(self, fmt: impl Into<String>) -> Self {
        match self {
            MappingRule::Column { source, target, .. } => MappingRule::Column {
                source,
                target,
                format: Some(fmt.into()),
            },
            other => other,
        }
    }
}
