//! YAML mapping file → `Vec<MappingRule>`.
//!
//! Example:
//! ```yaml
//! - column: 0          # explicit source index
//!   target: id         # target by name...
//! - column:            # next implicit source position
//!   target: 2          # ...or by 0-based ordinal
//!   format: "%d.%m.%Y"
//! - column: []         # skip one implicit position
//! - column: name       # header name (input must declare a header)
//!   target: label
//! - target: created
//!   value: default     # schema default; any other value is a literal
//! ```
//!
//! Rule shape errors are not parse errors: they become rules the resolver
//! warns about and ignores.

use std::fs;
use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::{MappingError, Result};
use crate::rules::{DefaultValue, MappingRule, SourceRef};

/// Parse a mapping document.
pub fn parse_mapping_rules(yaml_src: &str) -> Result<Vec<MappingRule>> {
    if yaml_src.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: Value = serde_yaml::from_str(yaml_src)?;
    match doc {
        Value::Sequence(entries) => Ok(entries.iter().map(parse_rule).collect()),
        // An empty file is an empty rule list.
        Value::Null => Ok(Vec::new()),
        other => Err(MappingError::NotAList(kind(&other).to_string())),
    }
}

/// Read and parse a mapping file.
pub fn load_mapping_file<P: AsRef<Path>>(path: P) -> Result<Vec<MappingRule>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| MappingError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_mapping_rules(&text)
}

fn parse_rule(entry: &Value) -> MappingRule {
    let Value::Mapping(map) = entry else {
        return MappingRule::Unsupported(render(entry));
    };

    if let Some(column) = get(map, "column") {
        let source = match column {
            Value::Null => SourceRef::Next,
            Value::Sequence(_) => SourceRef::Skip,
            Value::Number(n) => match n.as_u64() {
                Some(i) => SourceRef::Index(i as usize),
                None => return MappingRule::Unsupported(render(entry)),
            },
            Value::String(s) => match s.trim().parse::<usize>() {
                Ok(i) => SourceRef::Index(i),
                Err(_) => SourceRef::Name(s.clone()),
            },
            _ => return MappingRule::Unsupported(render(entry)),
        };
        return MappingRule::Column {
            source,
            target: get(map, "target").and_then(scalar_text),
            format: get(map, "format").and_then(scalar_text).map(unquote),
        };
    }

    match get(map, "target").and_then(scalar_text) {
        Some(target) => MappingRule::TargetDefault {
            target,
            value: get(map, "value")
                .and_then(scalar_text)
                .map(DefaultValue::from_text),
        },
        None => MappingRule::Unsupported(render(entry)),
    }
}

fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(key)
}

/// Text of a scalar node; `None` for null and collections.
fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Formats are sometimes written with an extra pair of double quotes.
fn unquote(s: String) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s
    }
}

fn render(v: &Value) -> String {
    match serde_yaml::to_string(v) {
        Ok(s) => s.trim().replace('\n', " "),
        Err(_) => format!("{v:?}"),
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
