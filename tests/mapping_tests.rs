//! Mapping resolution through the YAML rule file, as the CLI drives it.

use csload_core::mapping::MappingEntry;
use csload_core::schema::{DataType, Field, Schema};
use csload_planner::{
    parse_mapping_rules, MappingError, MappingResolver, MappingWarning,
};

fn five_columns() -> Schema {
    Schema::new(vec![
        Field::new("a", DataType::Utf8, true),
        Field::new("b", DataType::Int64, true),
        Field::new("c", DataType::Date, true),
        Field::new("d", DataType::Utf8, true).with_default("dd"),
        Field::new("e", DataType::Float64, true),
    ])
}

#[test]
fn test_later_default_overwrites_earlier_with_warning() {
    let schema = five_columns();
    let rules = parse_mapping_rules(
        r#"
- target: a
  value: x
- target: a
  value: y
"#,
    )
    .expect("Failed to parse rules");
    let resolved = MappingResolver::new(&schema, 1)
        .default_unmapped(true)
        .explicit(&rules)
        .expect("Failed to resolve");

    assert_eq!(
        resolved.mapping.entry(0),
        Some(&MappingEntry::LiteralDefault("y".into()))
    );
    assert_eq!(
        resolved.warnings,
        vec![MappingWarning::Overwritten {
            target: 0,
            previous: MappingEntry::LiteralDefault("x".into()),
        }]
    );
}

#[test]
fn test_implicit_mapping_with_too_few_source_fields_fails() {
    let schema = five_columns();
    let err = MappingResolver::new(&schema, 3)
        .implicit()
        .expect_err("resolution should fail");
    assert!(matches!(
        err,
        MappingError::InsufficientSource {
            source_width: 3,
            target_width: 5
        }
    ));
}

#[test]
fn test_column_rule_then_default_for_same_target() {
    let schema = five_columns();
    let rules = parse_mapping_rules(
        r#"
- column: 0
  target: b
- target: 1
  value: default
"#,
    )
    .expect("Failed to parse rules");
    let resolved = MappingResolver::new(&schema, 2)
        .default_unmapped(true)
        .explicit(&rules)
        .expect("Failed to resolve");
    assert_eq!(resolved.mapping.entry(1), Some(&MappingEntry::SchemaDefault));
    assert_eq!(resolved.warnings.len(), 1);
    // a, c, d, e defaulted
    assert_eq!(resolved.notices.len(), 4);
}

#[test]
fn test_full_rule_file() {
    let schema = five_columns();
    let header = vec![
        "when".to_string(),
        "label".to_string(),
        "n".to_string(),
        "unused".to_string(),
    ];
    let rules = parse_mapping_rules(
        r#"
# implicit positions 0 and 1, skip 2
- column:
  target: c
  format: "%d/%m/%Y"
- column:
  target: a
- column: []
- column: n
  target: b
- target: d
  value: default
- target: e
  value: 0.5
"#,
    )
    .expect("Failed to parse rules");
    let resolved = MappingResolver::new(&schema, 4)
        .with_header(&header)
        .explicit(&rules)
        .expect("Failed to resolve");

    assert_eq!(
        resolved.mapping.entries(),
        &[
            MappingEntry::SourceField(1),
            MappingEntry::SourceField(2),
            MappingEntry::SourceField(0),
            MappingEntry::SchemaDefault,
            MappingEntry::LiteralDefault("0.5".into()),
        ]
    );
    assert_eq!(resolved.mapping.date_format(2), Some("%d/%m/%Y"));
    assert!(resolved.warnings.is_empty());
    assert!(resolved.notices.is_empty());
}

#[test]
fn test_unresolvable_target_leaves_column_unmapped() {
    let schema = Schema::new(vec![Field::new("only", DataType::Utf8, true)]);
    let rules = parse_mapping_rules("- column: 0\n  target: missing\n").expect("parse");
    let err = MappingResolver::new(&schema, 1)
        .explicit(&rules)
        .expect_err("should fail");
    assert!(matches!(err, MappingError::Unmapped { column: 0, .. }));
}
