//! End-to-end pipeline tests against the in-memory and filesystem catalogs.


use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;

use csload_core::config::{LoadConfig, MalformedPolicy};
use csload_core::schema::Schema;
use csload_core::sink::{BulkSink, Catalog, LoadSummary, SinkError};
use csload_core::types::{ConversionStatus, Scalar};
use csload_exec::{IngestionPipeline, LoadFailure, LoadReport, PipelineError};
use csload_io::sinks::{FsCatalog, MemoryCatalog};
use csload_io::{probe_first_record, ErrorLog};
use csload_planner::{parse_mapping_rules, MappingResolver};
use test_data_gen::{generate_people_csv, people_schema, write_input};

fn date(y: i32, m: u32, d: u32) -> Scalar {
    Scalar::Date(NaiveDate::from_ymd_opt(y, m, d).expect("valid date"))
}

fn memory_table(schema: &Schema) -> MemoryCatalog {
    let catalog = MemoryCatalog::new();
    catalog.create_table("db", "people", schema.clone());
    catalog
}

/// Implicit mapping, width taken from `width`.
fn load(
    catalog: &MemoryCatalog,
    schema: &Schema,
    config: &LoadConfig,
    width: usize,
    input: &str,
) -> Result<LoadReport, LoadFailure> {
    let resolved = MappingResolver::new(schema, width)
        .default_unmapped(config.default_unmapped)
        .implicit()
        .expect("Failed to resolve mapping");
    let sink = catalog
        .begin_bulk_load("db", "people")
        .expect("Failed to begin bulk load");
    IngestionPipeline::new(config, schema, &resolved.mapping).run(Cursor::new(input.to_string()), sink)
}

fn tiny_buffers() -> LoadConfig {
    LoadConfig {
        read_block_size: 1,
        byte_buffer_capacity: 2,
        row_buffer_capacity: 2,
        ..LoadConfig::default()
    }
}

#[test]
fn test_documented_example() {
    let schema = people_schema();
    let catalog = memory_table(&schema);
    let config = LoadConfig {
        date_format: Some("%Y-%m-%d".into()),
        ..LoadConfig::default()
    };

    let report = load(
        &catalog,
        &schema,
        &config,
        3,
        "1,hello,\n2,\"wo,rld\",2020-01-01\n",
    )
    .expect("load should complete");

    assert_eq!(report.summary.rows_inserted, 2);
    assert_eq!(report.records_read, 2);
    assert_eq!(
        catalog.rows("db", "people"),
        vec![
            vec![Scalar::I32(1), Scalar::Str("hello".into()), Scalar::Null],
            vec![Scalar::I32(2), Scalar::Str("wo,rld".into()), date(2020, 1, 1)],
        ]
    );
    assert_eq!(catalog.commits("db", "people"), 1);
}

#[test]
fn test_one_byte_blocks_and_two_slot_rings() {
    let schema = people_schema();
    let catalog = memory_table(&schema);
    let input = format!("{}9,\"quoted\nname\",2021-05-06\n", generate_people_csv(200));

    let report = load(&catalog, &schema, &tiny_buffers(), 3, &input).expect("load should complete");

    assert_eq!(report.summary.rows_inserted, 201);
    let rows = catalog.rows("db", "people");
    assert_eq!(rows[0][1], Scalar::Str("Person0".into()));
    assert_eq!(rows[200][1], Scalar::Str("quoted\nname".into()));
    assert_eq!(rows[200][2], date(2021, 5, 6));
}

#[test]
fn test_trailing_delimiter_at_end_of_input_is_a_null_last_field() {
    // Boundary case: no newline after the trailing delimiter of the last line.
    let schema = people_schema();
    let catalog = memory_table(&schema);
    load(&catalog, &schema, &LoadConfig::default(), 3, "1,a,2020-02-02\n2,b,")
        .expect("load should complete");
    let rows = catalog.rows("db", "people");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][2], Scalar::Null);
}

#[test]
fn test_header_is_not_loaded() {
    let schema = people_schema();
    let catalog = memory_table(&schema);
    let config = LoadConfig {
        has_header: true,
        ..LoadConfig::default()
    };
    let report = load(&catalog, &schema, &config, 3, "id,name,born\n5,e,2020-03-03\n")
        .expect("load should complete");
    assert_eq!(report.records_read, 2);
    assert_eq!(catalog.rows("db", "people"), vec![vec![Scalar::I32(5), Scalar::Str("e".into()), date(2020, 3, 3)]]);
}

#[test]
fn test_strict_mismatch_on_last_row_does_not_hang() {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let schema = people_schema();
        let catalog = memory_table(&schema);
        let input = format!("{}7,short\n", generate_people_csv(500));
        let result = load(&catalog, &schema, &tiny_buffers(), 3, &input);
        let _ = tx.send((result, catalog.rows("db", "people"), catalog.rollbacks("db", "people")));
    });

    let (result, rows, rollbacks) = rx
        .recv_timeout(Duration::from_secs(30))
        .expect("pipeline did not terminate");
    let failure = result.expect_err("strict mismatch must fail the load");
    assert!(matches!(
        failure.cause,
        PipelineError::Malformed {
            record: 501,
            expected: 3,
            found: 2,
            ..
        }
    ));
    assert!(failure.rolled_back);
    assert!(rows.is_empty());
    assert_eq!(rollbacks, 1);
}

#[test]
fn test_strict_mismatch_mid_stream_stops_the_load() {
    let schema = people_schema();
    let catalog = memory_table(&schema);
    let input = format!("1,a,2020-01-01\n2,b\n{}", generate_people_csv(1000));
    let failure = load(&catalog, &schema, &tiny_buffers(), 3, &input)
        .expect_err("strict mismatch must fail the load");
    assert!(matches!(failure.cause, PipelineError::Malformed { record: 2, .. }));
    assert!(catalog.rows("db", "people").is_empty());
}

#[test]
fn test_lenient_mode_skips_and_logs_malformed_records() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let input = write_input(
        dir.path(),
        "people.csv",
        "1,a,2020-01-01\nx\n2,b,2020-01-02\n3,c,d,e\n4,d,2020-01-04\n",
    );
    let schema = people_schema();
    let catalog = memory_table(&schema);
    let config = LoadConfig {
        malformed: MalformedPolicy::Skip,
        error_log: true,
        ..LoadConfig::default()
    };
    let log = ErrorLog::create_for_input(&input).expect("Failed to create error log");
    let log_path = log.path().expect("file-backed log").to_path_buf();
    let resolved = MappingResolver::new(&schema, 3).implicit().expect("resolve");
    let sink = catalog.begin_bulk_load("db", "people").expect("begin");

    let report = IngestionPipeline::new(&config, &schema, &resolved.mapping)
        .with_error_log(Some(&log))
        .run_file(&input, sink)
        .expect("load should complete");
    drop(log);

    assert_eq!(report.summary.rows_inserted, 3);
    assert_eq!(report.malformed_skipped, 2);
    assert_eq!(report.records_read, 5);
    assert_eq!(report.error_log_entries, 2);

    let text = std::fs::read_to_string(&log_path).expect("Failed to read error log");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "error_type, column_nr, parsed_raw_row_values",
            "MALFORMED, 1, x",
            "MALFORMED, 4, 3,c,d,e",
        ]
    );
}

#[test]
fn test_sink_failure_rolls_back() {
    let schema = people_schema();
    let catalog = memory_table(&schema);
    catalog.fail_on_row("db", "people", 3);

    let failure = load(&catalog, &schema, &LoadConfig::default(), 3, &generate_people_csv(100))
        .expect_err("sink failure must fail the load");

    assert!(matches!(failure.cause, PipelineError::Sink(_)));
    assert!(failure.rolled_back);
    assert_eq!(failure.report.summary.rows_inserted, 0);
    assert!(catalog.rows("db", "people").is_empty());
    assert_eq!(catalog.commits("db", "people"), 0);
    assert_eq!(catalog.rollbacks("db", "people"), 1);
}

/// Accepts values but panics on the first `write_row`.
struct PanickingSink {
    rolled_back: Arc<AtomicBool>,
}

impl BulkSink for PanickingSink {
    fn set_value(&mut self, _col: usize, _value: Scalar) -> Result<ConversionStatus, SinkError> {
        Ok(ConversionStatus::Ok)
    }

    fn set_null(&mut self, _col: usize) -> Result<ConversionStatus, SinkError> {
        Ok(ConversionStatus::Ok)
    }

    fn write_row(&mut self) -> Result<(), SinkError> {
        panic!("sink exploded");
    }

    fn commit(&mut self) -> Result<LoadSummary, SinkError> {
        Ok(LoadSummary::default())
    }

    fn rollback(&mut self) -> Result<(), SinkError> {
        self.rolled_back.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn summary(&self) -> LoadSummary {
        LoadSummary::default()
    }
}

#[test]
fn test_writer_panic_fails_the_load_without_hanging() {
    let rolled_back = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    {
        let rolled_back = Arc::clone(&rolled_back);
        thread::spawn(move || {
            let schema = people_schema();
            let config = tiny_buffers();
            let resolved = MappingResolver::new(&schema, 3).implicit().expect("resolve");
            let sink = Box::new(PanickingSink { rolled_back });
            let result = IngestionPipeline::new(&config, &schema, &resolved.mapping)
                .run(Cursor::new(generate_people_csv(100)), sink);
            let _ = tx.send(result);
        });
    }

    let result = rx
        .recv_timeout(Duration::from_secs(30))
        .expect("pipeline did not terminate");
    let failure = result.expect_err("a panicking writer must fail the load");
    assert!(matches!(failure.cause, PipelineError::StagePanicked("sink-writer")));
    assert!(failure.rolled_back);
    assert!(rolled_back.load(Ordering::SeqCst));
}

/// Yields `good` and then fails.
struct FailingReader {
    good: Cursor<Vec<u8>>,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.good.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::Other, "disk on fire")),
            n => Ok(n),
        }
    }
}

#[test]
fn test_read_error_rolls_back() {
    let schema = people_schema();
    let catalog = memory_table(&schema);
    let resolved = MappingResolver::new(&schema, 3).implicit().expect("resolve");
    let sink = catalog.begin_bulk_load("db", "people").expect("begin");
    let config = LoadConfig::default();
    let input = FailingReader {
        good: Cursor::new(generate_people_csv(10).into_bytes()),
    };

    let failure = IngestionPipeline::new(&config, &schema, &resolved.mapping)
        .run(input, sink)
        .expect_err("read failure must fail the load");

    assert!(matches!(failure.cause, PipelineError::Io(_)));
    assert!(failure.rolled_back);
    assert!(catalog.rows("db", "people").is_empty());
}

#[test]
fn test_fs_catalog_with_header_and_rule_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let catalog = FsCatalog::new(dir.path().join("catalog"));
    let schema = people_schema();
    catalog
        .create_table("db", "people", &schema)
        .expect("Failed to create table");
    let input = write_input(
        dir.path(),
        "in.csv",
        "born;who;id\n24.12.1999;ann;1\n01.01.2000;;2\n",
    );

    let config = LoadConfig {
        dialect: csload_core::config::Dialect {
            delimiter: b';',
            ..Default::default()
        },
        has_header: true,
        ..LoadConfig::default()
    };
    let first = probe_first_record(&input, config.dialect).expect("probe");
    let rules = parse_mapping_rules(
        r#"
- column: id
  target: id
- column: who
  target: name
- column: born
  target: born
  format: "%d.%m.%Y"
"#,
    )
    .expect("parse");
    let resolved = MappingResolver::new(&schema, first.width())
        .with_header(&first.fields)
        .explicit(&rules)
        .expect("resolve");
    let sink = catalog.begin_bulk_load("db", "people").expect("begin");

    let report = IngestionPipeline::new(&config, &schema, &resolved.mapping)
        .run_file(&input, sink)
        .expect("load should complete");
    assert_eq!(report.summary.rows_inserted, 2);

    let text = std::fs::read_to_string(catalog.data_path("db", "people")).expect("data file");
    let rows: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(
        rows,
        vec![
            serde_json::json!({"id": 1, "name": "ann", "born": "1999-12-24"}),
            serde_json::json!({"id": 2, "name": null, "born": "2000-01-01"}),
        ]
    );
}

#[test]
fn test_fs_commit_failure_rolls_back_staging() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let catalog = FsCatalog::new(dir.path().join("catalog"));
    let schema = people_schema();
    catalog
        .create_table("db", "people", &schema)
        .expect("Failed to create table");
    // A directory where the table file belongs makes the append fail.
    std::fs::create_dir(catalog.data_path("db", "people")).expect("Failed to create dir");

    let config = LoadConfig::default();
    let resolved = MappingResolver::new(&schema, 3).implicit().expect("resolve");
    let sink = catalog.begin_bulk_load("db", "people").expect("begin");
    let failure = IngestionPipeline::new(&config, &schema, &resolved.mapping)
        .run(Cursor::new(generate_people_csv(5)), sink)
        .expect_err("commit failure must fail the load");

    assert!(matches!(failure.cause, PipelineError::Sink(_)));
    assert!(failure.rolled_back);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("catalog").join("db"))
        .expect("Failed to list table dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".staging"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_empty_input_is_rejected_by_probe() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let input = write_input(dir.path(), "empty.csv", "");
    let err = probe_first_record(&input, Default::default()).expect_err("empty input");
    assert!(matches!(err, csload_io::Error::EmptyInput(_)));
}
