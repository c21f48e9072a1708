//! The three-stage ingestion pipeline.
//!
//! ```text
//! reader ──blocks──▶ [ring A] ──▶ tokenizer/validator ──rows──▶ [ring B] ──▶ sink-writer
//! ```
//!
//! Each stage runs on its own scoped thread and blocks only inside `push`/`pop`.
//! The one piece of shared state besides the rings is the `failed` flag. A
//! stage that fails sets it *before* signalling end of input downstream, so the
//! sink-writer always observes it by the time its ring runs dry and can decide
//! between commit and rollback on its own.
//!
//! After a failure every consumer keeps popping (and discarding) until its ring
//! reports end of input, so no producer is ever left blocked on a full ring.
//! A consumer that panics does the same from a drop guard. The reader checks
//! the flag before each block and stops early.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use csload_core::config::{LoadConfig, MalformedPolicy};
use csload_core::mapping::ColumnMapping;
use csload_core::schema::Schema;
use csload_core::sink::{BulkSink, LoadSummary};
use csload_io::{BlockReader, BoundedRingBuffer, ErrorLog, RecordSplitter};

use crate::error::{LoadFailure, PipelineError};
use crate::metrics::{emit_stage_done, ReaderStats, ValidatorStats, WriterStats};
use crate::writer::RowWriter;

type Record = Vec<String>;

/// Counters of a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// What the sink reported on commit (or up to rollback).
    pub summary: LoadSummary,
    /// Records tokenized, including a header and skipped records.
    pub records_read: u64,
    pub malformed_skipped: u64,
    pub bytes_read: u64,
    /// Lines appended to the error log during the run.
    pub error_log_entries: u64,
    pub elapsed: Duration,
}

pub struct IngestionPipeline<'a> {
    config: &'a LoadConfig,
    schema: &'a Schema,
    mapping: &'a ColumnMapping,
    error_log: Option<&'a ErrorLog>,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(config: &'a LoadConfig, schema: &'a Schema, mapping: &'a ColumnMapping) -> Self {
        Self {
            config,
            schema,
            mapping,
            error_log: None,
        }
    }

    /// Log skipped records and conversion warnings here.
    pub fn with_error_log(mut self, log: Option<&'a ErrorLog>) -> Self {
        self.error_log = log;
        self
    }

    /// Load a file.
    pub fn run_file<P: AsRef<Path>>(
        &self,
        path: P,
        sink: Box<dyn BulkSink>,
    ) -> Result<LoadReport, LoadFailure> {
        let path = path.as_ref();
        match File::open(path) {
            Ok(file) => self.run(file, sink),
            Err(e) => {
                let mut sink = sink;
                let rolled_back = rollback(sink.as_mut());
                Err(LoadFailure {
                    cause: csload_io::Error::io(path.display().to_string(), e).into(),
                    rolled_back,
                    report: LoadReport::default(),
                })
            }
        }
    }

    /// Run all three stages over `input` and commit or roll back `sink`.
    ///
    /// `Ok` is the `Completed` state (committed); `Err` is `Failed`.
    pub fn run<R: Read + Send>(
        &self,
        input: R,
        mut sink: Box<dyn BulkSink>,
    ) -> Result<LoadReport, LoadFailure> {
        let grace = self.config.wait_grace();
        let blocks = BoundedRingBuffer::<Vec<u8>>::with_grace(self.config.byte_buffer_capacity, grace);
        let rows = BoundedRingBuffer::<Record>::with_grace(self.config.row_buffer_capacity, grace);
        let failed = AtomicBool::new(false);
        let log_entries_before = self.error_log.map(ErrorLog::entries).unwrap_or(0);
        let started = std::time::Instant::now();

        info!(
            columns = self.schema.len(),
            block_size = self.config.read_block_size,
            "starting load"
        );

        let target = sink.as_mut();
        let (read, validate, write) = thread::scope(|s| {
            let (blocks, rows, failed) = (&blocks, &rows, &failed);
            let reader = s.spawn(move || {
                let _eoi = EndOfInputGuard { ring: blocks, failed };
                read_stage(input, self.config.read_block_size, blocks, failed)
            });
            let validator = s.spawn(move || {
                let _eoi = EndOfInputGuard { ring: rows, failed };
                let _drain = DrainOnUnwind { ring: blocks, failed };
                self.validate_stage(blocks, rows, failed)
            });
            let writer = s.spawn(move || {
                let _drain = DrainOnUnwind { ring: rows, failed };
                self.write_stage(rows, failed, target)
            });

            (
                join(reader, "reader"),
                join(validator, "tokenizer"),
                join(writer, "sink-writer"),
            )
        });

        let mut report = LoadReport {
            elapsed: started.elapsed(),
            error_log_entries: self.error_log.map(ErrorLog::entries).unwrap_or(0)
                - log_entries_before,
            ..Default::default()
        };
        if let Ok(r) = &read {
            report.bytes_read = r.bytes;
        }
        if let Ok(v) = &validate {
            report.records_read = v.records;
            report.malformed_skipped = v.malformed_skipped;
        }
        if let Some(log) = self.error_log {
            if let Err(e) = log.flush() {
                warn!("{e}");
            }
        }

        // Root cause first: an upstream failure explains the writer's rollback.
        let upstream = read.err().or(validate.err());
        match write {
            Ok(WriteOutcome::Committed(summary)) => {
                report.summary = summary;
                info!(rows = report.summary.rows_inserted, "load committed");
                Ok(report)
            }
            Ok(WriteOutcome::RolledBack {
                cause,
                summary,
                rolled_back,
            }) => {
                report.summary = summary;
                let cause = upstream
                    .or(cause)
                    .unwrap_or(PipelineError::StagePanicked("tokenizer"));
                warn!(rolled_back, "load failed: {cause}");
                Err(LoadFailure {
                    cause,
                    rolled_back,
                    report,
                })
            }
            Err(e) => {
                let rolled_back = rollback(sink.as_mut());
                report.summary = sink.summary();
                let cause = upstream.unwrap_or(e);
                warn!(rolled_back, "load failed: {cause}");
                Err(LoadFailure {
                    cause,
                    rolled_back,
                    report,
                })
            }
        }
    }

    fn validate_stage(
        &self,
        blocks: &BoundedRingBuffer<Vec<u8>>,
        rows: &BoundedRingBuffer<Record>,
        failed: &AtomicBool,
    ) -> Result<ValidatorStats, PipelineError> {
        let mut splitter = RecordSplitter::new(self.config.dialect);
        let mut validator = Validator {
            policy: self.config.malformed,
            error_log: self.error_log,
            baseline: None,
            stats: ValidatorStats::default(),
        };
        let mut result = Ok(());

        while let Some(block) = blocks.pop() {
            if failed.load(Ordering::Acquire) {
                continue;
            }
            for &b in &block {
                if let Some(record) = splitter.push(b) {
                    result = validator.accept(record, rows);
                    if result.is_err() {
                        break;
                    }
                }
            }
            if result.is_err() {
                abort_strict(rows, failed);
            }
        }

        if result.is_ok() && !failed.load(Ordering::Acquire) {
            if let Some(record) = splitter.finish() {
                result = validator.accept(record, rows);
                if result.is_err() {
                    abort_strict(rows, failed);
                }
            }
        }

        let stats = validator.stats;
        emit_stage_done(
            "tokenizer",
            &[
                ("records", stats.records),
                ("malformed_skipped", stats.malformed_skipped),
            ],
        );
        result.map(|()| stats)
    }

    fn write_stage(
        &self,
        rows: &BoundedRingBuffer<Record>,
        failed: &AtomicBool,
        sink: &mut dyn BulkSink,
    ) -> WriteOutcome {
        let writer = RowWriter::new(self.schema, self.mapping, self.config)
            .with_error_log(self.error_log);
        let mut stats = WriterStats::default();
        let mut skip_header = self.config.has_header;
        let mut cause = None;

        while let Some(record) = rows.pop() {
            if failed.load(Ordering::Acquire) {
                continue;
            }
            if skip_header {
                skip_header = false;
                continue;
            }
            match writer.write(sink, &record) {
                Ok(warnings) => {
                    stats.rows_written += 1;
                    stats.conversion_warnings += warnings;
                }
                Err(e) => {
                    failed.store(true, Ordering::Release);
                    cause = Some(PipelineError::Sink(e));
                }
            }
        }

        emit_stage_done(
            "sink-writer",
            &[
                ("rows_written", stats.rows_written),
                ("conversion_warnings", stats.conversion_warnings),
            ],
        );

        if !failed.load(Ordering::Acquire) {
            match sink.commit() {
                Ok(summary) => return WriteOutcome::Committed(summary),
                Err(e) => cause = Some(PipelineError::Sink(e)),
            }
        }
        let rolled_back = rollback(sink);
        WriteOutcome::RolledBack {
            cause,
            summary: sink.summary(),
            rolled_back,
        }
    }
}

enum WriteOutcome {
    Committed(LoadSummary),
    RolledBack {
        /// `None` when the failure came from upstream.
        cause: Option<PipelineError>,
        summary: LoadSummary,
        rolled_back: bool,
    },
}

struct Validator<'a> {
    policy: MalformedPolicy,
    error_log: Option<&'a ErrorLog>,
    /// Width of the first record.
    baseline: Option<usize>,
    stats: ValidatorStats,
}

impl Validator<'_> {
    fn accept(
        &mut self,
        record: Record,
        rows: &BoundedRingBuffer<Record>,
    ) -> Result<(), PipelineError> {
        self.stats.records += 1;
        let expected = *self.baseline.get_or_insert(record.len());
        if record.len() == expected {
            rows.push(record);
            return Ok(());
        }

        match self.policy {
            MalformedPolicy::Strict => Err(PipelineError::Malformed {
                record: self.stats.records,
                expected,
                found: record.len(),
                values: record.join(", "),
            }),
            MalformedPolicy::Skip => {
                self.stats.malformed_skipped += 1;
                debug!(
                    record = self.stats.records,
                    found = record.len(),
                    expected,
                    "skipping malformed record"
                );
                if let Some(log) = self.error_log {
                    if let Err(e) = log.append("MALFORMED", record.len(), &record) {
                        warn!("{e}");
                    }
                }
                Ok(())
            }
        }
    }
}

/// Strict-mode stop: mark the run failed, then push one empty placeholder
/// row so a sink-writer parked in `pop` wakes up and sees the flag.
fn abort_strict(rows: &BoundedRingBuffer<Record>, failed: &AtomicBool) {
    failed.store(true, Ordering::Release);
    rows.push(Vec::new());
}

fn read_stage<R: Read>(
    input: R,
    block_size: usize,
    blocks: &BoundedRingBuffer<Vec<u8>>,
    failed: &AtomicBool,
) -> Result<ReaderStats, PipelineError> {
    let mut reader = BlockReader::new(input, block_size);
    let mut stats = ReaderStats::default();
    let result = loop {
        if failed.load(Ordering::Acquire) {
            debug!("reader stopping early after failure");
            break Ok(());
        }
        match reader.next_block() {
            Ok(Some(block)) => {
                stats.blocks += 1;
                blocks.push(block);
            }
            Ok(None) => break Ok(()),
            Err(e) => {
                failed.store(true, Ordering::Release);
                break Err(PipelineError::Io(csload_io::Error::io("input", e)));
            }
        }
    };
    stats.bytes = reader.bytes_read();
    emit_stage_done("reader", &[("blocks", stats.blocks), ("bytes", stats.bytes)]);
    result.map(|()| stats)
}

/// Signals end of input downstream when a producing stage returns or unwinds.
/// An unwinding stage also marks the run failed first.
struct EndOfInputGuard<'a, T> {
    ring: &'a BoundedRingBuffer<T>,
    failed: &'a AtomicBool,
}

impl<T> Drop for EndOfInputGuard<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.failed.store(true, Ordering::Release);
        }
        self.ring.signal_no_more_input();
    }
}

/// Keeps a consumer's input ring moving when the consumer unwinds, so its
/// producer can finish and signal end of input.
struct DrainOnUnwind<'a, T> {
    ring: &'a BoundedRingBuffer<T>,
    failed: &'a AtomicBool,
}

impl<T> Drop for DrainOnUnwind<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.failed.store(true, Ordering::Release);
            self.ring.drain().for_each(drop);
        }
    }
}

fn join<T>(
    handle: thread::ScopedJoinHandle<'_, T>,
    stage: &'static str,
) -> Result<T::Ok, PipelineError>
where
    T: StageResult,
{
    match handle.join() {
        Ok(r) => r.into_result(),
        Err(_) => Err(PipelineError::StagePanicked(stage)),
    }
}

/// Stage return values, uniformly as a `Result`.
trait StageResult {
    type Ok;
    fn into_result(self) -> Result<Self::Ok, PipelineError>;
}

impl<T> StageResult for Result<T, PipelineError> {
    type Ok = T;
    fn into_result(self) -> Result<T, PipelineError> {
        self
    }
}

impl StageResult for WriteOutcome {
    type Ok = WriteOutcome;
    fn into_result(self) -> Result<WriteOutcome, PipelineError> {
        Ok(self)
    }
}

/// Roll back, reporting whether it succeeded.
fn rollback(sink: &mut dyn BulkSink) -> bool {
    match sink.rollback() {
        Ok(()) => true,
        Err(e) => {
            warn!("rollback failed: {e}");
            false
        }
    }
}
