//! csload: bulk-load a delimited text file into a table.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use eyre::{Context, Result};
use tracing::{error, info, warn};

use csload_core::config::{single_ascii, LoadConfig, MalformedPolicy};
use csload_core::schema::Schema;
use csload_core::sink::{BulkSink, Catalog};
use csload_exec::{IngestionPipeline, LoadFailure, LoadReport};
use csload_io::sinks::FsCatalog;
use csload_io::{probe_first_record, ErrorLog};
use csload_planner::{load_mapping_file, MappingResolver, ResolvedMapping};

const EXIT_USAGE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_INGEST: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "csload", version = csload_core::VERSION)]
#[command(about = "Bulk-load delimited text records into a table", long_about = None)]
struct Cli {
    /// Target database
    database: String,

    /// Target table
    table: String,

    /// Delimited input file
    input_file: PathBuf,

    /// YAML mapping file (default: source field i → target column i)
    #[arg(short, long)]
    mapping: Option<PathBuf>,

    /// Catalog root holding `<database>/<table>.schema.json`
    #[arg(long, default_value = ".")]
    catalog: PathBuf,

    /// Field delimiter (one ASCII character)
    #[arg(short, long)]
    delimiter: Option<String>,

    /// Enclose-by (quote) character
    #[arg(short = 'E', long = "enclose-by")]
    enclose_by: Option<String>,

    /// Escape character; may equal the enclose-by character
    #[arg(short = 'C', long)]
    escape: Option<String>,

    /// Input format for DATE/DATETIME columns, strftime syntax (e.g. %d.%m.%Y)
    #[arg(long = "date-format", visible_alias = "df")]
    date_format: Option<String>,

    /// Field text loaded as NULL besides the empty field
    #[arg(short = 'n', long = "null-token")]
    null_token: Option<String>,

    /// Use the schema default for target columns no rule maps
    #[arg(long = "default-non-mapped")]
    default_non_mapped: bool,

    /// First record is a header and is not loaded
    #[arg(long)]
    header: bool,

    /// Write conversion warnings and skipped records to `<input>.<millis>.err`
    #[arg(long = "err-log")]
    err_log: bool,

    /// Records whose field count differs from the first record
    #[arg(long = "on-malformed", value_enum)]
    on_malformed: Option<MalformedArg>,

    /// Bytes read from the input per block
    #[arg(long)]
    read_block_size: Option<usize>,

    /// Slots in the reader → tokenizer buffer
    #[arg(long)]
    byte_buffer_capacity: Option<usize>,

    /// Slots in the tokenizer → sink-writer buffer
    #[arg(long)]
    row_buffer_capacity: Option<usize>,

    /// Pause after a blocked buffer wakes up, in microseconds
    #[arg(long)]
    wait_grace_us: Option<u64>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MalformedArg {
    /// Abort the load and roll back
    Strict,
    /// Skip the record and keep going
    Skip,
}

impl From<MalformedArg> for MalformedPolicy {
    fn from(a: MalformedArg) -> Self {
        match a {
            MalformedArg::Strict => MalformedPolicy::Strict,
            MalformedArg::Skip => MalformedPolicy::Skip,
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_USAGE,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_tracing(cli.verbose);

    let prepared = match prepare(&cli) {
        Ok(p) => p,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match prepared.run(&cli.input_file) {
        Ok(report) => {
            print_summary(&report);
            ExitCode::SUCCESS
        }
        Err(failure) => {
            error!("error during bulk load: {failure}");
            if failure.rolled_back {
                error!("rollback performed");
            }
            print_summary(&failure.report);
            ExitCode::from(EXIT_INGEST)
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

/// Everything resolved before the first byte is loaded.
struct Prepared {
    config: LoadConfig,
    schema: Schema,
    resolved: ResolvedMapping,
    error_log: Option<ErrorLog>,
    sink: Box<dyn BulkSink>,
}

impl Prepared {
    fn run(self, input: &Path) -> std::result::Result<LoadReport, LoadFailure> {
        let result = IngestionPipeline::new(&self.config, &self.schema, &self.resolved.mapping)
            .with_error_log(self.error_log.as_ref())
            .run_file(input, self.sink);
        if let Some(log) = &self.error_log {
            if log.entries() > 0 {
                if let Some(path) = log.path() {
                    warn!("{} entries written to {}", log.entries(), path.display());
                }
            }
        }
        result
    }
}

/// Configuration, schema, first-record probe, mapping resolution, bulk-load
/// handle, error log. Any failure here is a configuration error.
fn prepare(cli: &Cli) -> Result<Prepared> {
    let config = build_config(cli)?;

    let catalog = FsCatalog::new(&cli.catalog);
    let schema = catalog
        .resolve_schema(&cli.database, &cli.table)
        .wrap_err("can't resolve target table")?;

    let first = probe_first_record(&cli.input_file, config.dialect)
        .wrap_err("can't determine the number of input fields")?;
    info!(fields = first.width(), "first record probed");

    let resolved = resolve_mapping(cli, &config, &schema, &first.fields)?;

    let mut sink = catalog
        .begin_bulk_load(&cli.database, &cli.table)
        .wrap_err("can't start bulk load")?;
    let error_log = open_error_log(&cli.input_file, &config, sink.as_mut())?;

    Ok(Prepared {
        config,
        schema,
        resolved,
        error_log,
        sink,
    })
}

/// Create `<input>.<millis>.err` when enabled. The bulk load is already open,
/// so it is rolled back if the log can't be created.
fn open_error_log(
    input: &Path,
    config: &LoadConfig,
    sink: &mut dyn BulkSink,
) -> Result<Option<ErrorLog>> {
    if !config.error_log {
        return Ok(None);
    }
    match ErrorLog::create_for_input(input) {
        Ok(log) => {
            if let Some(path) = log.path() {
                info!("error log: {}", path.display());
            }
            Ok(Some(log))
        }
        Err(e) => {
            if let Err(r) = sink.rollback() {
                warn!("rollback failed: {r}");
            }
            Err(e.into())
        }
    }
}

fn resolve_mapping(
    cli: &Cli,
    config: &LoadConfig,
    schema: &Schema,
    first_record: &[String],
) -> Result<ResolvedMapping> {
    let mut resolver = MappingResolver::new(schema, first_record.len())
        .default_unmapped(config.default_unmapped);
    if config.has_header {
        resolver = resolver.with_header(first_record);
    }
    let resolved = match &cli.mapping {
        Some(path) => {
            let rules = load_mapping_file(path)
                .wrap_err_with(|| format!("mapping file {}", path.display()))?;
            resolver.explicit(&rules)?
        }
        None => resolver.implicit()?,
    };
    Ok(resolved)
}

/// Defaults, then `CSLOAD_*` environment variables, then flags.
fn build_config(cli: &Cli) -> Result<LoadConfig> {
    let mut cfg = LoadConfig::from_env();

    if let Some(d) = &cli.delimiter {
        cfg.dialect.delimiter = single_ascii("delimiter", d)?;
    }
    if let Some(q) = &cli.enclose_by {
        cfg.dialect.quote = single_ascii("enclose-by character", q)?;
    }
    if let Some(e) = &cli.escape {
        cfg.dialect.escape = single_ascii("escape character", e)?;
    }
    if cli.date_format.is_some() {
        cfg.date_format = cli.date_format.clone();
    }
    if cli.null_token.is_some() {
        cfg.null_token = cli.null_token.clone();
    }
    if let Some(m) = cli.on_malformed {
        cfg.malformed = m.into();
    }
    cfg.has_header |= cli.header;
    cfg.error_log |= cli.err_log;
    cfg.default_unmapped |= cli.default_non_mapped;
    if let Some(v) = cli.read_block_size {
        cfg.read_block_size = v;
    }
    if let Some(v) = cli.byte_buffer_capacity {
        cfg.byte_buffer_capacity = v;
    }
    if let Some(v) = cli.row_buffer_capacity {
        cfg.row_buffer_capacity = v;
    }
    if let Some(v) = cli.wait_grace_us {
        cfg.wait_grace_us = v;
    }

    cfg.validate()?;
    Ok(cfg)
}

fn print_summary(report: &LoadReport) {
    let s = &report.summary;
    println!("Execution time: {:.3}s", s.execution_time.as_secs_f64());
    println!("Rows inserted: {}", s.rows_inserted);
    println!("Truncation count: {}", s.truncated);
    println!("Saturated count: {}", s.saturated);
    println!("Invalid count: {}", s.invalid);
    if report.malformed_skipped > 0 {
        println!("Malformed records skipped: {}", report.malformed_skipped);
    }
}
