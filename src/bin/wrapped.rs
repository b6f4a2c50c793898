//! Wrapped CLI - Command-line interface for Photo Wrapped
//!
//! Commands:
//! - ingest: Merge a batch of observation documents into a store (batch mode)
//! - apply: Handle one storage notification against a store
//! - show: Print a user's summary
//! - validate: Validate observation documents
//! - doctor: Diagnose store health and summary invariants

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use photo_wrapped::dispatcher::{parse_documents, validate_documents, BatchFormat};
use photo_wrapped::normalizer::BucketBoundaries;
use photo_wrapped::pipeline::MergeReport;
use photo_wrapped::{
    FsDocumentStore, WrappedConfig, WrappedError, WrappedProcessor, PRODUCER_NAME,
    WRAPPED_VERSION,
};

/// Wrapped - Incremental per-user photo analytics
#[derive(Parser)]
#[command(name = "wrapped")]
#[command(version = WRAPPED_VERSION)]
#[command(about = "Fold photo observations into per-user wrapped summaries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a batch of observation documents into the store
    Ingest {
        /// Store root directory
        #[arg(short, long)]
        store: PathBuf,

        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format for merge reports
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Handle one storage notification (observation key relative to the store)
    Apply {
        /// Store root directory
        #[arg(short, long)]
        store: PathBuf,

        /// Notification file path (use - for stdin)
        #[arg(short, long)]
        event: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Print a user's summary
    Show {
        /// Store root directory
        #[arg(short, long)]
        store: PathBuf,

        /// User whose summary to print
        #[arg(short, long)]
        user: String,

        /// Pretty-print the summary
        #[arg(long)]
        pretty: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Validate observation documents
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose store health and summary invariants
    Doctor {
        /// Store root directory to check
        #[arg(long)]
        store: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

/// Engine settings shared by the store-backed commands
#[derive(Args, Clone)]
struct EngineArgs {
    /// Cap on busiest-day timeline entries
    #[arg(long, env = "MAX_TIMELINE", default_value_t = 24)]
    max_timeline: usize,

    /// Key prefix of observation documents
    #[arg(long, env = "META_PREFIX", default_value = "meta/")]
    meta_prefix: String,

    /// Key prefix of summary documents
    #[arg(long, env = "ANALYTICS_PREFIX", default_value = "analytics/")]
    analytics_prefix: String,

    /// Key prefix of thumbnails
    #[arg(long, env = "THUMB_PREFIX", default_value = "thumbs/")]
    thumb_prefix: String,

    /// Attempts before a contended update fails
    #[arg(long, env = "MAX_CAS_ATTEMPTS", default_value_t = 8)]
    max_cas_attempts: u32,

    /// Time-of-day boundary table
    #[arg(long, env = "TIME_BUCKETS", default_value = "standard")]
    time_buckets: TimeBuckets,
}

impl EngineArgs {
    fn to_config(&self) -> Result<WrappedConfig, WrappedCliError> {
        let config = WrappedConfig {
            max_timeline: self.max_timeline,
            meta_prefix: self.meta_prefix.clone(),
            analytics_prefix: self.analytics_prefix.clone(),
            thumb_prefix: self.thumb_prefix.clone(),
            max_cas_attempts: self.max_cas_attempts,
            bucket_boundaries: match self.time_buckets {
                TimeBuckets::Standard => BucketBoundaries::Standard,
                TimeBuckets::Alternate => BucketBoundaries::Alternate,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one observation per line)
    Ndjson,
    /// JSON array of observations
    Json,
}

impl From<&InputFormat> for BatchFormat {
    fn from(format: &InputFormat) -> Self {
        match format {
            InputFormat::Ndjson => BatchFormat::Ndjson,
            InputFormat::Json => BatchFormat::Json,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one report per line)
    Ndjson,
    /// JSON array of reports
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum TimeBuckets {
    /// Night >= 21 or < 5, Morning < 12, Afternoon < 17, else Evening
    Standard,
    /// Night < 6, Morning < 12, Afternoon < 18, else Evening
    Alternate,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr so stdout carries only JSON
fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("LOG_LEVEL")
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<(), WrappedCliError> {
    match cli.command {
        Commands::Ingest {
            store,
            input,
            input_format,
            output_format,
            engine,
        } => cmd_ingest(&store, &input, &input_format, &output_format, &engine),

        Commands::Apply {
            store,
            event,
            engine,
        } => cmd_apply(&store, &event, &engine),

        Commands::Show {
            store,
            user,
            pretty,
            engine,
        } => cmd_show(&store, &user, pretty, &engine),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, &input_format, json),

        Commands::Doctor {
            store,
            json,
            engine,
        } => cmd_doctor(store.as_deref(), json, &engine),
    }
}

fn open_processor(
    store: &Path,
    engine: &EngineArgs,
) -> Result<WrappedProcessor<FsDocumentStore>, WrappedCliError> {
    let config = engine.to_config()?;
    fs::create_dir_all(store)?;
    Ok(WrappedProcessor::with_config(
        FsDocumentStore::new(store),
        config,
    ))
}

fn read_input(input: &Path) -> Result<String, WrappedCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(WrappedCliError::StdinIsTerminal);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn cmd_ingest(
    store: &Path,
    input: &Path,
    input_format: &InputFormat,
    output_format: &OutputFormat,
    engine: &EngineArgs,
) -> Result<(), WrappedCliError> {
    let processor = open_processor(store, engine)?;

    let input_data = read_input(input)?;
    let documents = parse_documents(&input_data, input_format.into())?;

    if documents.is_empty() {
        return Err(WrappedCliError::NoObservations);
    }

    let batch = processor.ingest_batch(documents);
    info!(
        merged = batch.merged.len(),
        failed = batch.failed.len(),
        store = %store.display(),
        "ingest complete"
    );

    if !batch.merged.is_empty() {
        print!("{}", format_output(&batch.merged, output_format)?);
    }

    if batch.failed.is_empty() {
        Ok(())
    } else {
        Err(WrappedCliError::IngestFailed {
            merged: batch.merged.len(),
            failures: batch
                .failed
                .into_iter()
                .map(|f| ValidationErrorDetail {
                    index: f.index,
                    photo_id: f.photo_id,
                    error: f.error,
                })
                .collect(),
        })
    }
}

fn cmd_apply(store: &Path, event: &Path, engine: &EngineArgs) -> Result<(), WrappedCliError> {
    let processor = open_processor(store, engine)?;
    let notification = read_input(event)?;

    let outcome = processor.handle_notification(&notification)?;
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

fn cmd_show(
    store: &Path,
    user: &str,
    pretty: bool,
    engine: &EngineArgs,
) -> Result<(), WrappedCliError> {
    let processor = open_processor(store, engine)?;

    let summary = processor
        .summary(user)?
        .ok_or_else(|| WrappedCliError::NoSummary(user.to_string()))?;

    if pretty {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", serde_json::to_string(&summary)?);
    }
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: &InputFormat,
    json: bool,
) -> Result<(), WrappedCliError> {
    let input_data = read_input(input)?;
    let documents = parse_documents(&input_data, input_format.into())?;

    let failures = validate_documents(&documents);

    let report = ValidationReport {
        total_observations: documents.len(),
        valid_observations: documents.len() - failures.len(),
        invalid_observations: failures.len(),
        errors: failures
            .into_iter()
            .map(|f| ValidationErrorDetail {
                index: f.index,
                photo_id: f.photo_id,
                error: f.error,
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total observations:   {}", report.total_observations);
        println!("Valid observations:   {}", report.valid_observations);
        println!("Invalid observations: {}", report.invalid_observations);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Photo {} (index {}): {}",
                    err.photo_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_observations > 0 {
        Err(WrappedCliError::ValidationFailed(report.invalid_observations))
    } else {
        Ok(())
    }
}

fn cmd_doctor(
    store: Option<&Path>,
    json: bool,
    engine: &EngineArgs,
) -> Result<(), WrappedCliError> {
    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: WRAPPED_VERSION.to_string(),
        checks: doctor_checks(store, engine),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Wrapped Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(WrappedCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn doctor_checks(store: Option<&Path>, engine: &EngineArgs) -> Vec<DoctorCheck> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "wrapped_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Wrapped version {}", WRAPPED_VERSION),
    });

    let config = match engine.to_config() {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "max_timeline={} time_buckets={} max_cas_attempts={}",
                    config.max_timeline,
                    config.bucket_boundaries.as_str(),
                    config.max_cas_attempts
                ),
            });
            Some(config)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
            None
        }
    };

    if let (Some(root), Some(config)) = (store, config) {
        if root.is_dir() {
            let max_timeline = config.max_timeline;
            let processor = WrappedProcessor::with_config(FsDocumentStore::new(root), config);
            checks.extend(check_summaries(&processor, max_timeline));
        } else {
            checks.push(DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Warning,
                message: format!("Store root {} does not exist", root.display()),
            });
        }
    }

    checks
}

fn check_summaries(
    processor: &WrappedProcessor<FsDocumentStore>,
    max_timeline: usize,
) -> Vec<DoctorCheck> {
    let users = match processor.summaries().users() {
        Ok(users) => users,
        Err(e) => {
            return vec![DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot list summaries: {}", e),
            }]
        }
    };

    let mut checks = vec![DoctorCheck {
        name: "store".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} user summaries found", users.len()),
    }];

    for user in users {
        let check = match processor.summary(&user) {
            Ok(Some(summary)) => {
                let violations = summary.invariant_violations(max_timeline);
                if violations.is_empty() {
                    DoctorCheck {
                        name: format!("summary:{}", user),
                        status: CheckStatus::Ok,
                        message: format!("{} photos, invariants hold", summary.total_photos),
                    }
                } else {
                    DoctorCheck {
                        name: format!("summary:{}", user),
                        status: CheckStatus::Error,
                        message: violations.join("; "),
                    }
                }
            }
            Ok(None) => DoctorCheck {
                name: format!("summary:{}", user),
                status: CheckStatus::Warning,
                message: "Summary disappeared while checking".to_string(),
            },
            Err(e) => DoctorCheck {
                name: format!("summary:{}", user),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        };
        checks.push(check);
    }

    checks
}

// Helper functions

fn format_output(reports: &[MergeReport], format: &OutputFormat) -> Result<String, WrappedCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for report in reports {
                lines.push(serde_json::to_string(report)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(reports)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(reports)?),
    }
}

// Error types

#[derive(Debug)]
enum WrappedCliError {
    Io(io::Error),
    Engine(WrappedError),
    Json(serde_json::Error),
    NoObservations,
    NoSummary(String),
    StdinIsTerminal,
    IngestFailed {
        merged: usize,
        failures: Vec<ValidationErrorDetail>,
    },
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for WrappedCliError {
    fn from(e: io::Error) -> Self {
        WrappedCliError::Io(e)
    }
}

impl From<WrappedError> for WrappedCliError {
    fn from(e: WrappedError) -> Self {
        WrappedCliError::Engine(e)
    }
}

impl From<serde_json::Error> for WrappedCliError {
    fn from(e: serde_json::Error) -> Self {
        WrappedCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<WrappedCliError> for CliError {
    fn from(e: WrappedCliError) -> Self {
        match e {
            WrappedCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            WrappedCliError::Engine(e) => engine_error(e),
            WrappedCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            WrappedCliError::NoObservations => CliError {
                code: "NO_OBSERVATIONS".to_string(),
                message: "No observations found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            WrappedCliError::NoSummary(user) => CliError {
                code: "NO_SUMMARY".to_string(),
                message: format!("No summary stored for user {}", user),
                hint: Some("Ingest at least one observation for this user".to_string()),
            },
            WrappedCliError::StdinIsTerminal => CliError {
                code: "STDIN_IS_TERMINAL".to_string(),
                message: "Input is '-' but stdin is a terminal".to_string(),
                hint: Some("Pipe documents into the command or pass a file path".to_string()),
            },
            WrappedCliError::IngestFailed { merged, failures } => CliError {
                code: "INGEST_PARTIAL".to_string(),
                message: format!(
                    "{} merged, {} failed: {}",
                    merged,
                    failures.len(),
                    failures
                        .iter()
                        .map(|f| format!(
                            "index {} (photo {}): {}",
                            f.index,
                            f.photo_id.as_deref().unwrap_or("unknown"),
                            f.error
                        ))
                        .collect::<Vec<_>>()
                        .join("; ")
                ),
                hint: Some(
                    "Merged observations are persisted; resubmit only the failed ones".to_string(),
                ),
            },
            WrappedCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} observations failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            WrappedCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

fn engine_error(e: WrappedError) -> CliError {
    let (code, hint) = match &e {
        WrappedError::JsonError(_) | WrappedError::MalformedObservation(_) => (
            "PARSE_ERROR",
            "Run 'wrapped validate' on the observation documents",
        ),
        WrappedError::InvalidEvent(_) => ("INVALID_EVENT", "Check the notification format"),
        WrappedError::ObservationNotFound(_) => (
            "NOT_FOUND",
            "Observation keys are resolved relative to the store root",
        ),
        WrappedError::Store(_) => ("STORE_ERROR", "Check the store directory"),
        WrappedError::Conflict { .. } => (
            "CONFLICT",
            "Retry the event or raise --max-cas-attempts",
        ),
        WrappedError::CorruptSummary { .. } => (
            "CORRUPT_SUMMARY",
            "Run 'wrapped doctor' against the store",
        ),
        WrappedError::Config(_) => ("CONFIG_ERROR", "Check command-line flags and environment"),
    };

    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint: Some(hint.to_string()),
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_observations: usize,
    valid_observations: usize,
    invalid_observations: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    photo_id: Option<String>,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
