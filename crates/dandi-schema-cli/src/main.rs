//! DANDI Schema CLI - migrate, validate and aggregate metadata records.
//!
//! Results are printed to stdout as JSON; logs go to stderr. The exit code
//! tells callers what went wrong:
//!
//! - 0: success
//! - 1: validation faults found
//! - 2: unsupported or invalid schema version
//! - 3: migration or aggregation failure
//! - 4: anything else (I/O, configuration, malformed JSON)

mod commands;
mod input;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dandi_schema::{InstanceConfig, MetadataPipeline, SchemaError};
use tracing::{debug, error, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "dandi-schema")]
#[command(about = "Migrate, validate and aggregate DANDI metadata records")]
#[command(version)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upgrade a dataset record to a newer schema version
    Migrate {
        /// JSON file holding the record
        file: PathBuf,

        /// Target version (defaults to the current version)
        #[arg(long)]
        to: Option<String>,
    },

    /// Check a record and print every fault found
    Validate {
        /// JSON file holding the record
        file: PathBuf,

        /// Record kind, e.g. Dandiset or PublishedAsset (defaults to the record's schemaKey)
        #[arg(long)]
        kind: Option<String>,

        /// Version to validate against (defaults to the record's schemaVersion)
        #[arg(long)]
        schema_version: Option<String>,

        /// Report missing required fields as warnings
        #[arg(long)]
        missing_ok: bool,
    },

    /// Summarize asset records from JSON, JSON array or JSON Lines files
    Aggregate {
        /// Files holding asset records
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging; stdout is reserved for results
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match run(args.command) {
        Ok(code) => code,
        Err(err) => {
            let code = exit_code(&err);
            error!("{:#}", err);
            ExitCode::from(code)
        }
    }
}

fn run(command: Command) -> Result<ExitCode> {
    let pipeline = MetadataPipeline::new(InstanceConfig::from_env()?)?;
    debug!(
        "Schema registry ready: current version {}",
        pipeline.registry().current_version()
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let code = match command {
        Command::Migrate { file, to } => {
            commands::migrate(&pipeline, &file, to.as_deref(), &mut out)?;
            ExitCode::SUCCESS
        }
        Command::Validate {
            file,
            kind,
            schema_version,
            missing_ok,
        } => {
            let request = commands::ValidateRequest {
                kind: kind.as_deref(),
                schema_version: schema_version.as_deref(),
                missing_ok,
            };
            if commands::validate(&pipeline, &file, request, &mut out)? {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Command::Aggregate { files } => {
            commands::aggregate(&files, &mut out)?;
            ExitCode::SUCCESS
        }
    };
    out.flush()?;
    Ok(code)
}

/// Map an error to the documented exit codes.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<SchemaError>()
        .map(|e| e.exit_code())
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(4)
}
