//! CT Log Preloader CLI
//!
//! Copies entries from one certificate-transparency log into another.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ct_preload::{build_runtime, io, run_preloader, Config};

const DEFAULT_CONFIG: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "ct-preload")]
#[command(about = "Replicate CT log entries into another log", long_about = None)]
struct Cli {
    /// Path to configuration file [default: config.yaml, if present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Flags that take precedence over the configuration file.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Source log URI
    #[arg(long, global = true)]
    source_uri: Option<String>,

    /// Destination log URI
    #[arg(long, global = true)]
    target_uri: Option<String>,

    /// Bearer token for the destination log
    #[arg(long, global = true, env = "CT_PRELOAD_BEARER_TOKEN", hide_env_values = true)]
    bearer_token: Option<String>,

    /// Temporal (sharded) destination log configuration
    #[arg(long, global = true)]
    temporal_config: Option<PathBuf>,

    /// Log index to start at
    #[arg(long, global = true)]
    start_index: Option<u64>,

    /// Log index to stop at, exclusive (0 = current tree size)
    #[arg(long, global = true)]
    end_index: Option<u64>,

    /// Keep polling for new entries once the range is done
    #[arg(long, global = true)]
    continuous: bool,

    /// Entries per get-entries request
    #[arg(long, global = true)]
    batch_size: Option<u64>,

    /// Concurrent get-entries requests
    #[arg(long, global = true)]
    parallel_fetch: Option<usize>,

    /// Submission workers per entry class
    #[arg(long, global = true)]
    parallel_submit: Option<usize>,

    /// Only submit precertificates
    #[arg(long, global = true)]
    precerts_only: bool,

    /// File to record SCTs and failures in
    #[arg(long, global = true)]
    sct_file: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(uri) = self.source_uri {
            config.source.log_uri = uri;
        }
        if let Some(uri) = self.target_uri {
            config.target.log_uri = uri;
        }
        if let Some(token) = self.bearer_token {
            config.target.bearer_token = Some(token);
        }
        if let Some(path) = self.temporal_config {
            config.target.temporal_config = Some(path);
        }
        if let Some(start) = self.start_index {
            config.scan.start_index = start;
        }
        if let Some(end) = self.end_index {
            config.scan.end_index = end;
        }
        if self.continuous {
            config.scan.continuous = true;
        }
        if let Some(n) = self.batch_size {
            config.scan.batch_size = n;
        }
        if let Some(n) = self.parallel_fetch {
            config.scan.parallel_fetch = n;
        }
        if let Some(n) = self.parallel_submit {
            config.submit.parallel_submit = n;
        }
        if self.precerts_only {
            config.submit.precerts_only = true;
        }
        if let Some(path) = self.sct_file {
            config.output.sct_file = Some(path);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the preloader (default if no command specified)
    Run,

    /// Validate configuration
    Validate,

    /// Print the records of an SCT file as JSON lines
    Dump {
        /// SCT file written by a previous run
        file: PathBuf,
    },

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Run) => run_command(cli.config, cli.overrides),

        Some(Commands::Validate) => {
            validate_command(cli.config, cli.overrides)?;
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::Dump { file }) => {
            dump_command(file)?;
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::GenerateConfig { output }) => {
            generate_config_command(output)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load the named config file, or `config.yaml` if none was named.
///
/// Only a missing default file falls back to built-in defaults.
fn load_config(config_path: Option<&PathBuf>, overrides: Overrides) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG);
            if path.exists() {
                Config::from_file(&path)?
            } else {
                tracing::debug!("{} not found, using defaults", DEFAULT_CONFIG);
                Config::default()
            }
        }
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn run_command(config_path: Option<PathBuf>, overrides: Overrides) -> Result<ExitCode> {
    let config = load_config(config_path.as_ref(), overrides)?;

    // Build and run Tokio runtime
    let runtime = build_runtime(config.processing.worker_threads)?;
    let report = runtime.block_on(async { run_preloader(config).await })?;

    match report.scan_error() {
        Some(e) => {
            tracing::error!("Scan did not complete: {}", e);
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

fn validate_command(config_path: Option<PathBuf>, overrides: Overrides) -> Result<()> {
    let config = load_config(config_path.as_ref(), overrides)?;
    if let Some(path) = &config.target.temporal_config {
        ct_preload::TemporalLogConfig::from_file(path)?;
    }
    println!("Configuration is valid");
    Ok(())
}

fn dump_command(file: PathBuf) -> Result<()> {
    let outcomes = io::read_outcome_file(&file)?;
    let mut added = 0u64;
    for outcome in &outcomes {
        if outcome.succeeded() {
            added += 1;
        }
        println!("{}", serde_json::to_string(outcome)?);
    }
    eprintln!(
        "{} records: {} added, {} failed",
        outcomes.len(),
        added,
        outcomes.len() as u64 - added
    );
    Ok(())
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    // Generate a commented YAML config
    let yaml = r#"# CT Log Preloader Configuration

# === SOURCE: Log to copy entries from ===
source:
  log_uri: "https://ct.googleapis.com/aviator"

  # Total time allowed for one get-sth/get-entries request
  request_timeout_secs: 10

# === TARGET: Log to submit entries to ===
# Choose ONE of: log_uri (single log) OR temporal_config (sharded log)
target:
  log_uri: "http://localhost:6962/preload"

  # Sharded destination; each shard accepts a notAfter range
  # temporal_config: "temporal.yaml"

  # Sent as "Authorization: Bearer <token>" (or set CT_PRELOAD_BEARER_TOKEN)
  # bearer_token: "secret"

  # Total time allowed for one add-chain request (0 = no limit)
  request_timeout_secs: 30

# === HTTP: Connection pool shared by both logs ===
http:
  connect_timeout_secs: 30
  pool_idle_timeout_secs: 90
  pool_max_idle_per_host: 10

# === SCAN: Which entries to copy ===
scan:
  start_index: 0

  # Exclusive; 0 = the source log's current tree size
  end_index: 0

  # Keep polling for new entries once the range is done (needs end_index: 0)
  continuous: false

  # Entries per get-entries request
  batch_size: 1000

  # Concurrent get-entries requests
  parallel_fetch: 2

  # Continuous mode: seconds between get-sth polls, and how many polls
  # without growth before stopping
  poll_interval_secs: 30
  max_idle_polls: 10

# === SUBMIT: Destination worker pools ===
submit:
  # Workers per entry class (certs and precerts each get this many)
  parallel_submit: 2

  # Queue capacity = buffer_factor * parallel_submit
  buffer_factor: 10

  # Skip final certificates and only submit precertificates
  precerts_only: false

# === OUTPUT: Where SCTs and failures are recorded ===
output:
  # Zlib-compressed JSON lines; omit to discard outcomes
  sct_file: "scts.zlib"

# === PROCESSING: Runtime tuning ===
processing:
  # Tokio async worker threads (null = num CPUs)
  # worker_threads: 8

  # Progress reporting interval in seconds
  metrics_interval_secs: 10
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}
