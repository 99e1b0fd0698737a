//! CT Log Preloader
//!
//! Replicates certificate-transparency log entries from a source log into a
//! destination log, recording the SCT (or the failure) for every entry.
//!
//! # Architecture
//!
//! The preloader consists of:
//!
//! - **Entry**: RFC 6962 leaf decoding and chain assembly
//! - **Client**: `get-sth`/`get-entries` reads and `add-chain`/`add-pre-chain` submissions
//! - **Scan**: Batched, parallel walking of the source log
//! - **Pipeline**: Classification, per-class submission pools and outcome recording
//! - **I/O**: Zlib-compressed outcome file
//!
//! # Usage
//!
//! ```no_run
//! use ct_preload::{Config, run_preloader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(&"config.yaml".into())?;
//!     let report = run_preloader(config).await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod entry;
pub mod io;
pub mod pipeline;
pub mod scan;

pub use client::{AddChainClient, LogClient, LogSource, TemporalLogClient, TemporalLogConfig};
pub use config::Config;
pub use entry::{EntryClass, ParsedEntry, RawEntry};
pub use pipeline::{Outcome, Pipeline, PipelineConfig, PipelineReport};
pub use scan::{LogScanner, Scanner};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Build the destination client: a temporal shard set when configured,
/// otherwise a single log.
pub fn build_target_client(config: &Config) -> Result<Arc<dyn AddChainClient>> {
    let timeout = match config.target.request_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let http = client::build_http_client(&config.http, timeout)?;
    let bearer = config.target.bearer_token.clone();

    if let Some(path) = &config.target.temporal_config {
        let temporal = TemporalLogConfig::from_file(path)
            .with_context(|| format!("Failed to load temporal log config {}", path.display()))?;
        tracing::info!("Submitting to temporal log with {} shards", temporal.shards.len());
        return Ok(Arc::new(TemporalLogClient::new(&temporal, http, bearer)?));
    }

    let target = LogClient::new(&config.target.log_uri, http, bearer)?;
    tracing::info!("Submitting to {}", target.uri());
    Ok(Arc::new(target))
}

/// Build the scanner over the source log.
pub fn build_scanner(config: &Config) -> Result<LogScanner> {
    let timeout = Duration::from_secs(config.source.request_timeout_secs);
    let http = client::build_http_client(&config.http, Some(timeout))?;
    let source = LogClient::new(&config.source.log_uri, http, None)?;
    tracing::info!("Reading from {}", source.uri());
    Ok(LogScanner::new(Arc::new(source), config.scan.clone()))
}

/// Run the full preloader with the given configuration.
///
/// Setup failures abort before any entry is fetched. A scan failure is not an
/// error here: it is carried in the report once everything already fetched
/// has been submitted and recorded.
pub async fn run_preloader(config: Config) -> Result<PipelineReport> {
    config.validate()?;

    tracing::info!("Starting CT log preloader");

    let scanner = build_scanner(&config).context("Failed to create source log client")?;
    let target = build_target_client(&config).context("Failed to create destination log client")?;
    let sink = io::open_sink(&config.output).context("Failed to open SCT file")?;

    tracing::info!(
        "Scanning from index {} to {}{}",
        config.scan.start_index,
        match config.scan.end_index {
            0 => "tree size".to_string(),
            end => end.to_string(),
        },
        if config.scan.continuous { " (continuous)" } else { "" }
    );

    let pipeline = Pipeline::new(target, PipelineConfig::from(&config));
    let report = pipeline.run(&scanner, sink).await?;

    tracing::info!("Preloader complete: {}", report);

    Ok(report)
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}
