//! Staged replication pipeline.
//!
//! ```text
//!                            cert_rx    ┌────────────────────┐
//! ┌─────────┐   ┌────────────┐ ───────▶ │ cert submitters    │ ──┐
//! │ Scanner │──▶│ Classifier │          └────────────────────┘   │ outcome_rx  ┌──────────┐
//! └─────────┘   └────────────┘ ───────▶ ┌────────────────────┐   ├───────────▶ │ Recorder │
//!                            precert_rx │ precert submitters │ ──┘             └──────────┘
//!                                       └────────────────────┘
//! ```
//!
//! All channels are bounded, so a slow destination log throttles the scan.
//! Shutdown runs strictly downstream: the scan ends, the class channels are
//! closed and the submitters drain them, the last outcome sender is dropped
//! and the recorder drains, then the sink is closed.

use super::{Classifier, Outcome, Recorder, RecorderStats, Submitter};
use crate::client::AddChainClient;
use crate::config::Config;
use crate::entry::{EntryClass, ParsedEntry};
use crate::io::OutcomeSink;
use crate::scan::{ScanError, ScanStats, Scanner};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for the submission side of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Workers per class.
    pub submit_parallelism: usize,
    /// Capacity of each class channel and of the outcome channel.
    pub channel_capacity: usize,
    /// Drop certificate entries at classification.
    pub precerts_only: bool,
    /// How often the recorder logs progress.
    pub report_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            submit_parallelism: 2,
            channel_capacity: 20,
            precerts_only: false,
            report_interval: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            submit_parallelism: config.submit.parallel_submit,
            channel_capacity: config.submit.channel_capacity(),
            precerts_only: config.submit.precerts_only,
            report_interval: Duration::from_secs(config.processing.metrics_interval_secs),
        }
    }
}

/// Pipeline executor.
pub struct Pipeline {
    client: Arc<dyn AddChainClient>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(client: Arc<dyn AddChainClient>, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    /// Run one scan through the pipeline.
    ///
    /// Returns `Err` only for conditions that end the run early: a sink
    /// failure or a panicked task. A failed scan still drains everything it
    /// dispatched and is reported in [`PipelineReport::scan`].
    pub async fn run(&self, scanner: &dyn Scanner, sink: Box<dyn OutcomeSink>) -> Result<PipelineReport> {
        let capacity = self.config.channel_capacity.max(1);
        let workers = self.config.submit_parallelism.max(1);

        // Setup: consumers first, so nothing is sent before someone can receive.
        let (cert_tx, cert_rx) = async_channel::bounded::<ParsedEntry>(capacity);
        let (precert_tx, precert_rx) = async_channel::bounded::<ParsedEntry>(capacity);
        let (outcome_tx, outcome_rx) = mpsc::channel::<Outcome>(capacity);
        let shutdown = CancellationToken::new();

        let recorder = Recorder::new(sink, self.config.report_interval);
        let recorder_shutdown = shutdown.clone();
        let recorder_handle =
            tokio::task::spawn_blocking(move || recorder.run(outcome_rx, recorder_shutdown));

        let mut submitters =
            Submitter::spawn_pool(EntryClass::Cert, workers, &self.client, &cert_rx, &outcome_tx);
        submitters.extend(Submitter::spawn_pool(
            EntryClass::Precert,
            workers,
            &self.client,
            &precert_rx,
            &outcome_tx,
        ));
        drop(cert_rx);
        drop(precert_rx);
        tracing::info!(
            "Started {} cert and {} precert submitters (channel capacity {})",
            workers,
            workers,
            capacity
        );

        // Scanning
        let classifier = Classifier::new(cert_tx.clone(), precert_tx.clone(), self.config.precerts_only);
        let scan = tokio::select! {
            result = scanner.scan(&classifier) => result,
            _ = shutdown.cancelled() => {
                tracing::warn!("Outcome recording failed, abandoning scan");
                Err(ScanError::Aborted)
            }
        };
        drop(classifier);
        match &scan {
            Ok(stats) => tracing::info!("Scan finished: {}", stats),
            Err(e) => tracing::error!("Scan failed: {}", e),
        }

        // Drain class channels
        cert_tx.close();
        precert_tx.close();
        let mut submitted = 0u64;
        let mut panicked = None;
        for handle in submitters {
            match handle.await {
                Ok(n) => submitted += n,
                Err(e) => {
                    panicked.get_or_insert(e);
                }
            }
        }
        tracing::debug!("All submitters finished, {} entries submitted", submitted);

        // Drain outcomes
        drop(outcome_tx);
        let recorded = recorder_handle.await.context("Outcome recorder task failed")?;
        if let Some(e) = panicked {
            return Err(e).context("Submitter task failed");
        }
        let (stats, sink) = recorded.context("Failed to record outcome")?;

        // Terminal
        sink.finish().context("Failed to close outcome sink")?;

        Ok(PipelineReport { stats, scan })
    }
}

/// Result of a pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub stats: RecorderStats,
    pub scan: Result<ScanStats, ScanError>,
}

impl PipelineReport {
    pub fn scan_error(&self) -> Option<&ScanError> {
        self.scan.as_ref().err()
    }
}

impl std::fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.scan {
            Ok(scan) => write!(f, "{} ({})", self.stats, scan),
            Err(e) => write!(f, "{} (scan failed: {})", self.stats, e),
        }
    }
}
