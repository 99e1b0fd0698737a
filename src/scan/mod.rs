//! Scanning the source log.
//!
//! A [`Scanner`] walks a range of the source log and hands every entry to an
//! [`EntryHandler`], choosing `on_cert` or `on_precert` from the leaf's entry
//! type. Handlers may be called concurrently from several fetch tasks.

mod fetcher;

pub use fetcher::LogScanner;

use crate::client::ClientError;
use crate::entry::RawEntry;
use crate::pipeline::PipelineClosed;
use async_trait::async_trait;
use thiserror::Error;

/// Receives entries from a scan.
///
/// Both callbacks may block to apply backpressure. An `Err` tells the scanner
/// that nothing downstream will accept entries any more.
#[async_trait]
pub trait EntryHandler: Send + Sync {
    async fn on_cert(&self, entry: RawEntry) -> Result<(), PipelineClosed>;

    async fn on_precert(&self, entry: RawEntry) -> Result<(), PipelineClosed>;
}

/// Produces entries from a source log.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scan until the configured range is exhausted or, in continuous mode,
    /// until the scanner decides the log has stopped growing.
    async fn scan(&self, handler: &dyn EntryHandler) -> Result<ScanStats, ScanError>;
}

/// Scan-level failure. Entries dispatched before it still drain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("failed to get STH: {0}")]
    Sth(#[source] ClientError),

    #[error("failed to get entries {start}..={end}: {source}")]
    Fetch {
        start: u64,
        end: u64,
        #[source]
        source: ClientError,
    },

    #[error("log returned no entries for {start}..={end}")]
    EmptyBatch { start: u64, end: u64 },

    #[error("start index {start} is beyond tree size {tree_size}")]
    StartBeyondTree { start: u64, tree_size: u64 },

    #[error("pipeline stopped accepting entries")]
    Aborted,
}

impl From<PipelineClosed> for ScanError {
    fn from(_: PipelineClosed) -> Self {
        ScanError::Aborted
    }
}

/// What a scan dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub batches: u64,
    pub certs: u64,
    pub precerts: u64,
    /// First index not scanned.
    pub next_index: u64,
}

impl ScanStats {
    pub fn entries(&self) -> u64 {
        self.certs + self.precerts
    }

    fn merge(mut self, other: ScanStats) -> Self {
        self.batches += other.batches;
        self.certs += other.certs;
        self.precerts += other.precerts;
        self.next_index = self.next_index.max(other.next_index);
        self
    }
}

impl std::fmt::Display for ScanStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Batches: {}, Certs: {}, Precerts: {}, Next index: {}",
            self.batches, self.certs, self.precerts, self.next_index
        )
    }
}
