//! Batched, parallel scanning of a source log over its get-entries API.

use super::{EntryHandler, ScanError, ScanStats, Scanner};
use crate::client::LogSource;
use crate::config::ScanConfig;
use crate::entry::{EntryType, RawEntry};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;

/// Scans `[start_index, end_index)` of a source log in `batch_size` batches,
/// with up to `parallel_fetch` batches in flight.
pub struct LogScanner {
    source: Arc<dyn LogSource>,
    config: ScanConfig,
}

impl LogScanner {
    pub fn new(source: Arc<dyn LogSource>, config: ScanConfig) -> Self {
        Self { source, config }
    }

    async fn tree_size(&self) -> Result<u64, ScanError> {
        let sth = self.source.get_sth().await.map_err(ScanError::Sth)?;
        tracing::debug!("Got STH with tree size {}", sth.tree_size);
        Ok(sth.tree_size)
    }

    /// Split `[start, end)` into inclusive `(first, last)` batches.
    fn batches(&self, start: u64, end: u64) -> Vec<(u64, u64)> {
        let size = self.config.batch_size.max(1);
        let mut out = Vec::new();
        let mut first = start;
        while first < end {
            let last = first.saturating_add(size).min(end) - 1;
            out.push((first, last));
            first = last + 1;
        }
        out
    }

    async fn scan_range(
        &self,
        start: u64,
        end: u64,
        handler: &dyn EntryHandler,
    ) -> Result<ScanStats, ScanError> {
        let batches = self.batches(start, end);
        tracing::info!(
            "Scanning entries {}..{} in {} batches ({} parallel)",
            start,
            end,
            batches.len(),
            self.config.parallel_fetch
        );

        let initial = ScanStats {
            next_index: start,
            ..Default::default()
        };
        stream::iter(batches)
            .map(|(first, last)| self.fetch_batch(first, last, handler))
            .buffer_unordered(self.config.parallel_fetch.max(1))
            .try_fold(initial, |acc, batch| async move { Ok(acc.merge(batch)) })
            .await
    }

    /// Fetch `first..=last`, re-requesting the remainder when the log returns
    /// a short page, and dispatch each entry in index order.
    async fn fetch_batch(
        &self,
        first: u64,
        last: u64,
        handler: &dyn EntryHandler,
    ) -> Result<ScanStats, ScanError> {
        let mut stats = ScanStats {
            batches: 1,
            ..Default::default()
        };
        let mut next = first;
        while next <= last {
            let entries = self
                .source
                .get_entries(next, last)
                .await
                .map_err(|source| ScanError::Fetch {
                    start: next,
                    end: last,
                    source,
                })?;
            if entries.is_empty() {
                return Err(ScanError::EmptyBatch {
                    start: next,
                    end: last,
                });
            }
            tracing::trace!("Fetched {} entries starting at {}", entries.len(), next);
            next += entries.len() as u64;
            for entry in entries {
                dispatch(entry, handler, &mut stats).await?;
            }
        }
        stats.next_index = last + 1;
        Ok(stats)
    }

    /// Poll for a tree larger than `current`. `None` once the log looks idle.
    async fn wait_for_growth(&self, current: u64) -> Result<Option<u64>, ScanError> {
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        for poll in 1..=self.config.max_idle_polls {
            tokio::time::sleep(interval).await;
            let tree_size = self.tree_size().await?;
            if tree_size > current {
                return Ok(Some(tree_size));
            }
            tracing::debug!(
                "No new entries after poll {}/{} (tree size {})",
                poll,
                self.config.max_idle_polls,
                tree_size
            );
        }
        Ok(None)
    }
}

async fn dispatch(
    entry: RawEntry,
    handler: &dyn EntryHandler,
    stats: &mut ScanStats,
) -> Result<(), ScanError> {
    // Entries without a readable type go down the cert path, where
    // classification rejects them.
    match entry.entry_type() {
        Ok(EntryType::Precert) => {
            stats.precerts += 1;
            handler.on_precert(entry).await?;
        }
        _ => {
            stats.certs += 1;
            handler.on_cert(entry).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl Scanner for LogScanner {
    async fn scan(&self, handler: &dyn EntryHandler) -> Result<ScanStats, ScanError> {
        let start = self.config.start_index;
        let mut end = if self.config.end_index == 0 {
            self.tree_size().await?
        } else {
            self.config.end_index
        };
        if start > end {
            return Err(ScanError::StartBeyondTree {
                start,
                tree_size: end,
            });
        }

        let mut stats = ScanStats {
            next_index: start,
            ..Default::default()
        };
        let mut next = start;
        loop {
            if next < end {
                stats = stats.merge(self.scan_range(next, end, handler).await?);
                next = end;
            }
            if !self.config.continuous {
                break;
            }
            match self.wait_for_growth(next).await? {
                Some(tree_size) => end = tree_size,
                None => {
                    tracing::info!(
                        "No new STH after {} polls, stopping continuous scan at {}",
                        self.config.max_idle_polls,
                        next
                    );
                    break;
                }
            }
        }
        Ok(stats)
    }
}
