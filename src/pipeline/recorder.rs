//! Single-consumer outcome recorder.
//!
//! The recorder owns the sink and the counters outright, so no locking is
//! needed. It runs on a blocking thread because sink writes are synchronous
//! file I/O.

use super::Outcome;
use crate::io::{OutcomeSink, SinkError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Outcome counters. `added + failed` equals the number of outcomes recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub added: u64,
    pub failed: u64,
}

impl RecorderStats {
    pub fn total(&self) -> u64 {
        self.added + self.failed
    }
}

impl std::fmt::Display for RecorderStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Added {} certs, {} failed, total: {}",
            self.added,
            self.failed,
            self.total()
        )
    }
}

pub struct Recorder {
    sink: Box<dyn OutcomeSink>,
    stats: RecorderStats,
    report_interval: Duration,
    last_report: Instant,
}

impl Recorder {
    pub fn new(sink: Box<dyn OutcomeSink>, report_interval: Duration) -> Self {
        Self {
            sink,
            stats: RecorderStats::default(),
            report_interval,
            last_report: Instant::now(),
        }
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    /// Write one outcome and count it. Counters only move once the write
    /// has succeeded.
    pub fn record(&mut self, outcome: &Outcome) -> Result<(), SinkError> {
        self.sink.write(outcome)?;
        if outcome.succeeded() {
            self.stats.added += 1;
        } else {
            self.stats.failed += 1;
        }
        Ok(())
    }

    /// Consume outcomes until every sender is gone, then hand back the
    /// counters and the sink for closing.
    ///
    /// A write failure trips `shutdown` so the rest of the pipeline stops
    /// feeding work, and is returned as the recorder's result. Must be
    /// called off the async runtime.
    pub fn run(
        mut self,
        mut outcomes: mpsc::Receiver<Outcome>,
        shutdown: CancellationToken,
    ) -> Result<(RecorderStats, Box<dyn OutcomeSink>), SinkError> {
        while let Some(outcome) = outcomes.blocking_recv() {
            if let Err(e) = self.record(&outcome) {
                tracing::error!(
                    "Failed to record outcome for {} {}: {}",
                    outcome.class(),
                    outcome.index(),
                    e
                );
                shutdown.cancel();
                return Err(e);
            }
            if self.last_report.elapsed() >= self.report_interval {
                tracing::info!("Progress: {}", self.stats);
                self.last_report = Instant::now();
            }
        }

        tracing::info!("{}", self.stats);
        Ok((self.stats, self.sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SignedCertificateTimestamp;
    use crate::entry::EntryClass;
    use std::io;

    struct FailingSink;

    impl OutcomeSink for FailingSink {
        fn write(&mut self, _outcome: &Outcome) -> Result<(), SinkError> {
            Err(SinkError::Io(io::Error::other("disk full")))
        }

        fn finish(self: Box<Self>) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn sct() -> SignedCertificateTimestamp {
        SignedCertificateTimestamp {
            sct_version: 0,
            id: vec![0; 32],
            timestamp: 1,
            extensions: Vec::new(),
            signature: Vec::new(),
        }
    }

    fn discard() -> Box<dyn OutcomeSink> {
        Box::new(crate::io::ZlibJsonSink::new(io::sink()))
    }

    #[test]
    fn test_stats_display() {
        let stats = RecorderStats { added: 4, failed: 1 };
        assert_eq!(stats.total(), 5);
        assert_eq!(stats.to_string(), "Added 4 certs, 1 failed, total: 5");
    }

    #[test]
    fn test_record_counts_by_result() {
        let mut recorder = Recorder::new(discard(), Duration::from_secs(60));
        recorder.record(&Outcome::success(1, EntryClass::Cert, vec![], sct())).unwrap();
        recorder.record(&Outcome::failure(2, EntryClass::Cert, vec![], "x")).unwrap();
        recorder.record(&Outcome::success(3, EntryClass::Precert, vec![], sct())).unwrap();
        assert_eq!(recorder.stats(), RecorderStats { added: 2, failed: 1 });
    }

    #[test]
    fn test_failed_write_does_not_count() {
        let mut recorder = Recorder::new(Box::new(FailingSink), Duration::from_secs(60));
        assert!(recorder.record(&Outcome::success(1, EntryClass::Cert, vec![], sct())).is_err());
        assert_eq!(recorder.stats().total(), 0);
    }

    #[tokio::test]
    async fn test_run_drains_until_senders_dropped() {
        let (tx, rx) = mpsc::channel(4);
        let recorder = Recorder::new(discard(), Duration::ZERO);
        let handle = tokio::task::spawn_blocking(move || recorder.run(rx, CancellationToken::new()));

        for i in 0..10 {
            tx.send(Outcome::failure(i, EntryClass::Cert, vec![], "x")).await.unwrap();
        }
        drop(tx);

        let (stats, sink) = handle.await.unwrap().unwrap();
        assert_eq!(stats, RecorderStats { added: 0, failed: 10 });
        sink.finish().unwrap();
    }

    #[tokio::test]
    async fn test_sink_failure_cancels_pipeline() {
        let (tx, rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let recorder = Recorder::new(Box::new(FailingSink), Duration::ZERO);
        let token = shutdown.clone();
        let handle = tokio::task::spawn_blocking(move || recorder.run(rx, token));

        tx.send(Outcome::failure(0, EntryClass::Cert, vec![], "x")).await.unwrap();
        assert!(handle.await.unwrap().is_err());
        assert!(shutdown.is_cancelled());
        assert!(tx.send(Outcome::failure(1, EntryClass::Cert, vec![], "x")).await.is_err());
    }
}
