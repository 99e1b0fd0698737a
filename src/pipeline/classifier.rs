//! Entry classification: the scan callback that feeds the submitter pools.

use super::PipelineClosed;
use crate::entry::{EntryClass, ParseError, ParsedEntry, RawEntry};
use crate::scan::EntryHandler;
use async_trait::async_trait;

/// What happened to one raw entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Sent to the channel for this class.
    Queued(EntryClass),
    /// A certificate, dropped because only precerts are wanted.
    Skipped,
    /// Could not be decoded at all.
    Dropped,
}

/// Parses raw entries and sends them to the cert or precert channel.
///
/// Cheap to clone and safe to call from many scan tasks at once; the only
/// side effect is the channel send, which waits while the pool is saturated.
#[derive(Clone)]
pub struct Classifier {
    cert_tx: async_channel::Sender<ParsedEntry>,
    precert_tx: async_channel::Sender<ParsedEntry>,
    precerts_only: bool,
}

impl Classifier {
    pub fn new(
        cert_tx: async_channel::Sender<ParsedEntry>,
        precert_tx: async_channel::Sender<ParsedEntry>,
        precerts_only: bool,
    ) -> Self {
        Self {
            cert_tx,
            precert_tx,
            precerts_only,
        }
    }

    /// Resolve a raw entry into its class. Pure: the same input always
    /// yields the same result.
    pub fn classify(raw: &RawEntry) -> Result<ParsedEntry, ParseError> {
        raw.parse()
    }

    /// Classify and enqueue one entry.
    pub async fn route(&self, raw: RawEntry) -> Result<Routed, PipelineClosed> {
        let entry = match Self::classify(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!("Failed to parse entry at {}: {}", raw.index, e);
                return Ok(Routed::Dropped);
            }
        };

        let class = entry.class();
        let tx = match class {
            EntryClass::Cert if self.precerts_only => {
                tracing::trace!("Skipping cert at {} (precerts only)", entry.index);
                return Ok(Routed::Skipped);
            }
            EntryClass::Cert => &self.cert_tx,
            EntryClass::Precert => &self.precert_tx,
        };
        tx.send(entry).await.map_err(|_| PipelineClosed)?;
        Ok(Routed::Queued(class))
    }
}

#[async_trait]
impl EntryHandler for Classifier {
    async fn on_cert(&self, entry: RawEntry) -> Result<(), PipelineClosed> {
        self.route(entry).await.map(|_| ())
    }

    async fn on_precert(&self, entry: RawEntry) -> Result<(), PipelineClosed> {
        self.route(entry).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::der::test_support::{certificate, tbs};
    use crate::entry::tls::test_support::*;

    fn cert_raw(index: u64) -> RawEntry {
        RawEntry::new(
            index,
            x509_leaf(&certificate("c.example.com", "301231000000Z"), 1),
            x509_extra(&[b"issuer"]),
        )
    }

    fn precert_raw(index: u64) -> RawEntry {
        RawEntry::new(
            index,
            precert_leaf(&tbs("p.example.com", "301231000000Z"), 1),
            precert_extra(b"pre", &[b"issuer"]),
        )
    }

    fn classifier(precerts_only: bool) -> (
        Classifier,
        async_channel::Receiver<ParsedEntry>,
        async_channel::Receiver<ParsedEntry>,
    ) {
        let (cert_tx, cert_rx) = async_channel::bounded(8);
        let (precert_tx, precert_rx) = async_channel::bounded(8);
        (Classifier::new(cert_tx, precert_tx, precerts_only), cert_rx, precert_rx)
    }

    #[tokio::test]
    async fn test_routes_by_class() {
        let (c, cert_rx, precert_rx) = classifier(false);
        assert_eq!(c.route(cert_raw(1)).await.unwrap(), Routed::Queued(EntryClass::Cert));
        assert_eq!(c.route(precert_raw(2)).await.unwrap(), Routed::Queued(EntryClass::Precert));

        assert_eq!(cert_rx.recv().await.unwrap().index, 1);
        assert_eq!(precert_rx.recv().await.unwrap().index, 2);
        assert!(cert_rx.is_empty());
        assert!(precert_rx.is_empty());
    }

    #[tokio::test]
    async fn test_routing_follows_parsed_type_not_callback() {
        let (c, _cert_rx, precert_rx) = classifier(false);
        c.on_cert(precert_raw(4)).await.unwrap();
        assert_eq!(precert_rx.len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_parse_is_dropped() {
        let (c, cert_rx, precert_rx) = classifier(false);
        let raw = RawEntry::new(3, vec![0, 0, 1], Vec::new());
        assert_eq!(c.route(raw).await.unwrap(), Routed::Dropped);
        assert!(cert_rx.is_empty());
        assert!(precert_rx.is_empty());
    }

    #[tokio::test]
    async fn test_precerts_only_skips_certs() {
        let (c, cert_rx, precert_rx) = classifier(true);
        assert_eq!(c.route(cert_raw(1)).await.unwrap(), Routed::Skipped);
        assert_eq!(c.route(precert_raw(2)).await.unwrap(), Routed::Queued(EntryClass::Precert));
        assert!(cert_rx.is_empty());
        assert_eq!(precert_rx.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_channel_reports_pipeline_closed() {
        let (c, cert_rx, _precert_rx) = classifier(false);
        cert_rx.close();
        assert_eq!(c.route(cert_raw(1)).await, Err(PipelineClosed));
    }

    #[test]
    fn test_classification_is_idempotent() {
        for raw in [cert_raw(1), precert_raw(2)] {
            let first = Classifier::classify(&raw).unwrap();
            let second = Classifier::classify(&raw).unwrap();
            assert_eq!(first.class(), second.class());
            assert_eq!(first, second);
        }
    }
}
