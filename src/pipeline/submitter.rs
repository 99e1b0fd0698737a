//! Submission workers: one pool per entry class, each worker pulling from the
//! shared class channel until it is closed and drained.

use super::Outcome;
use crate::client::AddChainClient;
use crate::entry::{EntryClass, ParsedEntry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Submits entries of one class to the destination log and reports exactly
/// one [`Outcome`] per entry consumed.
pub struct Submitter {
    id: usize,
    class: EntryClass,
    client: Arc<dyn AddChainClient>,
    outcome_tx: mpsc::Sender<Outcome>,
}

impl Submitter {
    pub fn new(
        id: usize,
        class: EntryClass,
        client: Arc<dyn AddChainClient>,
        outcome_tx: mpsc::Sender<Outcome>,
    ) -> Self {
        Self {
            id,
            class,
            client,
            outcome_tx,
        }
    }

    /// Spawn `workers` submitters sharing one receiver.
    pub fn spawn_pool(
        class: EntryClass,
        workers: usize,
        client: &Arc<dyn AddChainClient>,
        entries: &async_channel::Receiver<ParsedEntry>,
        outcome_tx: &mpsc::Sender<Outcome>,
    ) -> Vec<JoinHandle<u64>> {
        (0..workers)
            .map(|id| {
                let submitter = Submitter::new(id, class, client.clone(), outcome_tx.clone());
                tokio::spawn(submitter.run(entries.clone()))
            })
            .collect()
    }

    /// Submit one entry. Never fails: a rejected submission becomes a
    /// failure outcome.
    pub async fn submit(&self, entry: ParsedEntry) -> Outcome {
        let subject = entry.subject();
        let index = entry.index;
        let class = entry.class();
        let chain = entry.into_submission();

        let result = match class {
            EntryClass::Cert => self.client.add_chain(&chain).await,
            EntryClass::Precert => self.client.add_pre_chain(&chain).await,
        };
        let leaf = chain.leaf().to_vec();
        match result {
            Ok(sct) => {
                tracing::debug!("Added chain for CN '{}' ({} {}), SCT: {}", subject, class, index, sct);
                Outcome::success(index, class, leaf, sct)
            }
            Err(e) => {
                tracing::error!("Failed to add chain for CN '{}' ({} {}): {}", subject, class, index, e);
                Outcome::failure(index, class, leaf, e.to_string())
            }
        }
    }

    /// Worker loop. Returns the number of entries submitted.
    pub async fn run(self, entries: async_channel::Receiver<ParsedEntry>) -> u64 {
        let mut submitted = 0u64;
        while let Ok(entry) = entries.recv().await {
            let outcome = self.submit(entry).await;
            submitted += 1;
            if self.outcome_tx.send(outcome).await.is_err() {
                tracing::debug!(
                    "{} submitter {}: outcome receiver dropped, stopping",
                    self.class,
                    self.id
                );
                break;
            }
        }
        tracing::debug!("{} submitter {} finished after {} entries", self.class, self.id, submitted);
        submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, SignedCertificateTimestamp};
    use crate::entry::der::test_support::{certificate, tbs};
    use crate::entry::tls::test_support::*;
    use crate::entry::{RawEntry, SubmissionChain};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records which endpoint each chain went to; rejects leaves equal to `reject`.
    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(&'static str, usize)>>,
        reject: Option<Vec<u8>>,
    }

    impl Recording {
        fn answer(
            &self,
            endpoint: &'static str,
            chain: &SubmissionChain,
        ) -> Result<SignedCertificateTimestamp, ClientError> {
            self.calls.lock().unwrap().push((endpoint, chain.len()));
            if self.reject.as_deref() == Some(chain.leaf()) {
                return Err(ClientError::Http {
                    status: 400,
                    body: "bad chain".to_string(),
                });
            }
            Ok(SignedCertificateTimestamp {
                sct_version: 0,
                id: vec![0; 32],
                timestamp: 1,
                extensions: Vec::new(),
                signature: vec![1],
            })
        }
    }

    #[async_trait]
    impl AddChainClient for Recording {
        async fn add_chain(
            &self,
            chain: &SubmissionChain,
        ) -> Result<SignedCertificateTimestamp, ClientError> {
            self.answer("add-chain", chain)
        }

        async fn add_pre_chain(
            &self,
            chain: &SubmissionChain,
        ) -> Result<SignedCertificateTimestamp, ClientError> {
            self.answer("add-pre-chain", chain)
        }
    }

    fn cert_entry(index: u64) -> ParsedEntry {
        let leaf = certificate("a.example.com", "301231000000Z");
        RawEntry::new(index, x509_leaf(&leaf, 1), x509_extra(&[b"i1", b"i2"]))
            .parse()
            .unwrap()
    }

    fn precert_entry(index: u64) -> ParsedEntry {
        let t = tbs("b.example.com", "301231000000Z");
        RawEntry::new(index, precert_leaf(&t, 1), precert_extra(b"pre", &[b"i1"]))
            .parse()
            .unwrap()
    }

    fn submitter(class: EntryClass, client: Arc<Recording>) -> (Submitter, mpsc::Receiver<Outcome>) {
        let (tx, rx) = mpsc::channel(16);
        (Submitter::new(0, class, client, tx), rx)
    }

    #[tokio::test]
    async fn test_cert_goes_to_add_chain() {
        let client = Arc::new(Recording::default());
        let (s, _rx) = submitter(EntryClass::Cert, client.clone());
        let outcome = s.submit(cert_entry(5)).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.index(), 5);
        assert_eq!(outcome.class(), EntryClass::Cert);
        assert_eq!(*client.calls.lock().unwrap(), vec![("add-chain", 3)]);
    }

    #[tokio::test]
    async fn test_precert_goes_to_add_pre_chain_with_submitted_leaf() {
        let client = Arc::new(Recording::default());
        let (s, _rx) = submitter(EntryClass::Precert, client.clone());
        let outcome = s.submit(precert_entry(6)).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.certificate_der(), b"pre");
        assert_eq!(*client.calls.lock().unwrap(), vec![("add-pre-chain", 2)]);
    }

    #[tokio::test]
    async fn test_rejection_becomes_failure_outcome() {
        let client = Arc::new(Recording {
            reject: Some(b"pre".to_vec()),
            ..Default::default()
        });
        let (s, _rx) = submitter(EntryClass::Precert, client);
        let outcome = s.submit(precert_entry(7)).await;

        assert!(!outcome.succeeded());
        assert!(outcome.error_message().unwrap().contains("400"));
    }

    #[tokio::test]
    async fn test_worker_drains_channel_until_closed() {
        let client = Arc::new(Recording::default());
        let (s, mut rx) = submitter(EntryClass::Cert, client);
        let (entry_tx, entry_rx) = async_channel::bounded(4);
        for i in 0..3 {
            entry_tx.send(cert_entry(i)).await.unwrap();
        }
        entry_tx.close();

        assert_eq!(s.run(entry_rx).await, 3);
        let mut indices = Vec::new();
        while let Some(o) = rx.recv().await {
            indices.push(o.index());
        }
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_worker_stops_when_outcomes_dropped() {
        let client = Arc::new(Recording::default());
        let (s, rx) = submitter(EntryClass::Cert, client);
        drop(rx);
        let (entry_tx, entry_rx) = async_channel::bounded(4);
        entry_tx.send(cert_entry(0)).await.unwrap();
        entry_tx.send(cert_entry(1)).await.unwrap();

        assert_eq!(s.run(entry_rx).await, 1);
    }
}
