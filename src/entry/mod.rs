//! Log entries as fetched from the source log and as resolved for submission.

pub mod der;
pub(crate) mod tls;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// `LogEntryType` from RFC 6962.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    X509,
    Precert,
    Unknown(u16),
}

impl From<u16> for EntryType {
    fn from(value: u16) -> Self {
        match value {
            0 => EntryType::X509,
            1 => EntryType::Precert,
            other => EntryType::Unknown(other),
        }
    }
}

/// The two classes of entry the pipeline submits, one worker pool each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryClass {
    Cert,
    Precert,
}

impl fmt::Display for EntryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryClass::Cert => write!(f, "cert"),
            EntryClass::Precert => write!(f, "precert"),
        }
    }
}

/// Fatal entry decoding failure. The entry cannot be classified and is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{what} truncated at offset {offset} (wanted {wanted} bytes)")]
    Truncated {
        what: &'static str,
        offset: usize,
        wanted: usize,
    },

    #[error("{what} has {remaining} trailing bytes")]
    TrailingData { what: &'static str, remaining: usize },

    #[error("unsupported leaf version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown leaf type {0}")]
    UnknownLeafType(u8),

    #[error("unknown entry type {0}")]
    UnknownEntryType(u16),

    #[error("empty certificate in {what}")]
    EmptyCertificate { what: &'static str },
}

/// An entry exactly as delivered by the source log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub index: u64,
    pub leaf_input: Vec<u8>,
    pub extra_data: Vec<u8>,
}

impl RawEntry {
    pub fn new(index: u64, leaf_input: Vec<u8>, extra_data: Vec<u8>) -> Self {
        Self {
            index,
            leaf_input,
            extra_data,
        }
    }

    /// Entry type from the leaf header, without decoding the rest.
    pub fn entry_type(&self) -> Result<EntryType, ParseError> {
        tls::peek_entry_type(&self.leaf_input)
    }

    /// Decode leaf and extra data into a [`ParsedEntry`].
    pub fn parse(&self) -> Result<ParsedEntry, ParseError> {
        let leaf = tls::parse_leaf(&self.leaf_input)?;
        let kind = match leaf.entry {
            tls::LeafEntry::X509 { cert } => ParsedEntryKind::Cert(CertEntry {
                cert: cert.to_vec(),
                chain: tls::parse_x509_extra(&self.extra_data)?,
            }),
            tls::LeafEntry::Precert { tbs_certificate } => {
                let (submitted, chain) = tls::parse_precert_extra(&self.extra_data)?;
                let tbs_subject = match der::summarize_tbs(tbs_certificate) {
                    Ok(summary) => summary.subject_cn,
                    Err(e) => {
                        tracing::debug!("Unreadable TBSCertificate at {}: {}", self.index, e);
                        None
                    }
                };
                ParsedEntryKind::Precert(PrecertEntry {
                    submitted,
                    tbs_subject,
                    chain,
                })
            }
        };
        Ok(ParsedEntry {
            index: self.index,
            timestamp: leaf.timestamp,
            kind,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertEntry {
    pub cert: Vec<u8>,
    pub chain: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecertEntry {
    /// The precertificate as submitted to the source log (poisoned, signed).
    pub submitted: Vec<u8>,
    /// Subject CN from the leaf's TBSCertificate, if it could be read.
    pub tbs_subject: Option<String>,
    pub chain: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEntryKind {
    Cert(CertEntry),
    Precert(PrecertEntry),
}

/// A classified entry, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub index: u64,
    /// Source log timestamp in milliseconds.
    pub timestamp: u64,
    pub kind: ParsedEntryKind,
}

impl ParsedEntry {
    pub fn class(&self) -> EntryClass {
        match self.kind {
            ParsedEntryKind::Cert(_) => EntryClass::Cert,
            ParsedEntryKind::Precert(_) => EntryClass::Precert,
        }
    }

    /// Subject CN for log lines. Never fails.
    pub fn subject(&self) -> String {
        let cn = match &self.kind {
            ParsedEntryKind::Cert(c) => der::summarize_certificate(&c.cert)
                .ok()
                .and_then(|s| s.subject_cn),
            ParsedEntryKind::Precert(p) => p.tbs_subject.clone(),
        };
        cn.unwrap_or_default()
    }

    /// Build the chain to submit: the entry's own certificate followed by its issuers.
    pub fn into_submission(self) -> SubmissionChain {
        let (leaf, issuers) = match self.kind {
            ParsedEntryKind::Cert(c) => (c.cert, c.chain),
            ParsedEntryKind::Precert(p) => (p.submitted, p.chain),
        };
        SubmissionChain::new(leaf, issuers)
    }
}

/// Non-empty chain of DER certificates, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionChain {
    certs: Vec<Vec<u8>>,
}

impl SubmissionChain {
    pub fn new(leaf: Vec<u8>, issuers: Vec<Vec<u8>>) -> Self {
        let mut certs = Vec::with_capacity(issuers.len() + 1);
        certs.push(leaf);
        certs.extend(issuers);
        Self { certs }
    }

    pub fn leaf(&self) -> &[u8] {
        &self.certs[0]
    }

    pub fn certs(&self) -> &[Vec<u8>] {
        &self.certs
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::der::test_support::{certificate, tbs};
    use super::tls::test_support::*;
    use super::*;

    fn cert_raw(index: u64) -> RawEntry {
        let cert = certificate("leaf.example.com", "301231000000Z");
        RawEntry::new(index, x509_leaf(&cert, 1000), x509_extra(&[b"issuer"]))
    }

    fn precert_raw(index: u64) -> RawEntry {
        let tbs = tbs("pre.example.com", "301231000000Z");
        RawEntry::new(
            index,
            precert_leaf(&tbs, 2000),
            precert_extra(b"submitted-precert", &[b"precert-issuer", b"root"]),
        )
    }

    #[test]
    fn test_parse_cert_entry() {
        let parsed = cert_raw(7).parse().unwrap();
        assert_eq!(parsed.index, 7);
        assert_eq!(parsed.timestamp, 1000);
        assert_eq!(parsed.class(), EntryClass::Cert);
        assert_eq!(parsed.subject(), "leaf.example.com");
    }

    #[test]
    fn test_parse_precert_entry() {
        let parsed = precert_raw(9).parse().unwrap();
        assert_eq!(parsed.class(), EntryClass::Precert);
        match &parsed.kind {
            ParsedEntryKind::Precert(p) => {
                assert_eq!(p.tbs_subject.as_deref(), Some("pre.example.com"));
                assert_eq!(p.submitted, b"submitted-precert".to_vec());
                assert_eq!(p.chain.len(), 2);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_tbs_is_not_fatal() {
        let raw = RawEntry::new(1, precert_leaf(b"junk", 1), precert_extra(b"pre", &[]));
        let parsed = raw.parse().unwrap();
        assert_eq!(parsed.subject(), "");
    }

    #[test]
    fn test_mismatched_extra_data_is_fatal() {
        let mut raw = cert_raw(3);
        raw.extra_data = vec![0, 0, 9, 1];
        assert!(raw.parse().is_err());
    }

    #[test]
    fn test_submission_chain_puts_leaf_first() {
        let chain = precert_raw(1).parse().unwrap().into_submission();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.leaf(), b"submitted-precert");
        assert_eq!(chain.certs()[2], b"root".to_vec());

        let chain = cert_raw(1).parse().unwrap().into_submission();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.certs()[1], b"issuer".to_vec());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = precert_raw(5);
        assert_eq!(raw.parse().unwrap(), raw.parse().unwrap());
    }
}
