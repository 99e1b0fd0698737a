//! CT log clients.
//!
//! The pipeline talks to the destination log through [`AddChainClient`] and the
//! scanner reads the source log through [`LogSource`]. Both are traits so tests
//! can substitute in-memory doubles.

mod http;
mod temporal;

pub use http::{build_http_client, LogClient, SignedTreeHead, USER_AGENT};
pub use temporal::{ShardConfig, TemporalLogClient, TemporalLogConfig};

use crate::entry::{RawEntry, SubmissionChain};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from talking to a log. Every variant is terminal for the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("rate limited by log")]
    RateLimited,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid log URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("no temporal shard accepts notAfter {0}")]
    NoShard(String),

    #[error("cannot route certificate: {0}")]
    Unroutable(String),
}

/// Signed Certificate Timestamp returned by `add-chain` / `add-pre-chain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCertificateTimestamp {
    pub sct_version: u8,
    #[serde(with = "b64")]
    pub id: Vec<u8>,
    pub timestamp: u64,
    #[serde(with = "b64", default)]
    pub extensions: Vec<u8>,
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
}

impl std::fmt::Display for SignedCertificateTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use base64::Engine;
        write!(
            f,
            "v{} log={} ts={}",
            self.sct_version,
            base64::engine::general_purpose::STANDARD.encode(&self.id),
            self.timestamp
        )
    }
}

/// Submission side of a CT log.
#[async_trait]
pub trait AddChainClient: Send + Sync {
    async fn add_chain(&self, chain: &SubmissionChain)
        -> Result<SignedCertificateTimestamp, ClientError>;

    async fn add_pre_chain(
        &self,
        chain: &SubmissionChain,
    ) -> Result<SignedCertificateTimestamp, ClientError>;
}

/// Read side of a CT log.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn get_sth(&self) -> Result<SignedTreeHead, ClientError>;

    /// Entries `start..=end`. The log may return fewer than requested.
    async fn get_entries(&self, start: u64, end: u64) -> Result<Vec<RawEntry>, ClientError>;
}

pub(crate) mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
