//! RFC 6962 JSON API over HTTP(S).

use super::{b64, AddChainClient, ClientError, LogSource, SignedCertificateTimestamp};
use crate::config::HttpConfig;
use crate::entry::{RawEntry, SubmissionChain};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("ct-preload/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in a [`ClientError::Http`].
const MAX_ERROR_BODY: usize = 512;

/// Build a pooled HTTP client.
///
/// `request_timeout` bounds the whole request; a stuck submission surfaces as
/// an ordinary transport error once it elapses.
pub fn build_http_client(
    http: &HttpConfig,
    request_timeout: Option<Duration>,
) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(http.pool_idle_timeout_secs))
        .pool_max_idle_per_host(http.pool_max_idle_per_host);
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| ClientError::Transport(format!("failed to create HTTP client: {}", e)))
}

/// Signed tree head, as returned by `get-sth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTreeHead {
    pub tree_size: u64,
    pub timestamp: u64,
    #[serde(with = "b64")]
    pub sha256_root_hash: Vec<u8>,
    #[serde(with = "b64")]
    pub tree_head_signature: Vec<u8>,
}

#[derive(Deserialize)]
struct GetEntriesResponse {
    entries: Vec<LeafEntryJson>,
}

#[derive(Deserialize)]
struct LeafEntryJson {
    #[serde(with = "b64")]
    leaf_input: Vec<u8>,
    #[serde(with = "b64")]
    extra_data: Vec<u8>,
}

#[derive(Serialize)]
struct AddChainRequest {
    chain: Vec<String>,
}

/// Client for a single CT log.
#[derive(Clone)]
pub struct LogClient {
    base: String,
    http: reqwest::Client,
    bearer_token: Option<String>,
}

impl LogClient {
    /// Create a client for the log at `uri` (e.g. `https://ct.example.com/logs/a`).
    pub fn new(
        uri: &str,
        http: reqwest::Client,
        bearer_token: Option<String>,
    ) -> Result<Self, ClientError> {
        let parsed = Url::parse(uri).map_err(|e| ClientError::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUri {
                uri: uri.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        Ok(Self {
            base: uri.trim_end_matches('/').to_string(),
            http,
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn uri(&self) -> &str {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/ct/v1/{}", self.base, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, ClientError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return Err(ClientError::Http {
                status: status.as_u16(),
                body: text.trim().chars().take(MAX_ERROR_BODY).collect(),
            });
        }
        Ok(body.to_vec())
    }

    async fn post_chain(
        &self,
        path: &str,
        chain: &SubmissionChain,
    ) -> Result<SignedCertificateTimestamp, ClientError> {
        let body = AddChainRequest {
            chain: chain.certs().iter().map(|c| STANDARD.encode(c)).collect(),
        };
        let request = self.http.post(self.endpoint(path)).json(&body);
        decode_sct(&self.send(request).await?)
    }
}

#[async_trait]
impl AddChainClient for LogClient {
    async fn add_chain(
        &self,
        chain: &SubmissionChain,
    ) -> Result<SignedCertificateTimestamp, ClientError> {
        self.post_chain("add-chain", chain).await
    }

    async fn add_pre_chain(
        &self,
        chain: &SubmissionChain,
    ) -> Result<SignedCertificateTimestamp, ClientError> {
        self.post_chain("add-pre-chain", chain).await
    }
}

#[async_trait]
impl LogSource for LogClient {
    async fn get_sth(&self) -> Result<SignedTreeHead, ClientError> {
        let body = self.send(self.http.get(self.endpoint("get-sth"))).await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    async fn get_entries(&self, start: u64, end: u64) -> Result<Vec<RawEntry>, ClientError> {
        if end < start {
            return Ok(Vec::new());
        }
        let request = self
            .http
            .get(self.endpoint("get-entries"))
            .query(&[("start", start), ("end", end)]);
        decode_entries(&self.send(request).await?, start, end)
    }
}

pub(crate) fn decode_sct(body: &[u8]) -> Result<SignedCertificateTimestamp, ClientError> {
    serde_json::from_slice(body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

pub(crate) fn decode_entries(body: &[u8], start: u64, end: u64) -> Result<Vec<RawEntry>, ClientError> {
    let response: GetEntriesResponse =
        serde_json::from_slice(body).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
    let requested = end - start + 1;
    if response.entries.len() as u64 > requested {
        return Err(ClientError::InvalidResponse(format!(
            "log returned {} entries for a request of {}",
            response.entries.len(),
            requested
        )));
    }
    Ok(response
        .entries
        .into_iter()
        .zip(start..)
        .map(|(e, index)| RawEntry::new(index, e.leaf_input, e.extra_data))
        .collect())
}
