//! Routing across a temporally sharded destination log.
//!
//! Each shard accepts certificates whose `notAfter` falls in
//! `[not_after_start, not_after_limit)`. The first shard may leave its start
//! open and the last may leave its limit open.

use super::{AddChainClient, ClientError, LogClient, SignedCertificateTimestamp};
use crate::entry::der;
use crate::entry::SubmissionChain;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// One shard of a temporal log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub uri: String,

    #[serde(default)]
    pub not_after_start: Option<DateTime<Utc>>,

    #[serde(default)]
    pub not_after_limit: Option<DateTime<Utc>>,
}

impl ShardConfig {
    fn accepts(&self, not_after: DateTime<Utc>) -> bool {
        self.not_after_start.map_or(true, |s| not_after >= s)
            && self.not_after_limit.map_or(true, |l| not_after < l)
    }
}

/// Shard layout of a temporal log, loaded from YAML or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalLogConfig {
    pub shards: Vec<ShardConfig>,
}

impl TemporalLogConfig {
    /// Load from a YAML or JSON file (by extension, YAML otherwise).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read temporal log config {}", path.display()))?;
        let config: TemporalLogConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Shards must be ordered and non-overlapping; only the ends may be open.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shards.is_empty() {
            anyhow::bail!("temporal log config has no shards");
        }
        let last = self.shards.len() - 1;
        for (i, shard) in self.shards.iter().enumerate() {
            if shard.uri.is_empty() {
                anyhow::bail!("shard {} has no URI", i);
            }
            if i > 0 && shard.not_after_start.is_none() {
                anyhow::bail!("shard {} ({}) needs not_after_start", i, shard.uri);
            }
            if i < last && shard.not_after_limit.is_none() {
                anyhow::bail!("shard {} ({}) needs not_after_limit", i, shard.uri);
            }
            if let (Some(start), Some(limit)) = (shard.not_after_start, shard.not_after_limit) {
                if start >= limit {
                    anyhow::bail!("shard {} ({}) has an empty interval", i, shard.uri);
                }
            }
        }
        for pair in self.shards.windows(2) {
            if let (Some(limit), Some(start)) = (pair[0].not_after_limit, pair[1].not_after_start) {
                if start < limit {
                    anyhow::bail!("shards {} and {} overlap", pair[0].uri, pair[1].uri);
                }
            }
        }
        Ok(())
    }
}

/// Submits each chain to the shard that covers its leaf's `notAfter`.
pub struct TemporalLogClient {
    shards: Vec<(ShardConfig, Arc<dyn AddChainClient>)>,
}

impl TemporalLogClient {
    /// Build an HTTP client per shard, sharing one connection pool.
    pub fn new(
        config: &TemporalLogConfig,
        http: reqwest::Client,
        bearer_token: Option<String>,
    ) -> Result<Self, ClientError> {
        let mut shards = Vec::with_capacity(config.shards.len());
        for shard in &config.shards {
            let client = LogClient::new(&shard.uri, http.clone(), bearer_token.clone())?;
            shards.push((shard.clone(), Arc::new(client) as Arc<dyn AddChainClient>));
        }
        Ok(Self { shards })
    }

    pub fn from_shards(shards: Vec<(ShardConfig, Arc<dyn AddChainClient>)>) -> Self {
        Self { shards }
    }

    fn route(&self, chain: &SubmissionChain) -> Result<&dyn AddChainClient, ClientError> {
        let summary = der::summarize_certificate(chain.leaf())
            .map_err(|e| ClientError::Unroutable(e.to_string()))?;
        self.shards
            .iter()
            .find(|(cfg, _)| cfg.accepts(summary.not_after))
            .map(|(cfg, client)| {
                tracing::trace!("Routing notAfter {} to {}", summary.not_after, cfg.uri);
                client.as_ref()
            })
            .ok_or_else(|| ClientError::NoShard(summary.not_after.to_rfc3339()))
    }
}

#[async_trait]
impl AddChainClient for TemporalLogClient {
    async fn add_chain(
        &self,
        chain: &SubmissionChain,
    ) -> Result<SignedCertificateTimestamp, ClientError> {
        self.route(chain)?.add_chain(chain).await
    }

    async fn add_pre_chain(
        &self,
        chain: &SubmissionChain,
    ) -> Result<SignedCertificateTimestamp, ClientError> {
        self.route(chain)?.add_pre_chain(chain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::der::test_support::certificate;
    use chrono::TimeZone;

    struct Tagged(u8);

    #[async_trait]
    impl AddChainClient for Tagged {
        async fn add_chain(
            &self,
            _chain: &SubmissionChain,
        ) -> Result<SignedCertificateTimestamp, ClientError> {
            Ok(SignedCertificateTimestamp {
                sct_version: 0,
                id: vec![self.0],
                timestamp: 0,
                extensions: Vec::new(),
                signature: Vec::new(),
            })
        }

        async fn add_pre_chain(
            &self,
            chain: &SubmissionChain,
        ) -> Result<SignedCertificateTimestamp, ClientError> {
            self.add_chain(chain).await
        }
    }

    fn year(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    fn shard(uri: &str, start: Option<i32>, limit: Option<i32>) -> ShardConfig {
        ShardConfig {
            uri: uri.to_string(),
            not_after_start: start.map(year),
            not_after_limit: limit.map(year),
        }
    }

    fn router() -> TemporalLogClient {
        let a: Arc<dyn AddChainClient> = Arc::new(Tagged(1));
        let b: Arc<dyn AddChainClient> = Arc::new(Tagged(2));
        let c: Arc<dyn AddChainClient> = Arc::new(Tagged(3));
        TemporalLogClient::from_shards(vec![
            (shard("a", None, Some(2026)), a),
            (shard("b", Some(2026), Some(2027)), b),
            (shard("c", Some(2027), None), c),
        ])
    }

    #[tokio::test]
    async fn test_routes_by_not_after() {
        let client = router();
        for (not_after, expected) in [("250601000000Z", 1), ("260101000000Z", 2), ("350101000000Z", 3)] {
            let chain = SubmissionChain::new(certificate("x", not_after), Vec::new());
            let sct = client.add_chain(&chain).await.unwrap();
            assert_eq!(sct.id, vec![expected], "notAfter {}", not_after);
        }
    }

    #[tokio::test]
    async fn test_unroutable_leaf() {
        let client = TemporalLogClient::from_shards(vec![(
            shard("a", Some(2030), Some(2031)),
            Arc::new(Tagged(1)) as Arc<dyn AddChainClient>,
        )]);
        let chain = SubmissionChain::new(certificate("x", "250101000000Z"), Vec::new());
        assert!(matches!(client.add_pre_chain(&chain).await, Err(ClientError::NoShard(_))));

        let garbage = SubmissionChain::new(b"junk".to_vec(), Vec::new());
        assert!(matches!(client.add_chain(&garbage).await, Err(ClientError::Unroutable(_))));
    }

    #[test]
    fn test_validate() {
        let ok = TemporalLogConfig {
            shards: vec![shard("a", None, Some(2026)), shard("b", Some(2026), None)],
        };
        assert!(ok.validate().is_ok());

        let overlap = TemporalLogConfig {
            shards: vec![shard("a", None, Some(2027)), shard("b", Some(2026), None)],
        };
        assert!(overlap.validate().is_err());

        let open_middle = TemporalLogConfig {
            shards: vec![shard("a", None, None), shard("b", Some(2026), None)],
        };
        assert!(open_middle.validate().is_err());

        assert!(TemporalLogConfig { shards: vec![] }.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temporal.yaml");
        std::fs::write(
            &path,
            "shards:\n  - uri: https://ct.example.com/2025\n    not_after_limit: 2026-01-01T00:00:00Z\n  - uri: https://ct.example.com/2026\n    not_after_start: 2026-01-01T00:00:00Z\n",
        )
        .unwrap();
        let config = TemporalLogConfig::from_file(&path).unwrap();
        assert_eq!(config.shards.len(), 2);
        assert_eq!(config.shards[1].not_after_start, Some(year(2026)));
    }
}
