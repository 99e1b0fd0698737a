//! Configuration for the preloader.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the preloader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log to read entries from
    #[serde(default)]
    pub source: SourceConfig,

    /// Log to submit entries to
    #[serde(default)]
    pub target: TargetConfig,

    /// Shared HTTP connection settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Which part of the source log to scan, and how
    #[serde(default)]
    pub scan: ScanConfig,

    /// Submission worker pools
    #[serde(default)]
    pub submit: SubmitConfig,

    /// Where outcomes are recorded
    #[serde(default)]
    pub output: OutputConfig,

    /// Runtime tuning
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// Source log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// CT log base URI to fetch entries from
    #[serde(default = "default_source_uri")]
    pub log_uri: String,

    /// Total time allowed for one get-entries/get-sth request
    #[serde(default = "default_source_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            log_uri: default_source_uri(),
            request_timeout_secs: default_source_timeout(),
        }
    }
}

/// Destination log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// CT log base URI to add entries to (ignored when temporal_config is set)
    #[serde(default)]
    pub log_uri: String,

    /// Bearer token sent with add-chain requests
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// File holding a temporal (sharded) log configuration
    #[serde(default)]
    pub temporal_config: Option<PathBuf>,

    /// Total time allowed for one add-chain request; 0 means no limit
    #[serde(default = "default_target_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            log_uri: String::new(),
            bearer_token: None,
            temporal_config: None,
            request_timeout_secs: default_target_timeout(),
        }
    }
}

/// HTTP transport tuning, shared by source and destination clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,

    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

/// Scan range and fetch parallelism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Log index to start scanning at
    #[serde(default)]
    pub start_index: u64,

    /// Log index to stop scanning at (exclusive); 0 means the current tree size
    #[serde(default)]
    pub end_index: u64,

    /// Keep polling for new tree heads once the range is exhausted
    #[serde(default)]
    pub continuous: bool,

    /// Max entries requested per get-entries call
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Concurrent get-entries fetches
    #[serde(default = "default_parallel_fetch")]
    pub parallel_fetch: usize,

    /// Seconds between get-sth polls in continuous mode
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Continuous mode stops after this many polls without tree growth
    #[serde(default = "default_max_idle_polls")]
    pub max_idle_polls: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start_index: 0,
            end_index: 0,
            continuous: false,
            batch_size: default_batch_size(),
            parallel_fetch: default_parallel_fetch(),
            poll_interval_secs: default_poll_interval(),
            max_idle_polls: default_max_idle_polls(),
        }
    }
}

/// Submission pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// Workers per entry class
    #[serde(default = "default_parallel_submit")]
    pub parallel_submit: usize,

    /// Channel capacity is buffer_factor * parallel_submit
    #[serde(default = "default_buffer_factor")]
    pub buffer_factor: usize,

    /// Only submit precertificates
    #[serde(default)]
    pub precerts_only: bool,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            parallel_submit: default_parallel_submit(),
            buffer_factor: default_buffer_factor(),
            precerts_only: false,
        }
    }
}

impl SubmitConfig {
    /// Capacity of each of the cert, precert and outcome channels.
    pub fn channel_capacity(&self) -> usize {
        self.buffer_factor * self.parallel_submit
    }
}

/// Outcome file configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File to save SCTs and failures to; outcomes are discarded when unset
    #[serde(default)]
    pub sct_file: Option<PathBuf>,
}

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of Tokio worker threads
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Progress reporting interval in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            metrics_interval_secs: default_metrics_interval(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            target: TargetConfig::default(),
            http: HttpConfig::default(),
            scan: ScanConfig::default(),
            submit: SubmitConfig::default(),
            output: OutputConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.source.log_uri.is_empty() {
            anyhow::bail!("source.log_uri must be set");
        }
        if self.target.temporal_config.is_none() && self.target.log_uri.is_empty() {
            anyhow::bail!("Must specify either target.log_uri or target.temporal_config");
        }
        if self.scan.continuous && self.scan.end_index != 0 {
            anyhow::bail!(
                "continuous is set and end_index is {}; set end_index to 0 to scan continuously",
                self.scan.end_index
            );
        }
        if self.scan.end_index != 0 && self.scan.end_index <= self.scan.start_index {
            anyhow::bail!(
                "end_index ({}) must be greater than start_index ({})",
                self.scan.end_index,
                self.scan.start_index
            );
        }
        if self.scan.batch_size == 0 {
            anyhow::bail!("batch_size must be > 0");
        }
        if self.scan.parallel_fetch == 0 {
            anyhow::bail!("parallel_fetch must be > 0");
        }
        if self.submit.parallel_submit == 0 {
            anyhow::bail!("parallel_submit must be > 0");
        }
        if self.submit.buffer_factor == 0 {
            anyhow::bail!("buffer_factor must be > 0");
        }
        if self.processing.metrics_interval_secs == 0 {
            anyhow::bail!("metrics_interval_secs must be > 0");
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_source_uri() -> String { "https://ct.googleapis.com/aviator".to_string() }
fn default_source_timeout() -> u64 { 10 }
fn default_target_timeout() -> u64 { 30 }
fn default_connect_timeout() -> u64 { 30 }
fn default_pool_idle_timeout() -> u64 { 90 }
fn default_pool_max_idle_per_host() -> usize { 10 }
fn default_batch_size() -> u64 { 1000 }
fn default_parallel_fetch() -> usize { 2 }
fn default_poll_interval() -> u64 { 30 }
fn default_max_idle_polls() -> u32 { 10 }
fn default_parallel_submit() -> usize { 2 }
fn default_buffer_factor() -> usize { 10 }
fn default_metrics_interval() -> u64 { 10 }
