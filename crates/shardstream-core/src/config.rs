use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Public gateway used to resolve `ipfs://` URIs.
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

/// Retry policy parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of download attempts per shard (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Randomize each delay within [delay/2, delay].
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 30,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Build the runtime policy. A base delay that is not a representable
    /// duration (rejected by [`PipelineConfig::validate`]) falls back to the cap.
    pub fn to_policy(&self) -> RetryPolicy {
        let max_delay = Duration::from_secs(self.max_delay_secs);
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::try_from_secs_f64(self.base_delay_secs).unwrap_or(max_delay),
            max_delay,
            jitter: self.jitter,
        }
    }
}

/// Which slice of the manifest this process trains on (`[partition]` section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub rank: usize,
    pub world_size: usize,
}

/// Pipeline configuration, loaded from `~/.config/shardstream/config.toml`
/// or built in code with [`PipelineConfig::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Manifest location (`file://`, `http(s)://`, `ipfs://` or a plain path).
    /// May be left out of the file and given on the command line instead.
    #[serde(default)]
    pub manifest_uri: String,
    /// Local cache directory for verified shards.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Number of samples per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Worker threads used to fetch and slice shards.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Check the manifest digest with the integrity authority before streaming.
    #[serde(default = "default_verify_chain")]
    pub verify_chain: bool,
    /// Gateway prefix for `ipfs://` URIs.
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional rank/world-size split for distributed training.
    #[serde(default)]
    pub partition: Option<PartitionConfig>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data_cache")
}

fn default_batch_size() -> usize {
    256
}

fn default_max_workers() -> usize {
    8
}

fn default_verify_chain() -> bool {
    true
}

fn default_ipfs_gateway() -> String {
    DEFAULT_IPFS_GATEWAY.to_string()
}

impl PipelineConfig {
    /// Config with every optional field at its default.
    pub fn new(manifest_uri: impl Into<String>) -> Self {
        Self {
            manifest_uri: manifest_uri.into(),
            cache_dir: default_cache_dir(),
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            verify_chain: default_verify_chain(),
            ipfs_gateway: default_ipfs_gateway(),
            retry: None,
            partition: None,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.manifest_uri.trim().is_empty() {
            anyhow::bail!("manifest_uri must not be empty");
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.max_workers == 0 {
            anyhow::bail!("max_workers must be at least 1");
        }
        if let Some(r) = &self.retry {
            if Duration::try_from_secs_f64(r.base_delay_secs).is_err() {
                anyhow::bail!(
                    "retry.base_delay_secs must be a finite, non-negative number of seconds, got {}",
                    r.base_delay_secs
                );
            }
        }
        if let Some(p) = self.partition {
            if p.world_size == 0 || p.rank >= p.world_size {
                anyhow::bail!(
                    "invalid partition: rank {} of world_size {}",
                    p.rank,
                    p.world_size
                );
            }
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("shardstream")?;
    Ok(xdg_dirs.get_config_home().join("config.toml"))
}

/// Load configuration from an explicit path. Values are checked later by
/// [`PipelineConfig::validate`], after command-line overrides are applied.
pub fn load_from_path(path: &Path) -> Result<PipelineConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg)
}

/// Load the XDG config file if one exists. Unlike a download queue there is no
/// sensible default manifest, so a missing file is `None` rather than created.
pub fn load_optional() -> Result<Option<PipelineConfig>> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(None);
    }
    let cfg = load_from_path(&path)?;
    tracing::debug!("loaded config from {}", path.display());
    Ok(Some(cfg))
}
