//! CLI for the shardstream data pipeline.

mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use shardstream_core::config::{self, PartitionConfig, PipelineConfig};
use shardstream_core::manifest::{AllowListAuthority, IntegrityAuthority};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use commands::{run_checksum, run_digest, run_fetch, run_stream};

/// Top-level CLI for the shardstream pipeline.
#[derive(Debug, Parser)]
#[command(name = "shardstream")]
#[command(about = "Verified shard fetch, cache and batch streaming", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/shardstream/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter directives (e.g. `warn,shardstream_core=debug`); overrides RUST_LOG.
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Pipeline settings that override the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct PipelineArgs {
    /// Manifest URI (file://, http(s)://, ipfs:// or a local path).
    #[arg(long, value_name = "URI")]
    pub manifest: Option<String>,

    /// Directory for verified shards.
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Samples per batch.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Worker threads fetching shards in parallel.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Skip checking the manifest digest with the integrity authority.
    #[arg(long)]
    pub no_verify_chain: bool,

    /// Manifest digest to accept as registered (repeatable). See `shardstream digest`.
    #[arg(long = "trusted-digest", value_name = "HEX")]
    pub trusted_digests: Vec<String>,

    /// Gateway prefix for ipfs:// URIs.
    #[arg(long, value_name = "URL")]
    pub gateway: Option<String>,

    /// This process's rank for distributed training (requires --world-size).
    #[arg(long, requires = "world_size")]
    pub rank: Option<usize>,

    /// Number of ranks sharing the manifest (requires --rank).
    #[arg(long, requires = "rank")]
    pub world_size: Option<usize>,
}

impl PipelineArgs {
    /// Apply these flags on top of `base` (the config file, if any).
    pub fn to_config(&self, base: Option<PipelineConfig>) -> Result<PipelineConfig> {
        let mut cfg = base.unwrap_or_else(|| PipelineConfig::new(String::new()));
        if let Some(m) = &self.manifest {
            cfg.manifest_uri = m.clone();
        }
        if cfg.manifest_uri.trim().is_empty() {
            anyhow::bail!("no manifest: pass --manifest or set manifest_uri in the config file");
        }
        if let Some(d) = &self.cache_dir {
            cfg.cache_dir = d.clone();
        }
        if let Some(n) = self.batch_size {
            cfg.batch_size = n;
        }
        if let Some(n) = self.workers {
            cfg.max_workers = n;
        }
        if self.no_verify_chain {
            cfg.verify_chain = false;
        }
        if let Some(g) = &self.gateway {
            cfg.ipfs_gateway = g.clone();
        }
        if let (Some(rank), Some(world_size)) = (self.rank, self.world_size) {
            cfg.partition = Some(PartitionConfig { rank, world_size });
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Allow-list authority from `--trusted-digest`, if any were given.
    pub fn authority(&self) -> Option<Arc<dyn IntegrityAuthority>> {
        if self.trusted_digests.is_empty() {
            return None;
        }
        Some(Arc::new(AllowListAuthority::new(&self.trusted_digests)))
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Stream every batch of the manifest and print a per-shard summary.
    Stream {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Stop after N batches.
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Download and verify every shard into the cache without batching.
    Fetch {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Print the canonical digest of a manifest (the value registered with the authority).
    Digest {
        /// Manifest URI.
        uri: String,

        /// Gateway prefix for ipfs:// URIs.
        #[arg(long, value_name = "URL")]
        gateway: Option<String>,
    },

    /// Compute SHA3-256 of a file, in the format manifests expect.
    Checksum {
        /// Path to the file.
        path: String,
    },
}

fn load_config(path: Option<&Path>) -> Result<Option<PipelineConfig>> {
    match path {
        Some(p) => config::load_from_path(p).map(Some),
        None => config::load_optional(),
    }
}

impl Cli {
    /// Run the parsed subcommand.
    pub async fn run(self) -> Result<()> {
        let cli = self;
        match cli.command {
            CliCommand::Stream { pipeline, limit } => {
                let cfg = pipeline
                    .to_config(load_config(cli.config.as_deref())?)
                    .context("build pipeline config")?;
                tracing::debug!("effective config: {:?}", cfg);
                run_stream(cfg, pipeline.authority(), limit).await?;
            }
            CliCommand::Fetch { pipeline } => {
                let cfg = pipeline
                    .to_config(load_config(cli.config.as_deref())?)
                    .context("build pipeline config")?;
                tracing::debug!("effective config: {:?}", cfg);
                run_fetch(cfg, pipeline.authority()).await?;
            }
            CliCommand::Digest { uri, gateway } => {
                let gateway = match gateway {
                    Some(g) => g,
                    None => load_config(cli.config.as_deref())?
                        .map(|c| c.ipfs_gateway)
                        .unwrap_or_else(|| config::DEFAULT_IPFS_GATEWAY.to_string()),
                };
                run_digest(&uri, &gateway).await?;
            }
            CliCommand::Checksum { path } => run_checksum(Path::new(&path)).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
