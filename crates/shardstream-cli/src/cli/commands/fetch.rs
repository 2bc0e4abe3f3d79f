//! `shardstream fetch` – warm the cache for every shard.

use anyhow::{Context, Result};
use shardstream_core::config::PipelineConfig;
use shardstream_core::manifest::IntegrityAuthority;
use shardstream_core::Pipeline;
use std::sync::Arc;

use super::summary::print_report;

pub async fn run_fetch(cfg: PipelineConfig, authority: Option<Arc<dyn IntegrityAuthority>>) -> Result<()> {
    let cache_dir = cfg.cache_dir.clone();
    let pipeline = Arc::new(
        Pipeline::initialize(cfg, authority)
            .await
            .context("initialize pipeline")?,
    );
    let p = Arc::clone(&pipeline);
    let report = tokio::task::spawn_blocking(move || p.prefetch())
        .await
        .context("prefetch task")?;

    print_report(&report);
    println!("cache: {}", cache_dir.display());
    if !report.failed.is_empty() {
        anyhow::bail!("{} shard(s) could not be fetched", report.failed.len());
    }
    Ok(())
}
