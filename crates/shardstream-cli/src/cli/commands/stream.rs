//! `shardstream stream` – run the pipeline end to end.

use anyhow::{Context, Result};
use shardstream_core::config::PipelineConfig;
use shardstream_core::manifest::IntegrityAuthority;
use shardstream_core::{BatchStream, Pipeline, StreamReport};
use std::sync::Arc;

use super::summary::print_report;

pub async fn run_stream(
    cfg: PipelineConfig,
    authority: Option<Arc<dyn IntegrityAuthority>>,
    limit: Option<usize>,
) -> Result<()> {
    let pipeline = Pipeline::initialize(cfg, authority)
        .await
        .context("initialize pipeline")?;
    let stream = pipeline.stream_batches();
    let report = tokio::task::spawn_blocking(move || consume(stream, limit))
        .await
        .context("stream task")?;
    pipeline.close();

    print_report(&report);
    if !report.failed.is_empty() {
        anyhow::bail!("{} shard(s) could not be delivered", report.failed.len());
    }
    Ok(())
}

/// Pull batches until the stream ends or `limit` batches were taken.
fn consume(mut stream: BatchStream, limit: Option<usize>) -> StreamReport {
    let mut taken = 0usize;
    while limit.map_or(true, |l| taken < l) {
        if stream.next().is_none() {
            return stream.finish();
        }
        taken += 1;
    }
    stream.close()
}
