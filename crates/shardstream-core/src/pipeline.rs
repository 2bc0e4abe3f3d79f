//! Caller-owned facade: resolve the manifest once, then stream batches from it.
//!
//! ```no_run
//! # async fn demo() -> Result<(), shardstream_core::pipeline::PipelineError> {
//! use shardstream_core::config::PipelineConfig;
//! use shardstream_core::Pipeline;
//!
//! let mut config = PipelineConfig::new("ipfs://QmManifest/manifest.json");
//! config.verify_chain = false;
//! let pipeline = Pipeline::initialize(config, None).await?;
//! for batch in pipeline.stream_batches() {
//!     let _features = batch.features();
//! }
//! pipeline.close();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::cache::{CacheError, CacheStore};
use crate::config::PipelineConfig;
use crate::control::PipelineControl;
use crate::fetcher::ShardFetcher;
use crate::manifest::{IntegrityAuthority, Manifest, ManifestError, ManifestResolver};
use crate::stream::{BatchStream, BatchStreamer, StreamReport};
use crate::transport::{CurlSource, ShardSource};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// A resolved manifest plus everything needed to stream it.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    manifest: Manifest,
    streamer: BatchStreamer,
    control: PipelineControl,
}

impl Pipeline {
    /// Validate `config`, load (and, if `verify_chain`, verify) the manifest,
    /// apply the partition and open the cache. Any manifest error is fatal.
    pub async fn initialize(
        config: PipelineConfig,
        authority: Option<Arc<dyn IntegrityAuthority>>,
    ) -> Result<Self, PipelineError> {
        let source = Arc::new(CurlSource::new(config.ipfs_gateway.clone()));
        Self::initialize_with_source(config, authority, source).await
    }

    /// As [`initialize`](Self::initialize), retrieving shards through `source`.
    pub async fn initialize_with_source(
        config: PipelineConfig,
        authority: Option<Arc<dyn IntegrityAuthority>>,
        source: Arc<dyn ShardSource>,
    ) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::Config)?;

        let mut resolver = ManifestResolver::new(config.ipfs_gateway.clone());
        if let Some(authority) = authority {
            resolver = resolver.with_authority(authority);
        }
        let resolver = resolver.verify_chain(config.verify_chain);
        let mut manifest = resolver.load(&config.manifest_uri).await?;
        if let Some(p) = config.partition {
            manifest = manifest.partition(p.rank, p.world_size)?;
            tracing::info!(
                rank = p.rank,
                world_size = p.world_size,
                shards = manifest.len(),
                "manifest partitioned"
            );
        }

        let cache = CacheStore::open(&config.cache_dir)?;
        let control = PipelineControl::new();
        let fetcher = ShardFetcher::new(cache, source, config.retry_policy())
            .with_control(control.clone());
        let streamer = BatchStreamer::new(Arc::new(fetcher), config.batch_size, config.max_workers);
        tracing::info!(
            manifest = %config.manifest_uri,
            shards = manifest.len(),
            cache_dir = %config.cache_dir.display(),
            "pipeline initialized"
        );
        Ok(Self {
            config,
            manifest,
            streamer,
            control,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The (possibly partitioned) manifest this pipeline streams.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Start a fresh pass over the manifest. May be called any number of
    /// times; later passes are served from the cache.
    pub fn stream_batches(&self) -> BatchStream {
        self.streamer.stream(&self.manifest)
    }

    /// Fetch every shard into the cache and report the outcome. Blocks until
    /// all shards are done.
    pub fn prefetch(&self) -> StreamReport {
        let report = self.streamer.prefetch(&self.manifest).finish();
        tracing::info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "prefetch finished"
        );
        report
    }

    /// Abort every stream started from this pipeline. Streams still held by
    /// the caller stop taking new shards and join their workers when dropped.
    pub fn close(self) {
        self.control.request_abort();
        tracing::info!(manifest = %self.config.manifest_uri, "pipeline closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::sha3_256_hex;
    use crate::config::PartitionConfig;
    use crate::manifest::AllowListAuthority;
    use crate::stream::encode_samples;
    use std::path::Path;

    /// Write `n_shards` local shards of `samples` each plus a manifest; return its path.
    fn dataset(dir: &Path, n_shards: usize, samples: usize) -> String {
        let mut entries = Vec::new();
        for i in 0..n_shards {
            let body = encode_samples(&vec![i as f32; samples]);
            let path = dir.join(format!("shard{}.bin", i));
            std::fs::write(&path, &body).unwrap();
            entries.push(serde_json::json!({
                "uri": format!("file://{}", path.display()),
                "hash": sha3_256_hex(&body),
            }));
        }
        let manifest = dir.join("manifest.json");
        std::fs::write(&manifest, serde_json::json!({ "datasets": entries }).to_string()).unwrap();
        manifest.display().to_string()
    }

    fn config(cache: &Path, manifest: String) -> PipelineConfig {
        let mut c = PipelineConfig::new(manifest);
        c.cache_dir = cache.join("cache");
        c.batch_size = 10;
        c.max_workers = 2;
        c.verify_chain = false;
        c
    }

    #[tokio::test]
    async fn streams_local_dataset_in_order() {
        let data = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let manifest = dataset(data.path(), 3, 25);
        let p = Pipeline::initialize(config(cache.path(), manifest), None)
            .await
            .unwrap();
        assert_eq!(p.manifest().len(), 3);

        let batches: Vec<_> = p.stream_batches().collect();
        assert_eq!(batches.len(), 9);
        let shards: Vec<_> = batches.iter().map(|b| b.shard_index).collect();
        assert_eq!(shards, [0, 0, 0, 1, 1, 1, 2, 2, 2]);
        assert_eq!(batches[2].len(), 5);
        assert!(cache.path().join("cache/shard1.bin").exists());
        p.close();
    }

    #[tokio::test]
    async fn verification_gates_initialization() {
        let data = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let manifest = dataset(data.path(), 1, 4);
        let mut cfg = config(cache.path(), manifest);
        cfg.verify_chain = true;

        let err = Pipeline::initialize(cfg.clone(), Some(Arc::new(AllowListAuthority::new(["ab"]))))
            .await
            .unwrap_err();
        let digest = match err {
            PipelineError::Manifest(ManifestError::Tampered { digest }) => digest,
            other => panic!("unexpected {other}"),
        };

        let trusted: Arc<dyn IntegrityAuthority> = Arc::new(AllowListAuthority::new([digest]));
        let p = Pipeline::initialize(cfg, Some(trusted)).await.unwrap();
        assert_eq!(p.stream_batches().count(), 1);
    }

    #[tokio::test]
    async fn partition_selects_strided_shards() {
        let data = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let manifest = dataset(data.path(), 5, 10);
        let mut cfg = config(cache.path(), manifest);
        cfg.partition = Some(PartitionConfig { rank: 1, world_size: 2 });

        let p = Pipeline::initialize(cfg, None).await.unwrap();
        let firsts: Vec<f32> = p.stream_batches().map(|b| b.features()[0]).collect();
        assert_eq!(firsts, [1.0, 3.0]);
    }

    #[tokio::test]
    async fn prefetch_then_stream() {
        let data = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let manifest = dataset(data.path(), 2, 15);
        let p = Pipeline::initialize(config(cache.path(), manifest), None)
            .await
            .unwrap();
        let report = p.prefetch();
        assert!(report.is_complete());
        assert_eq!(report.batches(), 4);
        assert_eq!(p.stream_batches().count(), 4);
    }

    #[tokio::test]
    async fn bad_config_is_rejected_before_any_io() {
        let mut cfg = PipelineConfig::new("file:///nowhere/manifest.json");
        cfg.batch_size = 0;
        let err = Pipeline::initialize(cfg, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        let mut cfg = PipelineConfig::new("file:///nowhere/manifest.json");
        cfg.retry = Some(crate::config::RetryConfig {
            base_delay_secs: 1e30,
            ..Default::default()
        });
        let err = Pipeline::initialize(cfg, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)), "{err}");
    }

    #[tokio::test]
    async fn close_aborts_outstanding_streams() {
        let data = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let manifest = dataset(data.path(), 2, 4);
        let p = Pipeline::initialize(config(cache.path(), manifest), None)
            .await
            .unwrap();
        let stream = p.stream_batches();
        p.close();
        let report = stream.finish();
        assert_eq!(report.delivered.len() + report.failed.len() + report.skipped(), 2);
    }
}
