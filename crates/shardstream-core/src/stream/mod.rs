//! Batch streaming over a manifest.
//!
//! Shards are fetched and sliced on a bounded pool of worker threads, while
//! batches reach the consumer strictly in manifest order (shard by shard, batch
//! by batch). A shard that cannot be fetched or decoded is logged and
//! contributes zero batches; the stream moves on to the next shard.

mod batch;
mod pool;
mod report;

pub use batch::{
    batch_count, encode_samples, slice_file, slice_shard, DataBatch, SliceError, SAMPLE_BYTES,
};
pub use report::{ShardFailure, ShardSummary, StreamReport};

use std::sync::Arc;

use crate::control::PipelineControl;
use crate::fetcher::{ShardError, ShardFetcher};
use crate::manifest::{Manifest, ShardDescriptor};
use pool::OrderedPool;

/// Shards a worker may finish ahead of the consumer, per worker.
const LOOKAHEAD_PER_WORKER: usize = 2;

enum ShardOutcome {
    Delivered(Vec<DataBatch>),
    /// Cache warm-up: the shard is verified on disk; its size is known.
    Cached { samples: usize },
    Failed(String),
    Cancelled,
}

/// Drives a [`ShardFetcher`] over manifests.
#[derive(Debug, Clone)]
pub struct BatchStreamer {
    fetcher: Arc<ShardFetcher>,
    batch_size: usize,
    max_workers: usize,
}

impl BatchStreamer {
    pub fn new(fetcher: Arc<ShardFetcher>, batch_size: usize, max_workers: usize) -> Self {
        Self {
            fetcher,
            batch_size: batch_size.max(1),
            max_workers: max_workers.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Start streaming `manifest`. Workers begin immediately; batches are
    /// pulled through the returned iterator.
    pub fn stream(&self, manifest: &Manifest) -> BatchStream {
        let fetcher = Arc::clone(&self.fetcher);
        let batch_size = self.batch_size;
        self.start(manifest, move |control, index, shard| {
            match fetcher.fetch_with(&shard, control) {
                Ok(entry) => match slice_file(entry.file(), &entry.local_path, index, batch_size) {
                    Ok(batches) => ShardOutcome::Delivered(batches),
                    Err(e) => failed(index, &shard, e.to_string()),
                },
                Err(ShardError::Cancelled { .. }) => ShardOutcome::Cancelled,
                Err(e) => failed(index, &shard, e.to_string()),
            }
        })
    }

    /// Fetch every shard into the cache without decoding it. The returned
    /// stream yields no batches; drain it (or call [`BatchStream::finish`]) for the report.
    pub fn prefetch(&self, manifest: &Manifest) -> BatchStream {
        let fetcher = Arc::clone(&self.fetcher);
        self.start(manifest, move |control, index, shard| {
            match fetcher.fetch_with(&shard, control) {
                Ok(entry) => match entry.file().metadata() {
                    Ok(m) => ShardOutcome::Cached {
                        samples: (m.len() / SAMPLE_BYTES as u64) as usize,
                    },
                    Err(e) => failed(
                        index,
                        &shard,
                        format!("stat {}: {}", entry.local_path.display(), e),
                    ),
                },
                Err(ShardError::Cancelled { .. }) => ShardOutcome::Cancelled,
                Err(e) => failed(index, &shard, e.to_string()),
            }
        })
    }

    fn start<F>(&self, manifest: &Manifest, work: F) -> BatchStream
    where
        F: Fn(&PipelineControl, usize, ShardDescriptor) -> ShardOutcome + Send + Sync + 'static,
    {
        let control = self.fetcher.control().child();
        let shards = manifest.shards().to_vec();
        let uris = shards.iter().map(|s| s.uri.clone()).collect();
        tracing::info!(
            shards = shards.len(),
            workers = self.max_workers,
            batch_size = self.batch_size,
            "starting shard workers"
        );
        let worker_control = control.clone();
        let pool = OrderedPool::spawn(
            shards,
            self.max_workers,
            self.max_workers * LOOKAHEAD_PER_WORKER,
            control,
            move |index, shard| work(&worker_control, index, shard),
        );
        BatchStream {
            pool,
            uris,
            next_shard: 0,
            batch_size: self.batch_size,
            pending: Vec::new().into_iter(),
            report: StreamReport::new(manifest.len()),
        }
    }
}

fn failed(index: usize, shard: &ShardDescriptor, error: String) -> ShardOutcome {
    tracing::error!(
        index,
        uri = %shard.uri,
        error = %error,
        "shard failed; it contributes no batches"
    );
    ShardOutcome::Failed(error)
}

/// Ordered batches from one pass over a manifest.
///
/// Dropping the stream (or calling [`close`](Self::close)) aborts outstanding
/// shard work and joins the workers.
pub struct BatchStream {
    pool: OrderedPool<ShardOutcome>,
    uris: Vec<String>,
    next_shard: usize,
    batch_size: usize,
    pending: std::vec::IntoIter<DataBatch>,
    report: StreamReport,
}

impl std::fmt::Debug for BatchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchStream")
            .field("next_shard", &self.next_shard)
            .field("shards_remaining", &self.pool.remaining())
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl BatchStream {
    /// Accounting for the shards taken so far.
    pub fn report(&self) -> &StreamReport {
        &self.report
    }

    /// Stop early: abort outstanding shards, join the workers, return the report.
    pub fn close(mut self) -> StreamReport {
        self.pool.shutdown();
        tracing::info!(
            delivered = self.report.delivered.len(),
            failed = self.report.failed.len(),
            skipped = self.report.skipped(),
            "stream closed"
        );
        std::mem::take(&mut self.report)
    }

    /// Drain the remaining batches and return the final report.
    pub fn finish(mut self) -> StreamReport {
        for _ in self.by_ref() {}
        std::mem::take(&mut self.report)
    }

    /// Take the next shard outcome into the report. False once all shards are taken.
    fn advance_shard(&mut self) -> bool {
        let Some(outcome) = self.pool.next_result() else {
            return false;
        };
        let index = self.next_shard;
        self.next_shard += 1;
        let uri = self.uris.get(index).cloned().unwrap_or_default();
        match outcome {
            Some(ShardOutcome::Delivered(batches)) => {
                self.report.delivered.push(ShardSummary {
                    index,
                    uri,
                    batches: batches.len(),
                    samples: batches.iter().map(DataBatch::len).sum(),
                });
                self.pending = batches.into_iter();
            }
            Some(ShardOutcome::Cached { samples }) => {
                self.report.delivered.push(ShardSummary {
                    index,
                    uri,
                    batches: batch_count(samples, self.batch_size),
                    samples,
                });
            }
            Some(ShardOutcome::Failed(error)) => {
                self.report.failed.push(ShardFailure { index, uri, error });
            }
            Some(ShardOutcome::Cancelled) => {
                self.report.failed.push(ShardFailure {
                    index,
                    uri,
                    error: "cancelled".to_string(),
                });
            }
            None => {
                self.report.failed.push(ShardFailure {
                    index,
                    uri,
                    error: "worker abandoned shard".to_string(),
                });
            }
        }
        true
    }
}

impl Iterator for BatchStream {
    type Item = DataBatch;

    fn next(&mut self) -> Option<DataBatch> {
        loop {
            if let Some(batch) = self.pending.next() {
                return Some(batch);
            }
            if !self.advance_shard() {
                return None;
            }
        }
    }
}
