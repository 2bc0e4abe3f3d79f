//! Shard retrieval: cache lookup, bounded retries, hash verification.
//!
//! A valid cache entry is returned without touching any transport. On a miss
//! the fetcher downloads through its [`ShardSource`] under the retry policy;
//! a payload whose SHA3-256 differs from the manifest counts as a failed,
//! retryable attempt. The first verified payload is written to the cache.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheEntry, CacheError, CacheStore};
use crate::checksum::{digests_match, sha3_256_hex};
use crate::control::PipelineControl;
use crate::manifest::ShardDescriptor;
use crate::retry::{run_with_retry_using, AttemptError, RetryExhausted, RetryPolicy};
use crate::transport::ShardSource;
use crate::url_model::cache_key;

/// Failures of a single shard fetch.
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error("shard {uri} unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable {
        uri: String,
        attempts: u32,
        last_error: String,
    },
    #[error("cache lookup for {uri} failed: {source}")]
    Cache {
        uri: String,
        #[source]
        source: CacheError,
    },
    #[error("fetch of {uri} cancelled")]
    Cancelled { uri: String },
}

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Fetches shards into a [`CacheStore`]. Shared by all workers of a stream.
pub struct ShardFetcher {
    cache: CacheStore,
    source: Arc<dyn ShardSource>,
    policy: RetryPolicy,
    control: PipelineControl,
    sleeper: Option<Sleeper>,
}

impl std::fmt::Debug for ShardFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardFetcher")
            .field("cache", &self.cache)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ShardFetcher {
    pub fn new(cache: CacheStore, source: Arc<dyn ShardSource>, policy: RetryPolicy) -> Self {
        Self {
            cache,
            source,
            policy,
            control: PipelineControl::new(),
            sleeper: None,
        }
    }

    /// Share an abort token with the owning pipeline.
    pub fn with_control(mut self, control: PipelineControl) -> Self {
        self.control = control;
        self
    }

    /// Replace the backoff sleep (tests record the requested delays instead of waiting).
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Some(Arc::new(sleeper));
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn control(&self) -> &PipelineControl {
        &self.control
    }

    /// Return a verified cache entry for `shard`, downloading it if needed.
    /// Read the shard through [`CacheEntry::file`]; the path may be replaced
    /// by another writer at any time.
    pub fn fetch(&self, shard: &ShardDescriptor) -> Result<CacheEntry, ShardError> {
        self.fetch_with(shard, &self.control)
    }

    /// Like [`fetch`](Self::fetch), but observing `control` instead of the
    /// fetcher's own token. Stream workers pass their stream's child token.
    pub fn fetch_with(
        &self,
        shard: &ShardDescriptor,
        control: &PipelineControl,
    ) -> Result<CacheEntry, ShardError> {
        let key = cache_key(&shard.uri);
        let cached = self
            .cache
            .get(&key, &shard.expected_hash)
            .map_err(|source| ShardError::Cache {
                uri: shard.uri.clone(),
                source,
            })?;
        if let Some(entry) = cached {
            tracing::debug!(uri = %shard.uri, path = %entry.local_path.display(), "cache hit");
            return Ok(entry);
        }

        let outcome = run_with_retry_using(
            &self.policy,
            |d| self.backoff(d, control),
            |attempt| {
                if control.is_aborted() {
                    return Err(AttemptError::Cancelled);
                }
                let res = self.attempt(shard, &key);
                if let Err(e) = &res {
                    if !matches!(e, AttemptError::Cancelled) {
                        tracing::warn!(
                            uri = %shard.uri,
                            transport = shard.transport.kind(),
                            attempt = attempt + 1,
                            error = %e,
                            "shard attempt failed"
                        );
                    }
                }
                res
            },
        );

        match outcome {
            Ok(done) => {
                tracing::info!(uri = %shard.uri, attempts = done.attempts, "shard fetched and verified");
                Ok(done.value)
            }
            Err(RetryExhausted {
                error: AttemptError::Cancelled,
                ..
            }) => Err(ShardError::Cancelled {
                uri: shard.uri.clone(),
            }),
            Err(RetryExhausted { error, attempts }) => Err(ShardError::Unavailable {
                uri: shard.uri.clone(),
                attempts,
                last_error: error.to_string(),
            }),
        }
    }

    fn attempt(&self, shard: &ShardDescriptor, key: &str) -> Result<CacheEntry, AttemptError> {
        let bytes = self.source.retrieve(&shard.transport)?;
        let actual = sha3_256_hex(&bytes);
        if !digests_match(&actual, &shard.expected_hash) {
            return Err(AttemptError::HashMismatch {
                expected: shard.expected_hash.clone(),
                actual,
            });
        }
        self.cache
            .put(key, &bytes)
            .map_err(|e| AttemptError::Storage(e.to_string()))
    }

    fn backoff(&self, d: Duration, control: &PipelineControl) {
        match &self.sleeper {
            Some(sleep) => sleep(d),
            None => {
                control.sleep(d);
            }
        }
    }
}
