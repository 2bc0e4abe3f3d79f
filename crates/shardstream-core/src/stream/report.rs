//! Per-run accounting of which shards were delivered and which failed.

/// A shard that contributed batches (or, for a prefetch, landed in the cache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSummary {
    pub index: usize,
    pub uri: String,
    pub batches: usize,
    pub samples: usize,
}

/// A shard that contributed nothing, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFailure {
    pub index: usize,
    pub uri: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub shards_total: usize,
    pub delivered: Vec<ShardSummary>,
    pub failed: Vec<ShardFailure>,
}

impl StreamReport {
    pub fn new(shards_total: usize) -> Self {
        Self {
            shards_total,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> usize {
        self.delivered.iter().map(|s| s.batches).sum()
    }

    pub fn samples(&self) -> usize {
        self.delivered.iter().map(|s| s.samples).sum()
    }

    /// Shards neither delivered nor failed (the stream was closed early).
    pub fn skipped(&self) -> usize {
        self.shards_total
            .saturating_sub(self.delivered.len() + self.failed.len())
    }

    /// True when every shard in the manifest was delivered.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.delivered.len() == self.shards_total
    }
}
