//! Manifest model, parsing and resolution.
//!
//! A manifest is a JSON document listing shards and their SHA3-256 hashes:
//!
//! ```json
//! { "datasets": [ { "uri": "ipfs://Qm.../shard-0.bin", "hash": "<64 hex>" } ] }
//! ```

mod authority;
mod parse;
mod resolve;

pub use authority::{AllowListAuthority, IntegrityAuthority};
pub use parse::{canonical_digest, parse_manifest};
pub use resolve::ManifestResolver;

use crate::transport::Transport;

/// Failures while producing a [`Manifest`]. All of them abort initialization.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest unreachable at {uri}: {reason}")]
    Unreachable { uri: String, reason: String },
    #[error("manifest malformed: {0}")]
    Malformed(String),
    #[error("manifest invalid: {0}")]
    Invalid(String),
    #[error("manifest digest {digest} is not registered with the integrity authority")]
    Tampered { digest: String },
    #[error("integrity authority unavailable: {0}")]
    AuthorityUnavailable(String),
}

/// One shard entry. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDescriptor {
    pub uri: String,
    /// Lowercase hex SHA3-256 of the shard bytes.
    pub expected_hash: String,
    pub transport: Transport,
}

/// Ordered, non-empty list of shards plus the digest of the document they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    shards: Vec<ShardDescriptor>,
    digest: String,
}

impl Manifest {
    /// Build a manifest directly. Fails if `shards` is empty.
    pub fn new(shards: Vec<ShardDescriptor>, digest: String) -> Result<Self, ManifestError> {
        if shards.is_empty() {
            return Err(ManifestError::Invalid("manifest lists no datasets".to_string()));
        }
        Ok(Manifest { shards, digest })
    }

    pub fn shards(&self) -> &[ShardDescriptor] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Canonical SHA3-256 of the manifest document (see [`canonical_digest`]).
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The shards this rank trains on: every `world_size`-th descriptor
    /// starting at `rank`, in manifest order.
    pub fn partition(&self, rank: usize, world_size: usize) -> Result<Manifest, ManifestError> {
        if world_size == 0 || rank >= world_size {
            return Err(ManifestError::Invalid(format!(
                "partition rank {} out of range for world_size {}",
                rank, world_size
            )));
        }
        let shards: Vec<_> = self
            .shards
            .iter()
            .enumerate()
            .filter(|(i, _)| i % world_size == rank)
            .map(|(_, s)| s.clone())
            .collect();
        if shards.is_empty() {
            return Err(ManifestError::Invalid(format!(
                "partition rank {} of {} selects none of {} shards",
                rank,
                world_size,
                self.shards.len()
            )));
        }
        Ok(Manifest {
            shards,
            digest: self.digest.clone(),
        })
    }
}
