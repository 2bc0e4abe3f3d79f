//! Cache key derivation from shard URIs.
//!
//! A shard's cache slot is the sanitized basename of its URI, so
//! `https://host/train/shard-0001.bin` lives at `<cache_dir>/shard-0001.bin`.
//! The key depends only on the URI, never on the expected hash, so a slot
//! evicted after a mismatch is refilled in place.

mod path;
mod sanitize;

pub use path::uri_basename;
pub use sanitize::sanitize_cache_key;

use crate::checksum::sha3_256_hex;

/// Derives the cache key for a shard URI.
///
/// Falls back to the SHA3-256 of the URI when the basename is empty or
/// sanitizes to nothing usable.
///
/// # Examples
///
/// - `cache_key("file:///data/shard-0.bin")` → `"shard-0.bin"`
/// - `cache_key("ipfs://QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG")` → the CID
pub fn cache_key(uri: &str) -> String {
    uri_basename(uri)
        .map(|b| sanitize_cache_key(&b))
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| sha3_256_hex(uri.as_bytes()))
}
