//! Parse and structurally validate manifest JSON.

use std::collections::HashMap;

use serde_json::Value;

use super::{Manifest, ManifestError, ShardDescriptor};
use crate::checksum::sha3_256_hex;
use crate::transport::Transport;
use crate::url_model::cache_key;

/// Length of a hex SHA3-256 digest.
const HASH_HEX_LEN: usize = 64;

/// SHA3-256 over the compact JSON re-serialization of `doc`.
///
/// serde_json's default map keeps object keys sorted, so two documents that
/// differ only in whitespace or key order share a digest.
pub fn canonical_digest(doc: &Value) -> String {
    // Serializing a Value cannot fail: keys are always strings.
    let bytes = serde_json::to_vec(doc).unwrap_or_default();
    sha3_256_hex(&bytes)
}

/// Parse manifest bytes into a [`Manifest`].
///
/// Not JSON, or no `datasets` array: `Malformed`. Empty list, entry without a
/// usable `uri`/`hash`, an unsupported scheme, or two shards with different
/// hashes mapping to the same cache file: `Invalid`. Unknown fields are ignored.
pub fn parse_manifest(raw: &[u8]) -> Result<Manifest, ManifestError> {
    let doc: Value = serde_json::from_slice(raw)
        .map_err(|e| ManifestError::Malformed(format!("invalid JSON: {}", e)))?;

    let datasets = doc
        .get("datasets")
        .and_then(Value::as_array)
        .ok_or_else(|| ManifestError::Malformed("missing `datasets` array".to_string()))?;

    let shards = datasets
        .iter()
        .enumerate()
        .map(|(i, entry)| parse_entry(i, entry))
        .collect::<Result<Vec<_>, _>>()?;
    check_cache_keys(&shards)?;

    Manifest::new(shards, canonical_digest(&doc))
}

/// Shards share a cache file by name; that is only sound when their content is identical.
fn check_cache_keys(shards: &[ShardDescriptor]) -> Result<(), ManifestError> {
    let mut seen: HashMap<String, &ShardDescriptor> = HashMap::new();
    for shard in shards {
        let key = cache_key(&shard.uri);
        if let Some(prev) = seen.get(&key) {
            if prev.expected_hash != shard.expected_hash {
                return Err(ManifestError::Invalid(format!(
                    "{} and {} map to the same cache file `{}` with different hashes",
                    prev.uri, shard.uri, key
                )));
            }
            continue;
        }
        seen.insert(key, shard);
    }
    Ok(())
}

fn parse_entry(index: usize, entry: &Value) -> Result<ShardDescriptor, ManifestError> {
    let invalid = |what: &str| ManifestError::Invalid(format!("dataset {}: {}", index, what));

    if !entry.is_object() {
        return Err(invalid("entry is not an object"));
    }
    let hash = match entry.get("hash") {
        None => return Err(invalid("missing `hash`")),
        Some(v) => v.as_str().ok_or_else(|| invalid("`hash` is not a string"))?.trim(),
    };
    if hash.is_empty() {
        return Err(invalid("empty `hash`"));
    }
    if hash.len() != HASH_HEX_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("`hash` is not a hex SHA3-256 digest"));
    }
    let uri = match entry.get("uri") {
        None => return Err(invalid("missing `uri`")),
        Some(v) => v.as_str().ok_or_else(|| invalid("`uri` is not a string"))?.trim(),
    };
    if uri.is_empty() {
        return Err(invalid("empty `uri`"));
    }
    let transport = Transport::parse(uri).map_err(|e| invalid(&e.to_string()))?;

    Ok(ShardDescriptor {
        uri: uri.to_string(),
        expected_hash: hash.to_ascii_lowercase(),
        transport,
    })
}
