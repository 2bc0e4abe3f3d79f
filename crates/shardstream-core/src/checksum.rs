//! SHA3-256 content hashing.
//!
//! Shard payloads and cache files are hashed byte-for-byte; nothing is
//! normalized before hashing.

use anyhow::{Context, Result};
use sha3::{Digest, Sha3_256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// Compute SHA3-256 of an in-memory buffer and return it as lowercase hex.
pub fn sha3_256_hex(data: &[u8]) -> String {
    hex::encode(Sha3_256::digest(data))
}

/// Compute SHA3-256 of a file and return the digest as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large shards.
pub fn sha3_256_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    sha3_256_reader(&mut f).with_context(|| format!("read {}", path.display()))
}

/// Streaming SHA3-256 over any reader, as lowercase hex.
pub fn sha3_256_reader<R: Read>(r: &mut R) -> io::Result<String> {
    let mut hasher = Sha3_256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Case-insensitive comparison of two hex digests.
pub fn digests_match(actual: &str, expected: &str) -> bool {
    actual.eq_ignore_ascii_case(expected.trim())
}
