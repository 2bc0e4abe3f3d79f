//! Checksum command: compute SHA3-256 of a file.

use anyhow::Result;
use shardstream_core::checksum;
use std::path::Path;

/// Compute and print SHA3-256 of the given file.
pub async fn run_checksum(path: &Path) -> Result<()> {
    let digest = checksum::sha3_256_path(path)?;
    println!("{}  {}", digest, path.display());
    Ok(())
}
