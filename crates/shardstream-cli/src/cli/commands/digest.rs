//! `shardstream digest` – print a manifest's canonical digest.

use anyhow::{Context, Result};
use shardstream_core::ManifestResolver;

/// Load (without verifying) the manifest at `uri` and print its digest and shard count.
pub async fn run_digest(uri: &str, gateway: &str) -> Result<()> {
    let manifest = ManifestResolver::new(gateway)
        .load(uri)
        .await
        .with_context(|| format!("load manifest {}", uri))?;
    println!("{}  {} shard(s)  {}", manifest.digest(), manifest.len(), uri);
    Ok(())
}
