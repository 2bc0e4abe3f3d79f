//! Integrity authority: the external party that knows which manifest digests
//! were registered (in production, an on-chain record).

use std::collections::HashSet;

/// Answers whether a manifest digest is registered.
///
/// Implementations may block on network I/O; the resolver calls them from a
/// blocking task. `Err` means the authority could not be asked, which is
/// distinct from `Ok(false)` (asked, and the digest is unknown).
pub trait IntegrityAuthority: Send + Sync {
    fn verify(&self, manifest_digest: &str) -> anyhow::Result<bool>;
}

/// Authority backed by a fixed set of trusted digests.
#[derive(Debug, Clone, Default)]
pub struct AllowListAuthority {
    digests: HashSet<String>,
}

impl AllowListAuthority {
    pub fn new<I, S>(digests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            digests: digests
                .into_iter()
                .map(|d| d.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl IntegrityAuthority for AllowListAuthority {
    fn verify(&self, manifest_digest: &str) -> anyhow::Result<bool> {
        Ok(self.digests.contains(&manifest_digest.to_ascii_lowercase()))
    }
}
