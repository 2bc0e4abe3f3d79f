//! Fetch a manifest over its transport, parse it, and optionally check its
//! digest with the integrity authority.
//!
//! This runs once per pipeline, as a single async flow. Blocking pieces (curl,
//! the authority call) are moved onto tokio's blocking pool.

use std::sync::Arc;

use super::{parse_manifest, IntegrityAuthority, Manifest, ManifestError};
use crate::config::DEFAULT_IPFS_GATEWAY;
use crate::transport::{gateway_url, http_get, HttpOptions, Transport};

/// Loads manifests. Cheap to clone.
#[derive(Clone)]
pub struct ManifestResolver {
    gateway: String,
    http: HttpOptions,
    verify_chain: bool,
    authority: Option<Arc<dyn IntegrityAuthority>>,
}

impl std::fmt::Debug for ManifestResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestResolver")
            .field("gateway", &self.gateway)
            .field("verify_chain", &self.verify_chain)
            .field("authority", &self.authority.is_some())
            .finish()
    }
}

impl Default for ManifestResolver {
    fn default() -> Self {
        Self::new(DEFAULT_IPFS_GATEWAY)
    }
}

impl ManifestResolver {
    /// Resolver with verification disabled.
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            http: HttpOptions::default(),
            verify_chain: false,
            authority: None,
        }
    }

    /// Require every loaded manifest to be registered with `authority`.
    pub fn with_authority(mut self, authority: Arc<dyn IntegrityAuthority>) -> Self {
        self.authority = Some(authority);
        self.verify_chain = true;
        self
    }

    /// Turn verification on or off. Turning it on without an authority makes
    /// every `load` fail with `AuthorityUnavailable`.
    pub fn verify_chain(mut self, enabled: bool) -> Self {
        self.verify_chain = enabled;
        self
    }

    pub fn with_http_options(mut self, http: HttpOptions) -> Self {
        self.http = http;
        self
    }

    /// Fetch, parse and (if enabled) verify the manifest at `uri`.
    pub async fn load(&self, uri: &str) -> Result<Manifest, ManifestError> {
        tracing::info!(uri, "loading manifest");
        let raw = self.fetch_document(uri).await?;
        let manifest = parse_manifest(&raw)?;
        tracing::info!(
            uri,
            shards = manifest.len(),
            digest = manifest.digest(),
            "manifest parsed"
        );
        if self.verify_chain {
            self.verify(&manifest).await?;
        }
        Ok(manifest)
    }

    /// Ask the integrity authority whether `manifest`'s digest is registered.
    pub async fn verify(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let authority = self.authority.clone().ok_or_else(|| {
            ManifestError::AuthorityUnavailable(
                "verification enabled but no integrity authority configured".to_string(),
            )
        })?;
        let digest = manifest.digest().to_string();
        let check = digest.clone();
        let registered = tokio::task::spawn_blocking(move || authority.verify(&check))
            .await
            .map_err(|e| ManifestError::AuthorityUnavailable(format!("authority task: {}", e)))?
            .map_err(|e| ManifestError::AuthorityUnavailable(format!("{:#}", e)))?;
        if !registered {
            tracing::error!(digest = %digest, "manifest digest not registered");
            return Err(ManifestError::Tampered { digest });
        }
        tracing::info!(digest = %digest, "manifest verified with integrity authority");
        Ok(())
    }

    async fn fetch_document(&self, uri: &str) -> Result<Vec<u8>, ManifestError> {
        let unreachable = |reason: String| ManifestError::Unreachable {
            uri: uri.to_string(),
            reason,
        };
        let transport = Transport::parse(uri).map_err(|e| unreachable(e.to_string()))?;
        let url = match transport {
            Transport::LocalFile(path) => {
                return tokio::fs::read(&path)
                    .await
                    .map_err(|e| unreachable(format!("{}: {}", path.display(), e)));
            }
            Transport::Http(url) => url,
            Transport::Ipfs(path) => gateway_url(&self.gateway, &path),
        };
        let http = self.http;
        tokio::task::spawn_blocking(move || http_get(&url, &http))
            .await
            .map_err(|e| unreachable(format!("fetch task: {}", e)))?
            .map_err(|e| unreachable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::AllowListAuthority;

    fn write_manifest(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("manifest.json");
        let body = format!(
            r#"{{"datasets": [{{"uri": "file:///d/a.bin", "hash": "{}"}}]}}"#,
            "a".repeat(64)
        );
        std::fs::write(&path, body).unwrap();
        path
    }

    struct Failing;

    impl IntegrityAuthority for Failing {
        fn verify(&self, _: &str) -> anyhow::Result<bool> {
            anyhow::bail!("rpc down")
        }
    }

    #[tokio::test]
    async fn loads_file_uri_and_plain_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path());
        let r = ManifestResolver::default();
        let m = r.load(&format!("file://{}", path.display())).await.unwrap();
        assert_eq!(m.len(), 1);
        let m2 = r.load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(m, m2);
    }

    #[tokio::test]
    async fn missing_file_is_unreachable() {
        let r = ManifestResolver::default();
        let err = r.load("file:///definitely/not/here.json").await.unwrap_err();
        assert!(matches!(err, ManifestError::Unreachable { .. }), "{err}");
    }

    #[tokio::test]
    async fn registered_digest_passes_and_unregistered_is_tampered() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path());
        let uri = path.to_str().unwrap().to_string();
        let digest = ManifestResolver::default().load(&uri).await.unwrap().digest().to_string();

        let ok = ManifestResolver::default()
            .with_authority(Arc::new(AllowListAuthority::new([digest.as_str()])));
        ok.load(&uri).await.unwrap();

        let bad = ManifestResolver::default()
            .with_authority(Arc::new(AllowListAuthority::new(["00"])));
        let err = bad.load(&uri).await.unwrap_err();
        assert!(matches!(err, ManifestError::Tampered { digest: d } if d == digest));
    }

    #[tokio::test]
    async fn authority_failure_or_absence_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let uri = write_manifest(dir.path()).to_str().unwrap().to_string();

        let err = ManifestResolver::default()
            .with_authority(Arc::new(Failing))
            .load(&uri)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::AuthorityUnavailable(_)));

        let err = ManifestResolver::default()
            .verify_chain(true)
            .load(&uri)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::AuthorityUnavailable(_)));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_unreachable() {
        let err = ManifestResolver::default()
            .load("ftp://example.com/m.json")
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::Unreachable { .. }));
    }
}
