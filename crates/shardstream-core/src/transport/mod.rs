//! Retrieval transports for manifests and shards.
//!
//! A URI is resolved once into a [`Transport`] when the manifest is parsed;
//! everything downstream matches on the variant instead of re-inspecting the
//! scheme string.

mod http;

pub use http::{gateway_url, http_get, HttpOptions};

use crate::retry::AttemptError;
use std::fmt;
use std::path::PathBuf;

/// Where a document or shard is retrieved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// `file://` URI or a plain filesystem path.
    LocalFile(PathBuf),
    /// `http://` or `https://` URL, fetched as-is.
    Http(String),
    /// `ipfs://<cid>[/path]`; holds everything after the scheme.
    Ipfs(String),
}

/// URI scheme outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedScheme(pub String);

impl fmt::Display for UnsupportedScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported URI scheme: {}", self.0)
    }
}

impl std::error::Error for UnsupportedScheme {}

impl Transport {
    /// Resolve a URI into a transport.
    ///
    /// A string without `://` is treated as a local path. `file://` URIs are
    /// decoded with the `url` crate so percent-escapes become real bytes.
    pub fn parse(uri: &str) -> Result<Self, UnsupportedScheme> {
        let uri = uri.trim();
        let Some((scheme, rest)) = uri.split_once("://") else {
            return Ok(Transport::LocalFile(PathBuf::from(uri)));
        };
        match scheme.to_ascii_lowercase().as_str() {
            "file" => {
                let path = url::Url::parse(uri)
                    .ok()
                    .and_then(|u| u.to_file_path().ok())
                    .unwrap_or_else(|| PathBuf::from(rest));
                Ok(Transport::LocalFile(path))
            }
            "http" | "https" => Ok(Transport::Http(uri.to_string())),
            "ipfs" => {
                let path = rest.trim_start_matches('/');
                if path.is_empty() {
                    return Err(UnsupportedScheme("ipfs:// without a CID".to_string()));
                }
                Ok(Transport::Ipfs(path.to_string()))
            }
            other => Err(UnsupportedScheme(other.to_string())),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::LocalFile(_) => "file",
            Transport::Http(_) => "http",
            Transport::Ipfs(_) => "ipfs",
        }
    }
}

/// Something that can retrieve the raw bytes behind a [`Transport`].
///
/// The default implementation is [`CurlSource`]; tests substitute their own to
/// count calls or inject failures.
pub trait ShardSource: Send + Sync {
    fn retrieve(&self, transport: &Transport) -> Result<Vec<u8>, AttemptError>;
}

/// libcurl for HTTP(S) and IPFS gateway fetches, std fs for local files.
#[derive(Debug, Clone)]
pub struct CurlSource {
    pub gateway: String,
    pub http: HttpOptions,
}

impl CurlSource {
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            http: HttpOptions::default(),
        }
    }
}

impl ShardSource for CurlSource {
    fn retrieve(&self, transport: &Transport) -> Result<Vec<u8>, AttemptError> {
        match transport {
            Transport::LocalFile(path) => Ok(std::fs::read(path)?),
            Transport::Http(url) => http_get(url, &self.http),
            Transport::Ipfs(path) => http_get(&gateway_url(&self.gateway, path), &self.http),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_each_scheme() {
        assert_eq!(
            Transport::parse("file:///data/a.bin").unwrap(),
            Transport::LocalFile(PathBuf::from("/data/a.bin"))
        );
        assert_eq!(
            Transport::parse("relative/a.bin").unwrap(),
            Transport::LocalFile(PathBuf::from("relative/a.bin"))
        );
        assert_eq!(
            Transport::parse("https://example.com/a.bin").unwrap(),
            Transport::Http("https://example.com/a.bin".to_string())
        );
        assert_eq!(
            Transport::parse("HTTP://example.com/a.bin").unwrap().kind(),
            "http"
        );
        assert_eq!(
            Transport::parse("ipfs://QmCid/a.bin").unwrap(),
            Transport::Ipfs("QmCid/a.bin".to_string())
        );
    }

    #[test]
    fn file_uri_percent_decoding() {
        assert_eq!(
            Transport::parse("file:///data/my%20shard.bin").unwrap(),
            Transport::LocalFile(PathBuf::from("/data/my shard.bin"))
        );
    }

    #[test]
    fn rejects_unknown_scheme_and_bare_ipfs() {
        assert_eq!(
            Transport::parse("s3://bucket/key").unwrap_err(),
            UnsupportedScheme("s3".to_string())
        );
        assert!(Transport::parse("ipfs://").is_err());
    }

    #[test]
    fn local_source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("s.bin");
        std::fs::write(&p, b"abc").unwrap();
        let src = CurlSource::new(crate::config::DEFAULT_IPFS_GATEWAY);
        assert_eq!(src.retrieve(&Transport::LocalFile(p)).unwrap(), b"abc");
    }
}
