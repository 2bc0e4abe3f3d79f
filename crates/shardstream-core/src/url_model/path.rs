//! Basename extraction from shard URIs.

/// Returns the last non-empty path segment of a URI or plain path, ignoring
/// any query string or fragment. For `ipfs://<cid>` with no path this is the CID.
///
/// Returns `None` if nothing usable remains (empty, `.` or `..`).
pub fn uri_basename(uri: &str) -> Option<String> {
    let rest = match uri.split_once("://") {
        Some((_, rest)) => rest,
        None => uri,
    };
    let rest = rest.split(['?', '#']).next().unwrap_or("");
    let segment = rest.split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal() {
        assert_eq!(
            uri_basename("https://example.com/a/b/shard.bin").as_deref(),
            Some("shard.bin")
        );
        assert_eq!(uri_basename("relative/dir/x.f32").as_deref(), Some("x.f32"));
    }

    #[test]
    fn trailing_slash_and_host_only() {
        assert_eq!(uri_basename("file:///data/shards/").as_deref(), Some("shards"));
        assert_eq!(uri_basename("https://example.com/").as_deref(), Some("example.com"));
        assert_eq!(uri_basename(""), None);
        assert_eq!(uri_basename("file:///"), None);
    }

    #[test]
    fn with_query_and_fragment() {
        assert_eq!(
            uri_basename("https://example.com/file.bin?token=a/b#frag").as_deref(),
            Some("file.bin")
        );
    }

    #[test]
    fn dot_segments() {
        assert_eq!(uri_basename("file:///data/."), None);
        assert_eq!(uri_basename("file:///data/.."), None);
    }
}
