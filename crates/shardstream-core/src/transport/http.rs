//! Whole-body HTTP GET over libcurl.
//!
//! Blocking; call from a worker thread or `spawn_blocking` when used from
//! async code. Each call owns its own `Easy` handle, so no connection outlives
//! the request.

use crate::retry::AttemptError;
use std::time::Duration;

/// Timeouts for a single GET.
#[derive(Debug, Clone, Copy)]
pub struct HttpOptions {
    pub connect_timeout: Duration,
    /// Abort if the transfer stays below 1 KiB/s for this long.
    pub low_speed_time: Duration,
    pub total_timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_time: Duration::from_secs(60),
            total_timeout: Duration::from_secs(3600),
        }
    }
}

/// Joins an IPFS gateway prefix and a `<cid>[/path]`.
pub fn gateway_url(gateway: &str, path: &str) -> String {
    format!(
        "{}/{}",
        gateway.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// GETs `url` and returns the body. Peer and host TLS verification stay on;
/// a non-2xx final status is `AttemptError::Http`.
pub fn http_get(url: &str, opts: &HttpOptions) -> Result<Vec<u8>, AttemptError> {
    let mut body = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.ssl_verify_peer(true)?;
    easy.ssl_verify_host(true)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.low_speed_limit(1024)?;
    easy.low_speed_time(opts.low_speed_time)?;
    easy.timeout(opts.total_timeout)?;

    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(AttemptError::Http(code));
    }
    tracing::trace!(url, bytes = body.len(), "GET complete");
    Ok(body)
}
