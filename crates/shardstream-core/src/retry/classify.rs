//! Classify HTTP status, curl and I/O errors into retry policy error kinds.

use super::error::AttemptError;
use super::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        408 => ErrorKind::Timeout,
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Local reads fail transiently (e.g. a network mount); a missing or
/// unreadable file will not fix itself between attempts.
pub fn classify_io_error(e: &std::io::Error) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => ErrorKind::Other,
        _ => ErrorKind::Connection,
    }
}

/// Classify an attempt error into an ErrorKind.
pub fn classify(e: &AttemptError) -> ErrorKind {
    match e {
        AttemptError::Curl(ce) => classify_curl_error(ce),
        AttemptError::Http(code) => classify_http_status(*code),
        AttemptError::Io(ie) => classify_io_error(ie),
        AttemptError::HashMismatch { .. } => ErrorKind::Corrupt,
        AttemptError::Storage(_) => ErrorKind::Other,
        AttemptError::Cancelled => ErrorKind::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_and_503_throttled() {
        assert_eq!(classify_http_status(429), ErrorKind::Throttled);
        assert_eq!(classify_http_status(503), ErrorKind::Throttled);
        assert_eq!(classify_http_status(408), ErrorKind::Timeout);
    }

    #[test]
    fn http_5xx_retryable() {
        assert!(matches!(classify_http_status(500), ErrorKind::Http5xx(500)));
        assert!(matches!(classify_http_status(502), ErrorKind::Http5xx(502)));
    }

    #[test]
    fn http_4xx_other() {
        assert_eq!(classify_http_status(404), ErrorKind::Other);
        assert_eq!(classify_http_status(403), ErrorKind::Other);
    }

    #[test]
    fn hash_mismatch_is_corrupt() {
        let e = AttemptError::HashMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert_eq!(classify(&e), ErrorKind::Corrupt);
    }

    #[test]
    fn io_not_found_is_permanent() {
        let nf = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(classify(&AttemptError::Io(nf)), ErrorKind::Other);
        let intr = std::io::Error::new(std::io::ErrorKind::Interrupted, "eintr");
        assert_eq!(classify(&AttemptError::Io(intr)), ErrorKind::Connection);
    }

    #[test]
    fn storage_and_cancel_not_retryable_kinds() {
        assert_eq!(classify(&AttemptError::Storage("disk full".into())), ErrorKind::Other);
        assert_eq!(classify(&AttemptError::Cancelled), ErrorKind::Cancelled);
    }
}
