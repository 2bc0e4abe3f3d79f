//! Per-attempt error type for retry classification.

use std::fmt;

/// Error returned by a single shard download attempt.
/// Kept separate from the public errors so the executor can classify it first.
#[derive(Debug)]
pub enum AttemptError {
    /// Curl reported an error (timeout, connection, TLS, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// Reading a local source failed.
    Io(std::io::Error),
    /// Payload arrived but its SHA3-256 differs from the manifest.
    HashMismatch { expected: String, actual: String },
    /// Writing the verified payload into the cache failed. Not retried.
    Storage(String),
    /// The pipeline was closed while the attempt was pending.
    Cancelled,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Curl(e) => write!(f, "{}", e),
            AttemptError::Http(code) => write!(f, "HTTP {}", code),
            AttemptError::Io(e) => write!(f, "io: {}", e),
            AttemptError::HashMismatch { expected, actual } => {
                write!(f, "hash mismatch: expected {}, got {}", expected, actual)
            }
            AttemptError::Storage(msg) => write!(f, "cache write: {}", msg),
            AttemptError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for AttemptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AttemptError::Curl(e) => Some(e),
            AttemptError::Io(e) => Some(e),
            AttemptError::Http(_)
            | AttemptError::HashMismatch { .. }
            | AttemptError::Storage(_)
            | AttemptError::Cancelled => None,
        }
    }
}

impl From<curl::Error> for AttemptError {
    fn from(e: curl::Error) -> Self {
        AttemptError::Curl(e)
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        AttemptError::Io(e)
    }
}
