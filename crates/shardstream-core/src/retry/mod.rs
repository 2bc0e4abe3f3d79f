//! Retry and backoff policy.
//!
//! Error classification (timeouts, throttling, connection failures, corrupt
//! payloads) and exponential backoff decisions live here, apart from the
//! transports, so the fetcher can wrap any attempt in the same policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status, classify_io_error};
pub use error::AttemptError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, run_with_retry_using, RetryExhausted, Succeeded};
