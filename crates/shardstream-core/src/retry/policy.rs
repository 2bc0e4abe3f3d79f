use rand::Rng;
use std::time::Duration;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Server asked us to slow down (e.g. 429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, short read, etc.).
    Connection,
    /// HTTP status that is retryable but not strictly throttling (5xx).
    Http5xx(u16),
    /// Payload hash did not match; a corrupted transfer may succeed next time.
    Corrupt,
    /// Pipeline shutdown; never retried.
    Cancelled,
    /// Any other error (not retried).
    Other,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with a cap and optional jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
    /// Draw each delay uniformly from [delay/2, delay].
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt with 0-based index `attempt_index`:
    /// `base_delay * 2^attempt_index`, capped at `max_delay`.
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        let exp = 1u32 << attempt_index.min(16);
        let raw = self.base_delay.saturating_mul(exp);
        let delay = raw.min(self.max_delay);
        if self.jitter && !delay.is_zero() {
            let lo = delay / 2;
            rand::thread_rng().gen_range(lo..=delay)
        } else {
            delay
        }
    }

    /// Decide what to do after a failure.
    ///
    /// `attempt` is 1-based (1 = first attempt). Returns `RetryDecision::NoRetry`
    /// when we should stop retrying.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::Other | ErrorKind::Cancelled => RetryDecision::NoRetry,
            ErrorKind::Timeout
            | ErrorKind::Connection
            | ErrorKind::Throttled
            | ErrorKind::Http5xx(_)
            | ErrorKind::Corrupt => {
                RetryDecision::RetryAfter(self.backoff(attempt.saturating_sub(1)))
            }
        }
    }
}
