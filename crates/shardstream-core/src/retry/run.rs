//! Retry loop: run a closure until success or policy says stop.

use super::classify;
use super::error::AttemptError;
use super::policy::{RetryDecision, RetryPolicy};
use std::time::Duration;

/// Value produced by the successful attempt and how many attempts it took.
#[derive(Debug)]
pub struct Succeeded<T> {
    pub value: T,
    pub attempts: u32,
}

/// Last error seen when the policy gave up.
#[derive(Debug)]
pub struct RetryExhausted {
    pub error: AttemptError,
    pub attempts: u32,
}

/// Runs `f` until it succeeds or the retry policy says to stop, sleeping the
/// calling thread for the backoff duration between attempts.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, f: F) -> Result<Succeeded<T>, RetryExhausted>
where
    F: FnMut(u32) -> Result<T, AttemptError>,
{
    run_with_retry_using(policy, std::thread::sleep, f)
}

/// Like [`run_with_retry`] with a caller-supplied sleep.
///
/// `f` receives the 0-based attempt index. `sleep` is called once between
/// each pair of attempts with the policy's backoff delay.
pub fn run_with_retry_using<T, F, S>(
    policy: &RetryPolicy,
    mut sleep: S,
    mut f: F,
) -> Result<Succeeded<T>, RetryExhausted>
where
    F: FnMut(u32) -> Result<T, AttemptError>,
    S: FnMut(Duration),
{
    let mut attempt = 1u32;
    loop {
        match f(attempt - 1) {
            Ok(value) => {
                return Ok(Succeeded {
                    value,
                    attempts: attempt,
                })
            }
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => {
                        return Err(RetryExhausted {
                            error: e,
                            attempts: attempt,
                        })
                    }
                    RetryDecision::RetryAfter(d) => {
                        let delay_ms = d.as_millis() as u64;
                        tracing::debug!(attempt, ?kind, delay_ms, "retrying after backoff");
                        sleep(d);
                        attempt += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mismatch() -> AttemptError {
        AttemptError::HashMismatch {
            expected: "00".into(),
            actual: "ff".into(),
        }
    }

    #[test]
    fn third_attempt_succeeds_after_one_and_two_second_waits() {
        let policy = RetryPolicy::default();
        let mut waits = Vec::new();
        let out = run_with_retry_using(
            &policy,
            |d| waits.push(d),
            |i| if i < 2 { Err(mismatch()) } else { Ok(i) },
        )
        .unwrap();
        assert_eq!(out.value, 2);
        assert_eq!(out.attempts, 3);
        assert_eq!(waits, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[test]
    fn exhausts_budget_and_reports_attempts() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let err = run_with_retry_using(&policy, |_| {}, |_| -> Result<(), _> {
            calls += 1;
            Err(AttemptError::Http(502))
        })
        .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(err.attempts, 3);
        assert!(matches!(err.error, AttemptError::Http(502)));
    }

    #[test]
    fn permanent_error_stops_immediately() {
        let policy = RetryPolicy::default();
        let mut waits = 0;
        let err = run_with_retry_using(&policy, |_| waits += 1, |_| -> Result<(), _> {
            Err(AttemptError::Http(404))
        })
        .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(waits, 0);
    }

    #[test]
    fn real_sleep_with_zero_delay() {
        let policy = RetryPolicy {
            base_delay: Duration::ZERO,
            ..RetryPolicy::default()
        };
        let out = run_with_retry(&policy, |i| if i == 0 { Err(mismatch()) } else { Ok("ok") }).unwrap();
        assert_eq!(out.attempts, 2);
    }
}
