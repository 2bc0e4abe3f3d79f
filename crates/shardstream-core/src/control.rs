//! Shutdown signalling for worker threads.
//!
//! The pipeline owns a root `PipelineControl`; every stream takes a child of
//! it. Closing the pipeline aborts all streams, dropping a stream aborts only
//! its own workers. Workers check the token before starting a shard, before
//! each download attempt, and while sleeping between attempts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of abort checks during a backoff sleep.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared abort token. Cheap to clone; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct PipelineControl {
    aborted: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl PipelineControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is aborted when either it or `self` is.
    /// Only one level deep: a child's own children do not see the grandparent.
    pub fn child(&self) -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.aborted)),
        }
    }

    /// Ask every holder of this token to stop at its next check.
    pub fn request_abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.load(Ordering::Relaxed))
    }

    /// Sleep for `d`, waking early if abort is requested.
    /// Returns false if the sleep was cut short.
    pub fn sleep(&self, d: Duration) -> bool {
        let deadline = Instant::now() + d;
        loop {
            if self.is_aborted() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_flag() {
        let c = PipelineControl::new();
        let c2 = c.clone();
        assert!(!c2.is_aborted());
        c.request_abort();
        assert!(c2.is_aborted());
    }

    #[test]
    fn child_sees_parent_abort_but_not_vice_versa() {
        let root = PipelineControl::new();
        let a = root.child();
        let b = root.child();
        a.request_abort();
        assert!(a.is_aborted());
        assert!(!b.is_aborted());
        assert!(!root.is_aborted());
        root.request_abort();
        assert!(b.is_aborted());
    }

    #[test]
    fn sleep_returns_early_on_abort() {
        let c = PipelineControl::new();
        let c2 = c.clone();
        let t = std::thread::spawn(move || {
            let start = Instant::now();
            let completed = c2.sleep(Duration::from_secs(10));
            (completed, start.elapsed())
        });
        std::thread::sleep(Duration::from_millis(100));
        c.request_abort();
        let (completed, elapsed) = t.join().unwrap();
        assert!(!completed);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn sleep_completes_without_abort() {
        assert!(PipelineControl::new().sleep(Duration::from_millis(10)));
    }
}
