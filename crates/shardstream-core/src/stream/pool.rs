//! Bounded worker pool that hands results back in submission order.
//!
//! Workers pull `(index, item)` pairs from a shared queue and send each result
//! down a per-item channel, so the consumer can wait on item `i` while items
//! `i+1..` finish out of order. A window caps how far workers may run ahead of
//! the consumer, bounding the memory held in undelivered results.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::control::PipelineControl;

type Task<T, R> = (usize, T, Sender<R>);

/// Count of results the consumer has taken; workers wait on it.
#[derive(Default)]
struct Progress {
    taken: Mutex<usize>,
    advanced: Condvar,
}

const WINDOW_POLL: Duration = Duration::from_millis(50);

pub(crate) struct OrderedPool<R> {
    slots: VecDeque<Receiver<R>>,
    taken: usize,
    progress: Arc<Progress>,
    handles: Vec<JoinHandle<()>>,
    control: PipelineControl,
}

impl<R: Send + 'static> OrderedPool<R> {
    /// Start `workers` threads running `work` over `items`.
    ///
    /// A worker will not start item `i` until fewer than `window` earlier
    /// results are waiting to be taken.
    pub(crate) fn spawn<T, F>(
        items: Vec<T>,
        workers: usize,
        window: usize,
        control: PipelineControl,
        work: F,
    ) -> Self
    where
        T: Send + 'static,
        F: Fn(usize, T) -> R + Send + Sync + 'static,
    {
        let count = items.len();
        let mut slots = VecDeque::with_capacity(count);
        let mut queue = VecDeque::with_capacity(count);
        for (index, item) in items.into_iter().enumerate() {
            let (tx, rx) = mpsc::channel();
            queue.push_back((index, item, tx));
            slots.push_back(rx);
        }

        let queue: Arc<Mutex<VecDeque<Task<T, R>>>> = Arc::new(Mutex::new(queue));
        let progress = Arc::new(Progress::default());
        let work = Arc::new(work);
        let window = window.max(1);
        let num_workers = workers.max(1).min(count);
        let mut handles = Vec::with_capacity(num_workers);
        for n in 0..num_workers {
            let queue = Arc::clone(&queue);
            let progress = Arc::clone(&progress);
            let work = Arc::clone(&work);
            let control = control.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("shard-worker-{}", n))
                .spawn(move || worker_loop(&queue, &progress, window, &control, &*work));
            match spawned {
                Ok(h) => handles.push(h),
                Err(e) => tracing::error!(error = %e, "failed to spawn worker thread"),
            }
        }
        // If every spawn failed, dropping the queue here drops all senders and
        // the consumer sees every slot as abandoned.
        drop(queue);

        Self {
            slots,
            taken: 0,
            progress,
            handles,
            control,
        }
    }

    /// Block for the next result in submission order.
    ///
    /// `Some(None)` means the item was abandoned: its worker panicked or the
    /// pool was aborted before reaching it. `None` means every item has been taken.
    pub(crate) fn next_result(&mut self) -> Option<Option<R>> {
        let rx = self.slots.pop_front()?;
        let res = rx.recv().ok();
        self.taken += 1;
        if let Ok(mut taken) = self.progress.taken.lock() {
            *taken = self.taken;
        }
        self.progress.advanced.notify_all();
        Some(res)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.slots.len()
    }
}

impl<R> OrderedPool<R> {
    /// Signal workers to stop, then wait for them. In-flight items run to the
    /// end of their current attempt; queued items are abandoned.
    pub(crate) fn shutdown(&mut self) {
        self.control.request_abort();
        self.progress.advanced.notify_all();
        self.slots.clear();
        for h in self.handles.drain(..) {
            if h.join().is_err() {
                tracing::error!("worker thread panicked outside a task");
            }
        }
    }
}

impl<R> Drop for OrderedPool<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<T, R, F>(
    queue: &Mutex<VecDeque<Task<T, R>>>,
    progress: &Progress,
    window: usize,
    control: &PipelineControl,
    work: &F,
) where
    F: Fn(usize, T) -> R,
{
    loop {
        if control.is_aborted() {
            break;
        }
        let next = match queue.lock() {
            Ok(mut q) => q.pop_front(),
            Err(_) => break,
        };
        let Some((index, item, tx)) = next else { break };

        if !wait_for_window(progress, index, window, control) {
            break;
        }
        match catch_unwind(AssertUnwindSafe(|| work(index, item))) {
            // The consumer may have gone away; nothing to do then.
            Ok(res) => {
                let _ = tx.send(res);
            }
            Err(_) => tracing::error!(index, "worker task panicked; item abandoned"),
        }
    }
}

/// Wait until item `index` is inside the window. False if aborted meanwhile.
fn wait_for_window(
    progress: &Progress,
    index: usize,
    window: usize,
    control: &PipelineControl,
) -> bool {
    let Ok(mut taken) = progress.taken.lock() else {
        return false;
    };
    while index >= *taken + window {
        if control.is_aborted() {
            return false;
        }
        taken = match progress.advanced.wait_timeout(taken, WINDOW_POLL) {
            Ok((guard, _)) => guard,
            Err(_) => return false,
        };
    }
    !control.is_aborted()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn results_come_back_in_submission_order() {
        let items: Vec<u64> = (0..20).collect();
        // Earlier items sleep longer so they finish last.
        let mut pool = OrderedPool::spawn(items, 4, 20, PipelineControl::new(), |i, v| {
            std::thread::sleep(Duration::from_millis(20 - i as u64));
            v * 10
        });
        let mut out = Vec::new();
        while let Some(r) = pool.next_result() {
            out.push(r.unwrap());
        }
        assert_eq!(out, (0..20).map(|v| v * 10).collect::<Vec<_>>());
    }

    #[test]
    fn concurrency_is_bounded_by_worker_count() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let mut pool = OrderedPool::spawn(vec![(); 12], 3, 12, PipelineControl::new(), move |_, _| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            r.fetch_sub(1, Ordering::SeqCst);
        });
        while pool.next_result().is_some() {}
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn workers_stay_within_window() {
        let started = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&started);
        let mut pool = OrderedPool::spawn(vec![(); 10], 4, 2, PipelineControl::new(), move |_, _| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(started.load(Ordering::SeqCst), 2, "nothing taken yet");
        pool.next_result();
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(started.load(Ordering::SeqCst), 3);
        while pool.next_result().is_some() {}
        assert_eq!(started.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn panicking_task_is_abandoned_not_fatal() {
        let mut pool = OrderedPool::spawn(vec![1, 2, 3], 2, 3, PipelineControl::new(), |_, v| {
            if v == 2 {
                panic!("boom");
            }
            v
        });
        assert_eq!(pool.next_result(), Some(Some(1)));
        assert_eq!(pool.next_result(), Some(None));
        assert_eq!(pool.next_result(), Some(Some(3)));
        assert_eq!(pool.next_result(), None);
    }

    #[test]
    fn shutdown_abandons_queued_items() {
        let started = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&started);
        let mut pool = OrderedPool::spawn(vec![(); 50], 2, 50, PipelineControl::new(), move |_, _| {
            s.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
        });
        std::thread::sleep(Duration::from_millis(30));
        pool.shutdown();
        assert!(started.load(Ordering::SeqCst) < 50);
        assert_eq!(pool.remaining(), 0);
        assert!(pool.next_result().is_none());
    }
}
