// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Fixed-size worker pool with a FIFO queue and a drain barrier.
//!
//! One mutex guards the queue and the pending/running/stop bookkeeping; two
//! condvars signal "work available" (to workers) and "drained" (to callers
//! blocked in [`ThreadPool::drain`]). Jobs are dequeued in submission order;
//! completion order across workers is whatever the scheduler makes of it.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::warn;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("thread pool is stopping")]
pub struct PoolStopping;

struct State {
    queue: VecDeque<Job>,
    pending: usize,
    running: usize,
    stop: bool,
}

struct Shared {
    state: Mutex<State>,
    has_work: Condvar,
    drained: Condvar,
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn `threads` workers; 0 is treated as 1.
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                pending: 0,
                running: 0,
                stop: false,
            }),
            has_work: Condvar::new(),
            drained: Condvar::new(),
        });
        let workers = (0..threads)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || worker_main(&shared))
            })
            .collect();
        Self { shared, workers }
    }

    /// Enqueue a job. O(1); fails only once shutdown has begun.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), PoolStopping> {
        let mut state = self.shared.state.lock().unwrap();
        if state.stop {
            return Err(PoolStopping);
        }
        state.queue.push_back(Box::new(job));
        state.pending += 1;
        drop(state);
        self.shared.has_work.notify_one();
        Ok(())
    }

    /// Block until every previously submitted job has completed.
    pub fn drain(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while state.pending != 0 || state.running != 0 {
            state = self.shared.drained.wait(state).unwrap();
        }
    }

    pub fn pending(&self) -> usize {
        self.shared.state.lock().unwrap().pending
    }

    pub fn running(&self) -> usize {
        self.shared.state.lock().unwrap().running
    }
}

impl Drop for ThreadPool {
    /// Stop flag, wake everyone, join, discard whatever never ran.
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.stop = true;
        }
        self.shared.has_work.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        let mut state = self.shared.state.lock().unwrap();
        state.queue.clear();
        state.pending = 0;
    }
}

fn worker_main(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if state.stop {
                    return;
                }
                if let Some(job) = state.queue.pop_front() {
                    state.pending -= 1;
                    state.running += 1;
                    break job;
                }
                state = shared.has_work.wait(state).unwrap();
            }
        };

        // A panicking job must not leave `running` stuck — drain would
        // never return.
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("tool job panicked");
        }

        let mut state = shared.state.lock().unwrap();
        state.running -= 1;
        if state.pending == 0 && state.running == 0 {
            shared.drained.notify_all();
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn every_job_runs_exactly_once() {
        let pool = ThreadPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.drain();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.running(), 0);
    }

    #[test]
    fn drain_on_empty_pool_returns_immediately() {
        let pool = ThreadPool::new(2);
        pool.drain();
    }

    #[test]
    fn single_worker_preserves_submission_order() {
        let pool = ThreadPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..20 {
            let order = order.clone();
            pool.submit(move || order.lock().unwrap().push(i)).unwrap();
        }
        pool.drain();
        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn drain_waits_for_slow_jobs() {
        let pool = ThreadPool::new(2);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let done = done.clone();
            pool.submit(move || {
                std::thread::sleep(Duration::from_millis(30));
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.drain();
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn panicking_job_does_not_wedge_drain() {
        let pool = ThreadPool::new(2);
        let done = Arc::new(AtomicUsize::new(0));
        pool.submit(|| panic!("boom")).unwrap();
        for _ in 0..3 {
            let done = done.clone();
            pool.submit(move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.drain();
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(pool.running(), 0);
    }

    #[test]
    fn zero_threads_becomes_one() {
        let pool = ThreadPool::new(0);
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        pool.submit(move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.drain();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_joins_without_running_queued_jobs_after_stop() {
        // Jobs already dequeued finish; drop never deadlocks.
        let pool = ThreadPool::new(1);
        let started = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let started = started.clone();
            pool.submit(move || {
                started.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
            })
            .unwrap();
        }
        drop(pool);
        // No assertion on the count: drop may cut queued-but-unstarted work.
        // Reaching this line at all means the join completed.
    }

    #[test]
    fn parallel_execution_uses_multiple_workers() {
        let pool = ThreadPool::new(4);
        let peak = Arc::new(AtomicUsize::new(0));
        let live = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let peak = peak.clone();
            let live = live.clone();
            pool.submit(move || {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(40));
                live.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.drain();
        assert!(peak.load(Ordering::SeqCst) > 1, "jobs never overlapped");
    }
}
