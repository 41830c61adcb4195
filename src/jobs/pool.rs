//! Worker-thread pool over the ticket queue.
//!
//! A fixed set of workers drains the ring. Two counters coordinate
//! everything:
//!
//! * `enqueued` — jobs currently sitting in the ring; the wake condition
//!   for parked workers (`cv_work`).
//! * `in_flight` — jobs submitted but not yet finished, including those
//!   executing right now; the barrier condition for waiters (`cv_done`).
//!
//! [`JobPool::submit`] never blocks: when the ring is full the job runs
//! inline on the submitting thread, which degrades gracefully under
//! backpressure instead of stalling the producer. [`JobPool::wait`] is an
//! **assisted wait**: while work remains in the ring the waiter pops and
//! runs jobs itself, so a barrier always makes progress even when every
//! worker is busy.
//!
//! Submit wakes at most one worker, and only while fewer jobs are queued
//! than there are workers; a burst of submissions does not stampede the
//! whole pool.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::engine::error::EnqueueError;
use crate::jobs::queue::TicketQueue;
use crate::jobs::{Job, TaskExecutor};

struct Inner {
    queue: TicketQueue<Job>,
    /// Jobs currently in the ring.
    enqueued: AtomicUsize,
    /// Jobs submitted and not yet completed (queued + running).
    in_flight: AtomicUsize,
    stop: AtomicBool,
    gate: Mutex<()>,
    /// Parked workers wait here for `enqueued > 0 || stop`.
    cv_work: Condvar,
    /// Waiters block here for `in_flight == 0 || enqueued > 0`.
    cv_done: Condvar,
    nthreads: usize,
}

impl Inner {
    fn job_done(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _gate = self.gate.lock();
            self.cv_done.notify_all();
        }
    }

    fn run_one(&self, job: Job) {
        job();
        self.job_done();
    }

    fn submit(&self, job: Job) {
        if self.stop.load(Ordering::Acquire) {
            return;
        }

        // Reserve the completion slot before publishing the job so a
        // concurrent wait cannot observe zero spuriously.
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        match self.queue.try_push(job) {
            Ok(()) => {
                let prev = self.enqueued.fetch_add(1, Ordering::Release);
                if prev < self.nthreads {
                    let _gate = self.gate.lock();
                    self.cv_work.notify_one();
                }
            }
            // Ring full: run inline on the caller.
            Err(job) => self.run_one(job),
        }
    }

    fn wait(&self) {
        loop {
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }

            if self.enqueued.load(Ordering::Acquire) != 0 {
                if let Some(job) = self.queue.try_pop() {
                    self.enqueued.fetch_sub(1, Ordering::AcqRel);
                    self.run_one(job);
                    continue;
                }
                std::hint::spin_loop();
            }

            let mut gate = self.gate.lock();
            while self.in_flight.load(Ordering::Acquire) != 0
                && self.enqueued.load(Ordering::Acquire) == 0
            {
                self.cv_done.wait(&mut gate);
            }
        }
    }

    fn worker_loop(&self) {
        loop {
            if self.enqueued.load(Ordering::Acquire) != 0 {
                if let Some(job) = self.queue.try_pop() {
                    self.enqueued.fetch_sub(1, Ordering::AcqRel);
                    self.run_one(job);
                    continue;
                }
                std::hint::spin_loop();
            }

            if self.stop.load(Ordering::Acquire)
                && self.in_flight.load(Ordering::Acquire) == 0
            {
                return;
            }

            let mut gate = self.gate.lock();
            while !self.stop.load(Ordering::Relaxed)
                && self.enqueued.load(Ordering::Relaxed) == 0
            {
                self.cv_work.wait(&mut gate);
            }
        }
    }
}

/// Fixed-capacity lock-free job pool with inline-overflow submission and
/// caller-assisted waiting.
pub struct JobPool {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

impl JobPool {
    /// Spawns `threads` workers (zero is clamped to one) over a ring of
    /// `capacity` slots (zero selects the default capacity).
    pub fn new(threads: usize, capacity: usize) -> Self {
        let threads = threads.max(1);
        let inner = Arc::new(Inner {
            queue: TicketQueue::new(capacity),
            enqueued: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            gate: Mutex::new(()),
            cv_work: Condvar::new(),
            cv_done: Condvar::new(),
            nthreads: threads,
        });

        let workers = (0..threads)
            .map(|i| {
                let inner = Arc::clone(&inner);
                std::thread::Builder::new()
                    .name(format!("stagewise-worker-{i}"))
                    .spawn(move || inner.worker_loop())
                    .expect("failed to spawn pool worker")
            })
            .collect();

        Self { inner, workers }
    }

    /// Number of worker threads.
    #[inline]
    pub fn threads(&self) -> usize {
        self.inner.nthreads
    }

    /// Submits a job. Never blocks: if the ring is full the job executes
    /// inline on the calling thread. Silently dropped after shutdown has
    /// begun.
    pub fn submit(&self, job: Job) {
        self.inner.submit(job);
    }

    /// Blocks until no submitted job remains unfinished, helping to drain
    /// the ring while waiting.
    pub fn wait(&self) {
        self.inner.wait();
    }
}

impl Drop for JobPool {
    /// Drains outstanding work, signals shutdown, and joins every worker.
    fn drop(&mut self) {
        self.inner.wait();
        self.inner.stop.store(true, Ordering::Release);
        {
            let _gate = self.inner.gate.lock();
            self.inner.cv_work.notify_all();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl TaskExecutor for JobPool {
    fn enqueue(&self, job: Job) -> Result<(), EnqueueError> {
        self.submit(job);
        Ok(())
    }

    fn wait(&self) {
        JobPool::wait(self);
    }
}
