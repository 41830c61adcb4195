//! Job execution: the MPMC pool and the executor seam.
//!
//! The world does not own a pool directly. It drives whatever implements
//! [`TaskExecutor`], so one pool can back several worlds, or a custom
//! executor can be substituted entirely. [`JobPool`] is the built-in
//! implementation: a lock-free ticket-slot ring serviced by a fixed set of
//! worker threads, with inline-overflow submission and caller-assisted
//! waiting.

pub mod pool;
pub mod queue;

pub use pool::JobPool;
pub use queue::TicketQueue;

use crate::engine::error::EnqueueError;

/// A unit of work handed to an executor. The ring stores it inline.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executor seam between the world and its task backend.
///
/// Contract: `enqueue` must never block; `wait` returns only once every
/// previously enqueued job has finished running (no job may still be
/// executing after `wait` returns — the tick driver relies on this for its
/// stage barrier).
pub trait TaskExecutor: Send + Sync {
    /// Submits a job for asynchronous execution. An error short-circuits
    /// the tick that submitted it.
    fn enqueue(&self, job: Job) -> Result<(), EnqueueError>;

    /// Blocks until all enqueued jobs have completed.
    fn wait(&self);
}
