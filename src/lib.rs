//! # stagewise
//!
//! Parallel Entity-Component-System runtime built around two cooperating
//! cores:
//!
//! - a **data-parallel stage scheduler** that partitions registered systems
//!   into conflict-free execution stages from their declared component
//!   reads/writes and explicit `after` edges, then shards each system's
//!   matched entities across worker lanes,
//! - a **lock-free MPMC job pool** with a ticket-slot ring, inline-overflow
//!   submission, and caller-assisted waiting.
//!
//! ## Design Goals
//! - Sparse-set storage with contiguous iteration
//! - Deterministic, cached scheduling
//! - Deferred structural mutation during parallel execution
//! - Safe, explicit data access declarations
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use stagewise::prelude::*;
//!
//! #[repr(C)]
//! #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
//! struct Position {
//!     x: i32,
//!     y: i32,
//! }
//!
//! fn advance(_ecs: &Ecs, view: &mut View<'_>, udata: Option<&UserData>) -> SystemResult {
//!     let pos = *udata.unwrap().downcast_ref::<CompId>().unwrap();
//!     for i in 0..view.len() {
//!         let e = view.entities()[i];
//!         if let Some(p) = view.get_mut::<Position>(e, pos) {
//!             p.x += 1;
//!         }
//!     }
//!     Ok(())
//! }
//!
//! let mut ecs = Ecs::new();
//! let pos = ecs.register_component::<Position>();
//! let e = ecs.create();
//! ecs.add(e, pos, Position { x: 0, y: 0 });
//!
//! let sys = ecs.create_system(advance, Some(Arc::new(pos)));
//! ecs.system_mut(sys).require(pos).write(pos);
//!
//! ecs.progress(0).unwrap();
//! assert_eq!(ecs.get::<Position>(e, pos).unwrap().x, 1);
//! ```
//!
//! This crate builds as both:
//! - `rlib` (for Rust usage & integration tests)
//! - `cdylib` (for FFI / DLL usage)

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![deny(dead_code)]

pub mod engine;
pub mod jobs;
pub mod profiling;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::error::{EnqueueError, SystemError, SystemResult, TickError, TickResult};
pub use engine::scheduler::{Schedule, Stage};
pub use engine::systems::{SystemDesc, SystemFn, UserData};
pub use engine::types::{
    Bitset, CompId, ComponentSet, Entity, SysId, SystemSet, CACHE_LINE_BYTES,
    COMMAND_BUFFER_INITIAL_CAPACITY, COMMAND_DATA_INITIAL_CAPACITY, MAX_COMPONENTS, MAX_LANES,
    MAX_SYSTEMS, POOL_DEFAULT_QUEUE_CAPACITY, SCRATCH_INITIAL_CAPACITY,
};
pub use engine::world::{Ecs, SystemHandle, View};
pub use jobs::{Job, JobPool, TaskExecutor, TicketQueue};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used runtime types.
///
/// Import with:
/// ```rust
/// use stagewise::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CompId, Ecs, Entity, Job, JobPool, SysId, SystemResult, TaskExecutor, TickError,
        TickResult, UserData, View,
    };
}
