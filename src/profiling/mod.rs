//! Chrome Trace (flame-style) execution profiler.
//!
//! Feature-gated, zero-overhead when disabled. When the `profiling`
//! feature is enabled, RAII span guards record tick, stage, and sync
//! timings and `shutdown` emits a Chrome Trace Event JSON file viewable in
//! `chrome://tracing` or <https://ui.perfetto.dev>.
//!
//! ```no_run
//! use stagewise::profiling::profiler;
//!
//! profiler::init("profile/trace.json");
//! {
//!     let _g = profiler::span("Ecs::progress");
//!     // tick...
//! }
//! profiler::shutdown();
//! ```

pub mod profiler;
