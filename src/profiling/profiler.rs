//! Span recording and Chrome Trace JSON output.
//!
//! All entry points compile to no-ops unless the `profiling` feature is
//! enabled: no allocation, no atomics, no branches.

#[cfg(feature = "profiling")]
mod enabled {
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Mutex, OnceLock};
    use std::time::Instant;

    struct Event {
        name: &'static str,
        ts_us: u64,
        dur_us: u64,
        tid: u64,
    }

    struct State {
        path: PathBuf,
        epoch: Instant,
        events: Mutex<Vec<Event>>,
    }

    static STATE: OnceLock<State> = OnceLock::new();
    static NEXT_TID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
    }

    /// Installs the trace writer; events record relative to this call.
    pub fn init(path: &str) {
        let _ = STATE.set(State {
            path: PathBuf::from(path),
            epoch: Instant::now(),
            events: Mutex::new(Vec::new()),
        });
    }

    /// RAII guard; records a complete event when dropped.
    pub struct SpanGuard {
        name: &'static str,
        start_us: u64,
    }

    /// Opens a named span on the current thread.
    pub fn span(name: &'static str) -> SpanGuard {
        let start_us = STATE
            .get()
            .map(|s| s.epoch.elapsed().as_micros() as u64)
            .unwrap_or(0);
        SpanGuard { name, start_us }
    }

    impl Drop for SpanGuard {
        fn drop(&mut self) {
            let Some(state) = STATE.get() else { return };
            let now = state.epoch.elapsed().as_micros() as u64;
            let tid = TID.with(|t| *t);
            if let Ok(mut events) = state.events.lock() {
                events.push(Event {
                    name: self.name,
                    ts_us: self.start_us,
                    dur_us: now.saturating_sub(self.start_us),
                    tid,
                });
            }
        }
    }

    /// Flushes recorded events to the trace file.
    pub fn shutdown() {
        let Some(state) = STATE.get() else { return };
        let events = match state.events.lock() {
            Ok(mut e) => std::mem::take(&mut *e),
            Err(_) => return,
        };
        if let Some(parent) = state.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let Ok(file) = File::create(&state.path) else { return };
        let mut out = BufWriter::new(file);
        let _ = write!(out, "[");
        for (i, e) in events.iter().enumerate() {
            let sep = if i == 0 { "" } else { "," };
            let _ = write!(
                out,
                "{sep}\n{{\"name\":\"{}\",\"ph\":\"X\",\"ts\":{},\"dur\":{},\"pid\":0,\"tid\":{}}}",
                e.name, e.ts_us, e.dur_us, e.tid
            );
        }
        let _ = writeln!(out, "\n]");
        let _ = out.flush();
    }
}

#[cfg(feature = "profiling")]
pub use enabled::{init, shutdown, span, SpanGuard};

#[cfg(not(feature = "profiling"))]
mod disabled {
    /// No-op span guard.
    pub struct SpanGuard;

    /// No-op when the `profiling` feature is disabled.
    #[inline(always)]
    pub fn init(_path: &str) {}

    /// No-op when the `profiling` feature is disabled.
    #[inline(always)]
    pub fn span(_name: &'static str) -> SpanGuard {
        SpanGuard
    }

    /// No-op when the `profiling` feature is disabled.
    #[inline(always)]
    pub fn shutdown() {}
}

#[cfg(not(feature = "profiling"))]
pub use disabled::{init, shutdown, span, SpanGuard};
