//! Error types for tick execution.
//!
//! The runtime distinguishes two kinds of failure:
//!
//! * **Programmer errors** — out-of-range ids, exceeding [`MAX_COMPONENTS`]
//!   or [`MAX_SYSTEMS`], or a cyclic `after` constraint. These are contract
//!   violations and panic via `assert!`; they are never surfaced as
//!   recoverable results.
//! * **Runtime failures** — a system function reporting a non-zero status,
//!   or the task executor refusing an enqueue. These short-circuit the
//!   current tick and are returned as [`TickError`], after the final
//!   command drain has run so no structural change is left half-applied.
//!
//! All errors implement [`std::error::Error`] and [`fmt::Display`], with
//! `From` conversions into [`TickError`] so `?` composes at the driver
//! level.
//!
//! [`MAX_COMPONENTS`]: crate::engine::types::MAX_COMPONENTS
//! [`MAX_SYSTEMS`]: crate::engine::types::MAX_SYSTEMS

use std::fmt;

use crate::engine::types::SysId;

/// Failure reported by a system function.
///
/// Carries the raw status code the system returned. A status of zero is
/// success and is never wrapped in a `SystemError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemError {
    /// Non-zero status reported by the system.
    pub code: i32,
}

impl SystemError {
    /// Wraps a non-zero status code.
    #[inline]
    pub fn status(code: i32) -> Self {
        debug_assert!(code != 0);
        Self { code }
    }
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system reported status {}", self.code)
    }
}

impl std::error::Error for SystemError {}

/// Failure reported by a task executor's enqueue operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueError {
    /// Executor-defined status code.
    pub code: i32,
}

impl fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task enqueue failed with status {}", self.code)
    }
}

impl std::error::Error for EnqueueError {}

/// First failure observed during a `progress` or `run_system` call.
///
/// When a tick fails, the stages that had not yet dispatched are skipped,
/// but the final command drain still runs; the world is structurally
/// consistent when this error is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickError {
    /// A system function returned a non-zero status.
    System {
        /// The failing system.
        system: SysId,
        /// The status it reported.
        source: SystemError,
    },
    /// The task executor rejected a job submission.
    Enqueue(EnqueueError),
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickError::System { system, source } => {
                write!(f, "system {} failed: {}", system.index(), source)
            }
            TickError::Enqueue(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TickError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TickError::System { source, .. } => Some(source),
            TickError::Enqueue(e) => Some(e),
        }
    }
}

impl From<EnqueueError> for TickError {
    fn from(e: EnqueueError) -> Self {
        TickError::Enqueue(e)
    }
}

/// Result of a system function invocation.
pub type SystemResult = Result<(), SystemError>;

/// Result of a tick-level operation.
pub type TickResult = Result<(), TickError>;
