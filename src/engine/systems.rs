//! System records.
//!
//! A system is a plain function plus a declaration of what it touches:
//! which components an entity must have ([`SystemDesc::all_of`]) or must
//! not have (`none_of`) to be matched, which components the function reads
//! and writes (the scheduler's conflict inputs), explicit `after` ordering
//! edges, a group tag, and an enabled flag.
//!
//! Systems are stored in registration order and never removed. Their
//! declarations are mutated through the world's [`SystemHandle`], which
//! marks the cached schedule dirty on every change.
//!
//! [`SystemHandle`]: crate::engine::world::SystemHandle

use std::any::Any;
use std::sync::Arc;

use crate::engine::error::SystemResult;
use crate::engine::types::{ComponentSet, SystemSet};
use crate::engine::world::{Ecs, View};

/// Opaque user data attached to a system, passed back on every invocation.
pub type UserData = dyn Any + Send + Sync;

/// System entry point.
///
/// Receives the world, the mutable view over this task's matched entities,
/// and the system's user data. A non-zero-status error aborts the current
/// tick after the final command drain.
pub type SystemFn = fn(&Ecs, &mut View<'_>, Option<&UserData>) -> SystemResult;

/// Registered system record: entry point, predicates, access sets, edges.
pub struct SystemDesc {
    pub(crate) func: SystemFn,
    pub(crate) udata: Option<Arc<UserData>>,
    /// Components an entity must have to be matched. `require` also marks
    /// the component read.
    pub(crate) all_of: ComponentSet,
    /// Components an entity must not have to be matched.
    pub(crate) none_of: ComponentSet,
    pub(crate) read: ComponentSet,
    pub(crate) write: ComponentSet,
    /// Derived: `read | write`.
    pub(crate) rw: ComponentSet,
    /// Systems that must be staged strictly before this one.
    pub(crate) after: SystemSet,
    pub(crate) group: u32,
    pub(crate) enabled: bool,
}

impl SystemDesc {
    pub(crate) fn new(func: SystemFn, udata: Option<Arc<UserData>>) -> Self {
        Self {
            func,
            udata,
            all_of: ComponentSet::zeroed(),
            none_of: ComponentSet::zeroed(),
            read: ComponentSet::zeroed(),
            write: ComponentSet::zeroed(),
            rw: ComponentSet::zeroed(),
            after: SystemSet::zeroed(),
            group: 0,
            enabled: true,
        }
    }

    /// Access conflict predicate: either side writes what the other touches.
    ///
    /// Read/read overlap does not conflict.
    #[inline]
    pub fn conflicts_with(&self, other: &SystemDesc) -> bool {
        self.write.intersects(&other.rw) || other.write.intersects(&self.rw)
    }

    /// Group tag.
    #[inline]
    pub fn group(&self) -> u32 {
        self.group
    }

    /// Whether the system participates at dispatch time.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Attached user data, if any.
    #[inline]
    pub fn udata(&self) -> Option<&UserData> {
        self.udata.as_deref()
    }

    /// Required-component set.
    #[inline]
    pub fn all_of(&self) -> &ComponentSet {
        &self.all_of
    }

    /// Excluded-component set.
    #[inline]
    pub fn none_of(&self) -> &ComponentSet {
        &self.none_of
    }
}
