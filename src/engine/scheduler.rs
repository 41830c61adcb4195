//! Stage construction.
//!
//! This module partitions registered systems into **stages**: totally
//! ordered groups whose members are safe to run concurrently. Two systems
//! may share a stage only if their declared access sets do not conflict;
//! explicit `after` edges additionally force a system into a strictly later
//! stage than its dependencies.
//!
//! ## Scheduling model
//!
//! The builder derives a DAG over the systems:
//!
//! * for every pair `(i, j)` with `i < j` in registration order, an edge
//!   `i -> j` if their access sets conflict (the tie is broken toward
//!   registration order, which makes the result deterministic),
//! * an edge `dep -> j` for every explicit `after(j, dep)` declaration.
//!
//! Each system's stage is then its longest-path depth in that DAG:
//! `stage(j) = max(stage(p)) + 1` over all predecessors, or 0 with none.
//! Conflict-derived edges alone cannot form a cycle (they all point from
//! lower to higher registration index); a cycle can only be closed by an
//! `after` edge demanding the opposite of an order a conflict already
//! forces. That is a caller contract violation and the rebuild panics.
//!
//! The result is cached and reused until a registry mutation marks it
//! dirty. Disabled systems keep their stage assignment; the enabled flag
//! gates dispatch, not scheduling, so toggling a system does not reshape
//! the plan around it.
//!
//! Stage execution and the structural synchronisation between stages live
//! in the progress driver ([`crate::engine::world`]).

use smallvec::SmallVec;

use crate::engine::systems::SystemDesc;
use crate::engine::types::{SysId, SystemSet};

/// One execution stage: systems listed in registration order.
#[derive(Clone, Debug, Default)]
pub struct Stage {
    systems: SmallVec<[SysId; 8]>,
}

impl Stage {
    /// Systems assigned to this stage, in registration order.
    #[inline]
    pub fn systems(&self) -> &[SysId] {
        &self.systems
    }
}

/// Cached conflict-aware partition of the system registry into stages.
pub struct Schedule {
    stages: Vec<Stage>,
    dirty: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    /// Creates an empty, dirty schedule.
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            dirty: true,
        }
    }

    /// Marks the cached plan stale; the next rebuild recomputes it.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns `true` if the cached plan is stale.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The cached stages, oldest first.
    #[inline]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Recomputes the stage assignment if dirty.
    ///
    /// Deterministic: a pure function of the system records in registration
    /// order. Independent of lane count, worker count, and timing.
    ///
    /// # Panics
    ///
    /// Panics if explicit `after` edges close a cycle against the
    /// conflict-derived order.
    pub fn rebuild(&mut self, systems: &[SystemDesc]) {
        if !self.dirty {
            return;
        }

        let n = systems.len();
        let mut preds = vec![SystemSet::zeroed(); n];
        let mut succs = vec![SystemSet::zeroed(); n];

        for j in 0..n {
            for i in 0..j {
                if systems[i].conflicts_with(&systems[j]) {
                    preds[j].set(i);
                    succs[i].set(j);
                }
            }
            for dep in systems[j].after.ones() {
                debug_assert!(dep < n, "after edge references an unregistered system");
                if dep != j {
                    preds[j].set(dep);
                    succs[dep].set(j);
                }
            }
        }

        // Longest-path leveling over the DAG (Kahn with repeated forward
        // sweeps; n is small and bounded by MAX_SYSTEMS).
        let mut indegree: Vec<u32> = preds.iter().map(|p| p.count()).collect();
        let mut level = vec![0usize; n];
        let mut placed = vec![false; n];
        let mut placed_count = 0usize;

        loop {
            let mut progressed = false;
            for j in 0..n {
                if placed[j] || indegree[j] != 0 {
                    continue;
                }
                let depth = preds[j]
                    .ones()
                    .map(|p| level[p] + 1)
                    .max()
                    .unwrap_or(0);
                level[j] = depth;
                placed[j] = true;
                placed_count += 1;
                progressed = true;
                for s in succs[j].ones() {
                    indegree[s] -= 1;
                }
            }
            if !progressed {
                break;
            }
        }

        assert!(
            placed_count == n,
            "cyclic system order constraint: an `after` edge contradicts the \
             conflict-derived stage order"
        );

        let stage_count = level.iter().map(|&l| l + 1).max().unwrap_or(0);
        let mut stages = vec![Stage::default(); stage_count];
        for (j, &l) in level.iter().enumerate() {
            stages[l].systems.push(SysId(j as u16));
        }

        self.stages = stages;
        self.dirty = false;
    }
}
