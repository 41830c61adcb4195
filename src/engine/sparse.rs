//! Sparse set: O(1) membership with contiguous iteration.
//!
//! The classic dense/sparse index pair. `sparse` maps an entity id to its
//! position in `dense` (stored as index + 1 so that zero means absent), and
//! `dense` is a compact array of the present entities, iterable without
//! holes. Removal swaps the last dense element into the vacated slot, so
//! both arrays stay contiguous.
//!
//! ## Invariants
//! - `dense.len()` is the number of present entities.
//! - For every present entity `e`: `dense[sparse[e] - 1] == e`.
//! - Indices at or beyond `sparse.len()` report absent.

use crate::engine::types::Entity;

/// Dense/sparse index pair over entity ids.
#[derive(Default)]
pub struct SparseSet {
    /// Entity index -> dense index + 1; zero means absent.
    sparse: Vec<usize>,
    /// Compact array of present entities.
    dense: Vec<Entity>,
}

impl SparseSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of present entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if no entity is present.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// The compact array of present entities.
    #[inline]
    pub fn dense(&self) -> &[Entity] {
        &self.dense
    }

    /// Constant-time membership test.
    #[inline]
    pub fn has(&self, entity: Entity) -> bool {
        let e = entity.index();
        e < self.sparse.len() && self.sparse[e] != 0
    }

    /// Dense index of `entity`, if present.
    #[inline]
    pub fn index_of(&self, entity: Entity) -> Option<usize> {
        let e = entity.index();
        if e < self.sparse.len() {
            self.sparse[e].checked_sub(1)
        } else {
            None
        }
    }

    fn reserve_sparse(&mut self, need: usize) {
        if need <= self.sparse.len() {
            return;
        }
        let mut cap = self.sparse.len().max(1);
        while cap < need {
            cap <<= 1;
        }
        self.sparse.resize(cap, 0);
    }

    /// Inserts `entity`, returning its new dense index, or `None` if it was
    /// already present.
    pub fn insert(&mut self, entity: Entity) -> Option<usize> {
        self.reserve_sparse(entity.index() + 1);
        if self.sparse[entity.index()] != 0 {
            return None;
        }
        let idx = self.dense.len();
        self.dense.push(entity);
        self.sparse[entity.index()] = idx + 1;
        Some(idx)
    }

    /// Removes `entity`, returning the dense index it occupied.
    ///
    /// The last dense element is swapped into the vacated slot; the caller
    /// is responsible for mirroring that swap in any parallel payload array.
    pub fn remove(&mut self, entity: Entity) -> Option<usize> {
        let idx = self.index_of(entity)?;
        let last = self.dense.len() - 1;
        self.dense.swap_remove(idx);
        self.sparse[entity.index()] = 0;
        if idx != last {
            let moved = self.dense[idx];
            self.sparse[moved.index()] = idx + 1;
        }
        Some(idx)
    }
}
