//! Entity id allocation.
//!
//! Entity ids are dense integers handed out by a lock-free allocator: a
//! monotonic counter for fresh ids and a Treiber-stack free list for
//! recycled ones. Allocation is safe from any thread at any time, including
//! from inside system functions running on worker threads. Recycling an id
//! is an exclusive operation and happens only on the destroy path, which
//! the world exposes through `&mut self` — the borrow checker guarantees no
//! allocation races a recycle.
//!
//! ## Free-list representation
//!
//! The free list is an intrusive stack whose nodes are slots of the
//! `free_next` array, indexed by entity id. `free_head` holds the id of the
//! first free slot, or -1 when the list is empty. Popping CAS-swings the
//! head to `free_next[head]`; pushing (exclusive) links the slot and stores
//! the new head. Because pushes never run concurrently with pops, the pop
//! loop cannot observe an ABA'd head.
//!
//! ## Id lifecycle
//!
//! Ids start at 1 (0 is the [`Entity::NONE`] sentinel) and carry no
//! generation counter. Destroying an id returns it to the free list and the
//! next allocation may hand it back; callers must not retain handles across
//! a destroy.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use crate::engine::types::Entity;

const FREE_LIST_EMPTY: i64 = -1;

/// Lock-free entity id allocator.
pub struct EntityAllocator {
    /// Next fresh id; monotonic.
    next: AtomicU32,
    /// Id of the first free slot, or -1.
    free_head: AtomicI64,
    /// Intrusive successor links, indexed by entity id.
    free_next: Vec<i64>,
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityAllocator {
    /// Creates an allocator with an empty free list; the first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
            free_head: AtomicI64::new(FREE_LIST_EMPTY),
            free_next: Vec::new(),
        }
    }

    /// Allocates an entity id: recycled from the free list first, fresh from
    /// the counter otherwise. Lock-free; callable from any thread.
    pub fn create(&self) -> Entity {
        if let Some(e) = self.free_list_pop() {
            return e;
        }
        Entity::from_raw(self.next.fetch_add(1, Ordering::Relaxed))
    }

    fn free_list_pop(&self) -> Option<Entity> {
        let mut head = self.free_head.load(Ordering::Acquire);
        loop {
            if head == FREE_LIST_EMPTY {
                return None;
            }
            let next = self.free_next[head as usize];
            match self.free_head.compare_exchange_weak(
                head,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(Entity::from_raw(head as u32)),
                Err(observed) => head = observed,
            }
        }
    }

    /// Returns `entity` to the free list.
    ///
    /// Exclusive: the `&mut` receiver rules out concurrent allocation, so
    /// the push needs no CAS loop. Recycling an id that is still live, or
    /// twice, corrupts the free list; that invariant is the caller's.
    pub fn recycle(&mut self, entity: Entity) {
        debug_assert!(!entity.is_none());
        let e = entity.index();
        if e >= self.free_next.len() {
            let mut cap = self.free_next.len().max(1024);
            while cap <= e {
                cap *= 2;
            }
            self.free_next.resize(cap, FREE_LIST_EMPTY);
        }
        self.free_next[e] = self.free_head.load(Ordering::Relaxed);
        self.free_head.store(e as i64, Ordering::Release);
    }

    /// Highest id handed out so far plus one; an upper bound on live ids.
    #[inline]
    pub fn id_bound(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}
