//! Typed byte storage for component pools.
//!
//! A [`ComponentPool`] pairs a [`SparseSet`] with a contiguous, properly
//! aligned byte buffer: `data[i]` holds the payload of `dense[i]`. Payloads
//! are opaque fixed-size byte blocks; the typed views live at the world
//! layer, bounded by `bytemuck::Pod` so zero-initialisation and byte moves
//! are valid for every registered component type.
//!
//! Invariants:
//! - the data buffer always holds at least `len * elem_size` bytes,
//! - removal swap-copies the last payload into the vacated slot, mirroring
//!   the sparse set's swap-remove,
//! - the buffer only reallocates during structural mutation, which the
//!   world serialises (`&mut self` or the command drain); during a stage the
//!   base pointer is stable and payload slots may be written in place.

use std::alloc::{alloc, dealloc, handle_alloc_error, realloc, Layout};
use std::ptr::NonNull;

use crate::engine::sparse::SparseSet;
use crate::engine::types::Entity;

/// Raw aligned allocation. Grows by doubling; never shrinks.
struct RawBuffer {
    ptr: NonNull<u8>,
    cap_bytes: usize,
    align: usize,
}

unsafe impl Send for RawBuffer {}
unsafe impl Sync for RawBuffer {}

impl RawBuffer {
    fn new(align: usize) -> Self {
        Self {
            ptr: NonNull::dangling(),
            cap_bytes: 0,
            align,
        }
    }

    #[inline]
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn grow_to(&mut self, need_bytes: usize) {
        if need_bytes <= self.cap_bytes {
            return;
        }
        let mut cap = self.cap_bytes.max(64);
        while cap < need_bytes {
            cap *= 2;
        }
        let new_layout = Layout::from_size_align(cap, self.align)
            .expect("component buffer layout overflow");
        let raw = if self.cap_bytes == 0 {
            unsafe { alloc(new_layout) }
        } else {
            let old_layout =
                Layout::from_size_align(self.cap_bytes, self.align).expect("existing layout");
            unsafe { realloc(self.ptr.as_ptr(), old_layout, cap) }
        };
        let Some(ptr) = NonNull::new(raw) else {
            handle_alloc_error(new_layout);
        };
        self.ptr = ptr;
        self.cap_bytes = cap;
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        if self.cap_bytes != 0 {
            let layout =
                Layout::from_size_align(self.cap_bytes, self.align).expect("existing layout");
            unsafe { dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

/// Sparse-set-indexed storage for one component type.
pub struct ComponentPool {
    set: SparseSet,
    data: RawBuffer,
    elem_size: usize,
}

impl ComponentPool {
    /// Creates an empty pool for elements of the given layout.
    pub fn new(layout: Layout) -> Self {
        Self {
            set: SparseSet::new(),
            data: RawBuffer::new(layout.align().max(1)),
            elem_size: layout.size(),
        }
    }

    /// Payload size in bytes.
    #[inline]
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    /// Number of entities holding this component.
    #[inline]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns `true` if no entity holds this component.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Compact array of entities holding this component.
    #[inline]
    pub fn dense(&self) -> &[Entity] {
        self.set.dense()
    }

    /// Constant-time presence test.
    #[inline]
    pub fn has(&self, entity: Entity) -> bool {
        self.set.has(entity)
    }

    #[inline]
    fn slot_ptr(&self, idx: usize) -> NonNull<u8> {
        if self.elem_size == 0 {
            return NonNull::dangling();
        }
        debug_assert!(idx < self.set.len());
        // In bounds: the buffer is grown before any index becomes valid.
        unsafe { NonNull::new_unchecked(self.data.as_ptr().add(idx * self.elem_size)) }
    }

    /// Ensures a slot for `entity` and returns its payload pointer.
    ///
    /// If the entity already holds the component the existing payload is
    /// returned untouched; otherwise a new zero-initialised slot is
    /// appended.
    pub fn add(&mut self, entity: Entity) -> NonNull<u8> {
        if let Some(idx) = self.set.index_of(entity) {
            return self.slot_ptr(idx);
        }
        self.data.grow_to((self.set.len() + 1) * self.elem_size);
        let idx = self
            .set
            .insert(entity)
            .expect("insert after negative membership test");
        let ptr = self.slot_ptr(idx);
        if self.elem_size != 0 {
            unsafe { ptr.as_ptr().write_bytes(0, self.elem_size) };
        }
        ptr
    }

    /// Removes the component from `entity`; returns `false` if absent.
    ///
    /// Swap-with-last in both the dense array and the payload buffer.
    pub fn remove(&mut self, entity: Entity) -> bool {
        let Some(idx) = self.set.index_of(entity) else {
            return false;
        };
        let last = self.set.len() - 1;
        if idx != last && self.elem_size != 0 {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.slot_ptr(last).as_ptr(),
                    self.slot_ptr(idx).as_ptr(),
                    self.elem_size,
                );
            }
        }
        self.set.remove(entity);
        true
    }

    /// Payload pointer for `entity`, if present.
    ///
    /// The pointer stays valid until the next structural mutation of this
    /// pool. During a stage no structural mutation happens, so in-place
    /// payload writes through this pointer are the intended access path;
    /// exclusivity across systems is the stage builder's guarantee.
    #[inline]
    pub fn ptr_of(&self, entity: Entity) -> Option<NonNull<u8>> {
        self.set.index_of(entity).map(|idx| self.slot_ptr(idx))
    }
}
