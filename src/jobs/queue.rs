//! Lock-free ticket-slot MPMC ring.
//!
//! Each slot carries a `turn` counter that sequences producer and consumer
//! phases: a slot is writable when its turn equals `(head / capacity) * 2`
//! (even phase) and readable when it equals `(tail / capacity) * 2 + 1`
//! (odd phase). `head` and `tail` are monotonic 64-bit tickets; a
//! successful claim CAS-advances the ticket, moves the value, then bumps
//! the slot turn with a release store, which is the happens-before edge
//! between producer and consumer.
//!
//! Neither operation blocks: `try_push` reports full and `try_pop` reports
//! empty when the examined slot is not in the expected phase and the
//! ticket has not moved in the meantime.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::types::{CACHE_LINE_BYTES, POOL_DEFAULT_QUEUE_CAPACITY};

const _: [(); 1] = [(); (CACHE_LINE_BYTES == 64) as usize];

/// Pads a hot atomic out to its own cache line.
#[repr(align(64))]
struct CacheAligned<T>(T);

#[repr(align(64))]
struct Slot<T> {
    /// Phase counter; even = writable, odd = readable. Never decreases.
    turn: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Fixed-capacity multi-producer multi-consumer ring.
pub struct TicketQueue<T> {
    head: CacheAligned<AtomicU64>,
    tail: CacheAligned<AtomicU64>,
    slots: Box<[Slot<T>]>,
}

unsafe impl<T: Send> Send for TicketQueue<T> {}
unsafe impl<T: Send> Sync for TicketQueue<T> {}

impl<T> TicketQueue<T> {
    /// Creates a ring with the given capacity; zero selects
    /// [`POOL_DEFAULT_QUEUE_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            POOL_DEFAULT_QUEUE_CAPACITY
        } else {
            capacity
        };
        let slots = (0..capacity)
            .map(|_| Slot {
                turn: AtomicU64::new(0),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            head: CacheAligned(AtomicU64::new(0)),
            tail: CacheAligned(AtomicU64::new(0)),
            slots,
        }
    }

    /// Ring capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Attempts to enqueue; hands the value back when the ring appears
    /// full. Never blocks.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let cap = self.slots.len() as u64;
        let mut head = self.head.0.load(Ordering::Acquire);
        loop {
            let slot = &self.slots[(head % cap) as usize];
            let want = (head / cap) * 2;
            if slot.turn.load(Ordering::Acquire) == want {
                match self.head.0.compare_exchange(
                    head,
                    head + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        unsafe { (*slot.value.get()).write(value) };
                        slot.turn.store(want + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(observed) => {
                        head = observed;
                        std::hint::spin_loop();
                    }
                }
            } else {
                let prev = head;
                head = self.head.0.load(Ordering::Acquire);
                if head == prev {
                    return Err(value);
                }
                std::hint::spin_loop();
            }
        }
    }

    /// Attempts to dequeue; `None` when the ring appears empty. Never
    /// blocks.
    pub fn try_pop(&self) -> Option<T> {
        let cap = self.slots.len() as u64;
        let mut tail = self.tail.0.load(Ordering::Acquire);
        loop {
            let slot = &self.slots[(tail % cap) as usize];
            let want = (tail / cap) * 2 + 1;
            if slot.turn.load(Ordering::Acquire) == want {
                match self.tail.0.compare_exchange(
                    tail,
                    tail + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.turn.store(want + 1, Ordering::Release);
                        return Some(value);
                    }
                    Err(observed) => {
                        tail = observed;
                        std::hint::spin_loop();
                    }
                }
            } else {
                let prev = tail;
                tail = self.tail.0.load(Ordering::Acquire);
                if tail == prev {
                    return None;
                }
                std::hint::spin_loop();
            }
        }
    }
}

impl<T> Drop for TicketQueue<T> {
    fn drop(&mut self) {
        // Release any values still in flight in the ring.
        while self.try_pop().is_some() {}
    }
}
