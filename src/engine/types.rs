//! Core identifiers, compile-time tunables, and bit-level set types.
//!
//! This module defines the numeric identifiers and packed bitsets shared by
//! every subsystem: entity handles, component and system ids, and the
//! fixed-width sets used for entity matching, access declaration, and
//! explicit ordering edges.
//!
//! ## Identifier model
//!
//! - [`Entity`] is an opaque dense integer, 1-based. The zero value is the
//!   reserved [`Entity::NONE`] sentinel and is never allocated. Entity ids
//!   carry no generation counter: ids are recycled on destroy, and holding a
//!   handle across a destroy is a caller contract violation.
//! - [`CompId`] and [`SysId`] are compact indices assigned in registration
//!   order, bounded by [`MAX_COMPONENTS`] and [`MAX_SYSTEMS`].
//!
//! ## Set representation
//!
//! [`Bitset`] is a word-packed fixed-width bit vector parameterised over its
//! word count. [`ComponentSet`] instances describe which components a system
//! requires, excludes, reads, or writes; [`SystemSet`] instances carry
//! explicit `after` ordering edges between systems. All operations are
//! word-at-a-time, and [`Bitset::ones`] yields set bits in strictly
//! ascending order, which the matching driver selection relies on.

/// Maximum number of registered component types (bitset width).
pub const MAX_COMPONENTS: usize = 256;

/// Maximum number of registered systems (width of the `after` edge set).
pub const MAX_SYSTEMS: usize = 256;

/// Upper clamp on the configured lane count.
pub const MAX_LANES: usize = 1024;

/// Initial command slots in each lane's command buffer.
pub const COMMAND_BUFFER_INITIAL_CAPACITY: usize = 1024;

/// Initial payload arena size, in bytes, of each lane's command buffer.
pub const COMMAND_DATA_INITIAL_CAPACITY: usize = 64 * 1024;

/// Initial matched-entity scratch capacity, in entities, of each lane.
pub const SCRATCH_INITIAL_CAPACITY: usize = 4096;

/// Ring capacity used by the job pool when a capacity of zero is requested.
pub const POOL_DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Alignment applied to hot atomics (queue counters, ticket slots).
pub const CACHE_LINE_BYTES: usize = 64;

const _: [(); 1] = [(); (MAX_COMPONENTS <= (u8::MAX as usize) + 1) as usize];
const _: [(); 1] = [(); (MAX_SYSTEMS <= (u16::MAX as usize) + 1) as usize];
const _: [(); 1] = [(); (MAX_LANES >= 1) as usize];

/// Number of `u64` words needed to hold `bits` bits.
pub(crate) const fn words_for(bits: usize) -> usize {
    (bits + 63) / 64
}

/// Word count of a [`ComponentSet`].
pub const COMPONENT_WORDS: usize = words_for(MAX_COMPONENTS);

/// Word count of a [`SystemSet`].
pub const SYSTEM_WORDS: usize = words_for(MAX_SYSTEMS);

/// Opaque handle to an entity.
///
/// Dense integer, starting at 1. Cheap to copy, compare, and hash, and safe
/// to pass across threads. A handle stays meaningful until the entity is
/// destroyed; after that the id may be recycled for a new entity, and using
/// the stale handle addresses whatever lives there now.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Entity(u32);

impl Entity {
    /// The reserved "no entity" sentinel. Never returned by allocation.
    pub const NONE: Entity = Entity(0);

    /// Reconstructs a handle from a raw id previously obtained via [`Entity::id`].
    #[inline]
    pub const fn from_raw(id: u32) -> Self {
        Entity(id)
    }

    /// Raw integer id.
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Returns `true` for the [`Entity::NONE`] sentinel.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Compact identifier of a registered component type.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CompId(pub(crate) u8);

impl CompId {
    /// Index in registration order.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Compact identifier of a registered system.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SysId(pub(crate) u16);

impl SysId {
    /// Index in registration order.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Fixed-width, word-packed bit vector.
///
/// `WORDS` is the number of backing `u64` words; the set holds
/// `WORDS * 64` bits. All operations are branch-light word loops.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Bitset<const WORDS: usize> {
    words: [u64; WORDS],
}

impl<const WORDS: usize> Default for Bitset<WORDS> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<const WORDS: usize> Bitset<WORDS> {
    /// The empty set.
    #[inline]
    pub const fn zeroed() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Sets `bit`.
    #[inline]
    pub fn set(&mut self, bit: usize) {
        debug_assert!(bit < WORDS * 64);
        self.words[bit >> 6] |= 1u64 << (bit & 63);
    }

    /// Clears `bit`.
    #[inline]
    pub fn clear(&mut self, bit: usize) {
        debug_assert!(bit < WORDS * 64);
        self.words[bit >> 6] &= !(1u64 << (bit & 63));
    }

    /// Returns `true` if `bit` is set.
    #[inline]
    pub fn test(&self, bit: usize) -> bool {
        debug_assert!(bit < WORDS * 64);
        (self.words[bit >> 6] >> (bit & 63)) & 1 == 1
    }

    /// Clears every bit.
    #[inline]
    pub fn clear_all(&mut self) {
        self.words = [0; WORDS];
    }

    /// Returns `true` if any bit is set.
    #[inline]
    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn none(&self) -> bool {
        !self.any()
    }

    /// In-place union: `self |= other`.
    #[inline]
    pub fn union_with(&mut self, other: &Self) {
        for (d, s) in self.words.iter_mut().zip(other.words.iter()) {
            *d |= *s;
        }
    }

    /// In-place intersection: `self &= other`.
    #[inline]
    pub fn intersect_with(&mut self, other: &Self) {
        for (d, s) in self.words.iter_mut().zip(other.words.iter()) {
            *d &= *s;
        }
    }

    /// In-place difference: `self &= !other`.
    #[inline]
    pub fn subtract(&mut self, other: &Self) {
        for (d, s) in self.words.iter_mut().zip(other.words.iter()) {
            *d &= !*s;
        }
    }

    /// Returns `true` if the two sets share at least one bit.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Subset test: `true` if every bit of `other` is also set in `self`.
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == *b)
    }

    /// Number of set bits.
    #[inline]
    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Iterates set bits in strictly ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            let base = word_index * 64;
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(base + tz)
            })
        })
    }
}

/// Set of component ids.
pub type ComponentSet = Bitset<COMPONENT_WORDS>;

/// Set of system indices, used for explicit `after` ordering edges.
pub type SystemSet = Bitset<SYSTEM_WORDS>;
