//! Deferred structural changes.
//!
//! Structural mutations issued while a tick is running (component adds and
//! removes, entity destruction) are not applied immediately; they are logged
//! into the issuing lane's [`CommandBuffer`] and replayed between stages,
//! when no system is executing. Within one lane the log is strictly FIFO;
//! between lanes the application order is unspecified.
//!
//! Add payloads are copied into a per-lane bump arena at staging time, and
//! commands record arena offsets rather than pointers, so arena growth
//! never invalidates a staged payload.

use crate::engine::types::{
    CompId, Entity, COMMAND_BUFFER_INITIAL_CAPACITY, COMMAND_DATA_INITIAL_CAPACITY,
    SCRATCH_INITIAL_CAPACITY,
};

/// One deferred structural change.
#[derive(Clone, Copy, Debug)]
pub enum Command {
    /// Destroy an entity (remove it from every pool, recycle the id).
    Destroy {
        /// Target entity.
        entity: Entity,
    },
    /// Attach a component, copying the staged payload out of the arena.
    Add {
        /// Target entity.
        entity: Entity,
        /// Component to attach.
        comp: CompId,
        /// Payload start within the lane arena.
        offset: usize,
        /// Payload length in bytes.
        len: usize,
    },
    /// Detach a component; ignored if absent at application time.
    Remove {
        /// Target entity.
        entity: Entity,
        /// Component to detach.
        comp: CompId,
    },
}

/// Append-only log of deferred commands plus the arena backing Add payloads.
pub struct CommandBuffer {
    commands: Vec<Command>,
    arena: Vec<u8>,
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuffer {
    /// Creates an empty buffer with the configured initial capacities.
    pub fn new() -> Self {
        Self {
            commands: Vec::with_capacity(COMMAND_BUFFER_INITIAL_CAPACITY),
            arena: Vec::with_capacity(COMMAND_DATA_INITIAL_CAPACITY),
        }
    }

    /// Creates a buffer that has allocated nothing. Used as a placeholder
    /// while a lane's real buffer is moved out for draining.
    pub fn hollow() -> Self {
        Self {
            commands: Vec::new(),
            arena: Vec::new(),
        }
    }

    /// Number of staged commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is staged.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Stages an entity destruction.
    #[inline]
    pub fn push_destroy(&mut self, entity: Entity) {
        self.commands.push(Command::Destroy { entity });
    }

    /// Stages a component removal.
    #[inline]
    pub fn push_remove(&mut self, entity: Entity, comp: CompId) {
        self.commands.push(Command::Remove { entity, comp });
    }

    /// Stages a component add, copying `payload` into the arena.
    pub fn push_add(&mut self, entity: Entity, comp: CompId, payload: &[u8]) {
        let offset = self.arena.len();
        self.arena.extend_from_slice(payload);
        self.commands.push(Command::Add {
            entity,
            comp,
            offset,
            len: payload.len(),
        });
    }

    /// Staged commands in FIFO order.
    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Arena bytes for a staged Add payload.
    #[inline]
    pub fn payload(&self, offset: usize, len: usize) -> &[u8] {
        &self.arena[offset..offset + len]
    }

    /// Empties the log and the arena, retaining capacity.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.arena.clear();
    }
}

/// Per-lane mutable state: the matched-entity scratch and the command log.
///
/// A task takes its lane's state for the duration of the system call, so
/// two tasks sharing a lane serialise on it while tasks on different lanes
/// proceed independently.
pub struct LaneState {
    /// Scratch buffer the matcher fills with this task's entity slice.
    pub scratch: Vec<Entity>,
    /// Deferred-command log for this lane.
    pub buffer: CommandBuffer,
}

impl Default for LaneState {
    fn default() -> Self {
        Self {
            scratch: Vec::with_capacity(SCRATCH_INITIAL_CAPACITY),
            buffer: CommandBuffer::new(),
        }
    }
}
