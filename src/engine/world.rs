//! The world: registration API, immediate operations, and the tick driver.
//!
//! [`Ecs`] owns every pool, the entity allocator, the system registry, the
//! cached schedule, and one command buffer per lane. The public API splits
//! along Rust's borrow rules:
//!
//! * **Immediate structural operations** (`destroy`, `add`, `remove`,
//!   component and system registration) take `&mut self`. During a tick the
//!   driver holds the world exclusively and hands systems only `&Ecs`, so
//!   calling an immediate operation from inside a system is a compile
//!   error, not a runtime hazard.
//! * **Deferred structural operations** go through the [`View`] passed to
//!   the system function. They append to the invoking lane's command buffer
//!   and are applied between stages.
//! * **Reads** (`get`, `has`) and entity allocation (`create`) take `&self`
//!   and are permitted at any time, including from worker threads.
//!
//! ## Tick protocol
//!
//! `progress(group_mask)` rebuilds the schedule if dirty, then walks the
//! stages in order. For each stage it collects the systems that are enabled
//! and match the group mask, fans each one out over the configured lanes
//! through the [`TaskExecutor`], barriers on the executor, and drains all
//! lane command buffers before moving on. A system failure or enqueue
//! failure skips the remaining stages, but the final drain always runs, so
//! no deferred change is left half-applied.
//!
//! In-stage payload writes go through [`View::get_mut`], which hands out a
//! borrow into pool storage. Exclusivity across systems is the stage
//! builder's guarantee; exclusivity across lanes of the same system holds
//! because lanes partition the matched entity slice.

use std::alloc::Layout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::engine::commands::{Command, CommandBuffer, LaneState};
use crate::engine::entity::EntityAllocator;
use crate::engine::error::{SystemResult, TickError, TickResult};
use crate::engine::scheduler::{Schedule, Stage};
use crate::engine::storage::ComponentPool;
use crate::engine::systems::{SystemDesc, SystemFn, UserData};
use crate::engine::types::{
    CompId, ComponentSet, Entity, SysId, MAX_COMPONENTS, MAX_LANES, MAX_SYSTEMS,
};
use crate::jobs::{Job, TaskExecutor};
use crate::profiling::profiler;

/// Shared pointer wrapper used to move `&Ecs` into executor jobs.
///
/// Sound because every job submitted for a stage completes before the
/// stage barrier returns, and the driver keeps `&mut self` for the whole
/// tick, so the pointee outlives every job.
#[derive(Clone, Copy)]
struct WorldPtr(*const Ecs);

unsafe impl Send for WorldPtr {}

/// Parallel entity-component-system world.
pub struct Ecs {
    entities: EntityAllocator,
    pools: Vec<ComponentPool>,
    systems: Vec<SystemDesc>,
    schedule: Schedule,
    executor: Option<Arc<dyn TaskExecutor>>,
    lane_count: usize,
    lanes: Vec<Mutex<LaneState>>,
    in_progress: AtomicBool,
    /// First failure recorded by a worker task during the current stage.
    tick_fault: Mutex<Option<TickError>>,
}

impl Default for Ecs {
    fn default() -> Self {
        Self::new()
    }
}

impl Ecs {
    /// Creates an empty world with a single lane and no executor.
    pub fn new() -> Self {
        Self {
            entities: EntityAllocator::new(),
            pools: Vec::new(),
            systems: Vec::new(),
            schedule: Schedule::new(),
            executor: None,
            lane_count: 1,
            lanes: vec![Mutex::new(LaneState::default())],
            in_progress: AtomicBool::new(false),
            tick_fault: Mutex::new(None),
        }
    }

    /// Configures the task executor backing multithreaded ticks.
    ///
    /// `lanes` is clamped to `[1, MAX_LANES]` and fixes how many slices each
    /// system's entity set is sharded into. With one lane (or no executor)
    /// ticks run on the calling thread.
    pub fn set_executor(&mut self, executor: Arc<dyn TaskExecutor>, lanes: usize) {
        let lanes = lanes.clamp(1, MAX_LANES);
        self.lanes.resize_with(lanes, Default::default);
        self.lane_count = lanes;
        self.executor = Some(executor);
    }

    // ------------------------------------------------------------- entities

    /// Allocates an entity id. Lock-free; callable from any thread,
    /// including from inside system functions.
    #[inline]
    pub fn create(&self) -> Entity {
        self.entities.create()
    }

    /// Destroys an entity immediately: removes it from every pool and
    /// recycles the id.
    ///
    /// Only callable outside a tick (the receiver is `&mut`). From inside a
    /// system, use [`View::destroy`] instead.
    pub fn destroy(&mut self, entity: Entity) {
        debug_assert!(!self.in_progress.load(Ordering::Relaxed));
        self.destroy_now(entity);
    }

    fn destroy_now(&mut self, entity: Entity) {
        for pool in &mut self.pools {
            pool.remove(entity);
        }
        self.entities.recycle(entity);
    }

    // ----------------------------------------------------------- components

    /// Registers a component type and returns its id.
    ///
    /// The `Pod` bound is what makes the pool's byte discipline sound:
    /// zero-initialised slots are valid values and payloads move by plain
    /// byte copy.
    pub fn register_component<T: Pod>(&mut self) -> CompId {
        assert!(
            self.pools.len() < MAX_COMPONENTS,
            "component registry full ({MAX_COMPONENTS})"
        );
        let id = CompId(self.pools.len() as u8);
        self.pools.push(ComponentPool::new(Layout::new::<T>()));
        id
    }

    /// Number of registered component types.
    #[inline]
    pub fn component_count(&self) -> usize {
        self.pools.len()
    }

    /// Attaches a component immediately, overwriting any existing payload,
    /// and returns a borrow of the stored value.
    pub fn add<T: Pod>(&mut self, entity: Entity, comp: CompId, value: T) -> &mut T {
        debug_assert!(!entity.is_none());
        let pool = &mut self.pools[comp.index()];
        debug_assert_eq!(std::mem::size_of::<T>(), pool.elem_size());
        let ptr = pool.add(entity).as_ptr().cast::<T>();
        unsafe {
            ptr.write(value);
            &mut *ptr
        }
    }

    /// Detaches a component immediately; returns `false` if it was absent.
    pub fn remove(&mut self, entity: Entity, comp: CompId) -> bool {
        self.pools[comp.index()].remove(entity)
    }

    /// Reads a component payload. Permitted at any time.
    #[inline]
    pub fn get<T: Pod>(&self, entity: Entity, comp: CompId) -> Option<&T> {
        let pool = &self.pools[comp.index()];
        debug_assert_eq!(std::mem::size_of::<T>(), pool.elem_size());
        pool.ptr_of(entity)
            .map(|p| unsafe { &*p.as_ptr().cast::<T>() })
    }

    /// Mutable access to a component payload, outside a tick.
    #[inline]
    pub fn get_mut<T: Pod>(&mut self, entity: Entity, comp: CompId) -> Option<&mut T> {
        let pool = &self.pools[comp.index()];
        debug_assert_eq!(std::mem::size_of::<T>(), pool.elem_size());
        pool.ptr_of(entity)
            .map(|p| unsafe { &mut *p.as_ptr().cast::<T>() })
    }

    /// Constant-time presence test. Permitted at any time.
    #[inline]
    pub fn has(&self, entity: Entity, comp: CompId) -> bool {
        self.pools[comp.index()].has(entity)
    }

    // -------------------------------------------------------------- systems

    /// Registers a system and returns its id. Systems start enabled, in
    /// group 0, with empty predicates and access sets.
    pub fn create_system(&mut self, func: SystemFn, udata: Option<Arc<UserData>>) -> SysId {
        assert!(
            self.systems.len() < MAX_SYSTEMS,
            "system registry full ({MAX_SYSTEMS})"
        );
        let id = SysId(self.systems.len() as u16);
        self.systems.push(SystemDesc::new(func, udata));
        self.schedule.mark_dirty();
        id
    }

    /// Read access to a system record.
    #[inline]
    pub fn system(&self, sys: SysId) -> &SystemDesc {
        &self.systems[sys.index()]
    }

    /// Number of registered systems.
    #[inline]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Chainable handle for mutating a system's declarations.
    pub fn system_mut(&mut self, sys: SysId) -> SystemHandle<'_> {
        assert!(sys.index() < self.systems.len(), "system id out of range");
        SystemHandle { ecs: self, sys }
    }

    /// The current stage assignment, rebuilding the cached plan if dirty.
    ///
    /// # Panics
    ///
    /// Panics on a cyclic `after` constraint (see [`Schedule::rebuild`]).
    pub fn stages(&mut self) -> &[Stage] {
        self.schedule.rebuild(&self.systems);
        self.schedule.stages()
    }

    // ------------------------------------------------------------ execution

    /// Runs one system to completion, then applies deferred commands.
    ///
    /// Semantically a one-stage tick with a single active system: the same
    /// lane sharding, barrier, and drain as [`Ecs::progress`].
    pub fn run_system(&mut self, sys: SysId) -> TickResult {
        assert!(sys.index() < self.systems.len(), "system id out of range");
        if !self.systems[sys.index()].enabled {
            return Ok(());
        }
        *self.tick_fault.lock() = None;
        self.in_progress.store(true, Ordering::Release);
        let result = self.dispatch([sys.index()].as_slice());
        self.in_progress.store(false, Ordering::Release);
        self.apply_commands();
        result
    }

    /// Runs all eligible systems, stage by stage.
    ///
    /// A system participates if it is enabled and its group matches the
    /// mask: with `group_mask == 0` only group-0 systems run, otherwise any
    /// system whose group intersects the mask bitwise. The first failure
    /// skips the remaining stages; the final command drain still runs.
    pub fn progress(&mut self, group_mask: u32) -> TickResult {
        let _g = profiler::span("Ecs::progress");
        assert!(
            !self.in_progress.load(Ordering::Relaxed),
            "progress is not reentrant"
        );

        self.schedule.rebuild(&self.systems);
        *self.tick_fault.lock() = None;
        self.in_progress.store(true, Ordering::Release);

        let mut result: TickResult = Ok(());
        let stage_count = self.schedule.stages().len();

        for stage_index in 0..stage_count {
            let active: SmallVec<[usize; 8]> = self.schedule.stages()[stage_index]
                .systems()
                .iter()
                .map(|s| s.index())
                .filter(|&i| {
                    let s = &self.systems[i];
                    s.enabled && group_matches(group_mask, s.group)
                })
                .collect();
            if active.is_empty() {
                continue;
            }

            if let Err(fault) = self.dispatch(&active) {
                result = Err(fault);
                break;
            }

            // Structural synchronisation between stages.
            self.in_progress.store(false, Ordering::Release);
            self.apply_commands();
            self.in_progress.store(true, Ordering::Release);
        }

        self.in_progress.store(false, Ordering::Release);
        self.apply_commands();
        result
    }

    /// Runs one stage's active systems, sharded over the lanes, and
    /// barriers on completion.
    fn dispatch(&mut self, active: &[usize]) -> TickResult {
        let _g = profiler::span("Ecs::dispatch_stage");
        let multithreaded = self.executor.is_some() && self.lane_count > 1;

        if !multithreaded {
            for &sys_index in active {
                self.run_lane_task(sys_index, 0, 1).map_err(|source| {
                    TickError::System {
                        system: SysId(sys_index as u16),
                        source,
                    }
                })?;
            }
            return Ok(());
        }

        let executor = Arc::clone(self.executor.as_ref().expect("multithreaded dispatch"));
        let lanes = self.lane_count;
        let world = WorldPtr(self as *const Ecs);

        for &sys_index in active {
            for lane in 0..lanes {
                let ptr = world;
                let job: Job = Box::new(move || {
                    // Valid for the whole stage: the barrier below outlives
                    // every job submitted here.
                    let ptr = ptr;
                    let ecs = unsafe { &*ptr.0 };
                    ecs.run_task_recording(sys_index, lane, lanes);
                });
                if let Err(e) = executor.enqueue(job) {
                    // Drain what was already submitted before handing the
                    // exclusive borrow back to the caller.
                    executor.wait();
                    return Err(TickError::Enqueue(e));
                }
            }
        }

        executor.wait();

        if let Some(fault) = self.tick_fault.lock().take() {
            return Err(fault);
        }
        Ok(())
    }

    fn run_task_recording(&self, sys_index: usize, lane: usize, lanes: usize) {
        if let Err(source) = self.run_lane_task(sys_index, lane, lanes) {
            let mut fault = self.tick_fault.lock();
            if fault.is_none() {
                *fault = Some(TickError::System {
                    system: SysId(sys_index as u16),
                    source,
                });
            }
        }
    }

    /// Executes one `(system, lane)` task: slice the driver pool, filter
    /// the slice against the system's predicates into the lane scratch, and
    /// invoke the system over the matched view.
    fn run_lane_task(&self, sys_index: usize, lane: usize, lanes: usize) -> SystemResult {
        let system = &self.systems[sys_index];

        let Some(driver) = self.pick_driver(&system.all_of) else {
            return Ok(());
        };
        let dense = self.pools[driver].dense();
        let n = dense.len();
        let start = n * lane / lanes;
        let end = n * (lane + 1) / lanes;
        if start == end {
            return Ok(());
        }

        let mut guard = self.lanes[lane].lock();
        let lane_state = &mut *guard;
        lane_state.scratch.clear();

        let check_excluded = system.none_of.any();
        for &entity in &dense[start..end] {
            if !self.entity_has_all(entity, &system.all_of) {
                continue;
            }
            if check_excluded && self.entity_has_any(entity, &system.none_of) {
                continue;
            }
            lane_state.scratch.push(entity);
        }
        if lane_state.scratch.is_empty() {
            return Ok(());
        }

        let LaneState { scratch, buffer } = lane_state;
        let mut view = View {
            ecs: self,
            entities: scratch.as_slice(),
            buffer,
            lane,
        };
        (system.func)(self, &mut view, system.udata.as_deref())
    }

    /// Picks the iteration driver: the required pool with the fewest
    /// entities, for best-effort pruning.
    fn pick_driver(&self, all_of: &ComponentSet) -> Option<usize> {
        let mut best: Option<usize> = None;
        let mut best_len = usize::MAX;
        for comp in all_of.ones() {
            if comp >= self.pools.len() {
                continue;
            }
            let len = self.pools[comp].len();
            if len < best_len {
                best = Some(comp);
                best_len = len;
            }
        }
        best
    }

    fn entity_has_all(&self, entity: Entity, set: &ComponentSet) -> bool {
        set.ones().all(|comp| {
            comp < self.pools.len() && self.pools[comp].has(entity)
        })
    }

    fn entity_has_any(&self, entity: Entity, set: &ComponentSet) -> bool {
        set.ones()
            .any(|comp| comp < self.pools.len() && self.pools[comp].has(entity))
    }

    // ----------------------------------------------------------------- sync

    /// Drains every lane's command buffer into the pools.
    ///
    /// Within a lane commands apply in FIFO order; the order between lanes
    /// is unspecified. Arenas and logs are reset with capacity retained.
    fn apply_commands(&mut self) {
        let _g = profiler::span("Ecs::apply_commands");
        debug_assert!(!self.in_progress.load(Ordering::Relaxed));

        for lane_index in 0..self.lanes.len() {
            // Move the buffer out so the replay can borrow the world
            // mutably; the hollow placeholder allocates nothing.
            let mut buffer = {
                let mut guard = self.lanes[lane_index].lock();
                std::mem::replace(&mut guard.buffer, CommandBuffer::hollow())
            };

            for command in buffer.commands() {
                match *command {
                    Command::Destroy { entity } => self.destroy_now(entity),
                    Command::Add {
                        entity,
                        comp,
                        offset,
                        len,
                    } => {
                        let payload = buffer.payload(offset, len);
                        let pool = &mut self.pools[comp.index()];
                        debug_assert_eq!(len, pool.elem_size());
                        let dst = pool.add(entity);
                        if len != 0 {
                            unsafe {
                                std::ptr::copy_nonoverlapping(
                                    payload.as_ptr(),
                                    dst.as_ptr(),
                                    len,
                                );
                            }
                        }
                    }
                    Command::Remove { entity, comp } => {
                        self.pools[comp.index()].remove(entity);
                    }
                }
            }

            buffer.reset();
            self.lanes[lane_index].lock().buffer = buffer;
        }
    }
}

#[inline]
fn group_matches(mask: u32, group: u32) -> bool {
    if mask == 0 {
        group == 0
    } else {
        group & mask != 0
    }
}

/// Chainable mutator over one system's declarations.
///
/// Predicate, access, ordering, and enablement changes mark the cached
/// schedule dirty; group and user-data changes do not, since they only
/// matter at dispatch time.
pub struct SystemHandle<'w> {
    ecs: &'w mut Ecs,
    sys: SysId,
}

impl SystemHandle<'_> {
    #[inline]
    fn desc(&mut self) -> &mut SystemDesc {
        &mut self.ecs.systems[self.sys.index()]
    }

    fn check_comp(&self, comp: CompId) {
        assert!(
            comp.index() < self.ecs.pools.len(),
            "component id out of range"
        );
    }

    /// Requires `comp` on matched entities; also marks it read.
    pub fn require(mut self, comp: CompId) -> Self {
        self.check_comp(comp);
        let d = self.desc();
        d.all_of.set(comp.index());
        d.read.set(comp.index());
        d.rw.set(comp.index());
        self.ecs.schedule.mark_dirty();
        self
    }

    /// Excludes entities holding `comp`.
    pub fn exclude(mut self, comp: CompId) -> Self {
        self.check_comp(comp);
        self.desc().none_of.set(comp.index());
        self.ecs.schedule.mark_dirty();
        self
    }

    /// Declares a read of `comp` without requiring it.
    pub fn read(mut self, comp: CompId) -> Self {
        self.check_comp(comp);
        let d = self.desc();
        d.read.set(comp.index());
        d.rw.set(comp.index());
        self.ecs.schedule.mark_dirty();
        self
    }

    /// Declares a write of `comp`.
    pub fn write(mut self, comp: CompId) -> Self {
        self.check_comp(comp);
        let d = self.desc();
        d.write.set(comp.index());
        d.rw.set(comp.index());
        self.ecs.schedule.mark_dirty();
        self
    }

    /// Forces this system into a strictly later stage than `dep`.
    pub fn after(mut self, dep: SysId) -> Self {
        assert!(
            dep.index() < self.ecs.systems.len(),
            "system id out of range"
        );
        self.desc().after.set(dep.index());
        self.ecs.schedule.mark_dirty();
        self
    }

    /// Enables the system.
    pub fn enable(mut self) -> Self {
        self.desc().enabled = true;
        self.ecs.schedule.mark_dirty();
        self
    }

    /// Disables the system. It keeps its stage; it just stops dispatching.
    pub fn disable(mut self) -> Self {
        self.desc().enabled = false;
        self.ecs.schedule.mark_dirty();
        self
    }

    /// Sets the group tag tested against the `progress` mask.
    pub fn set_group(mut self, group: u32) -> Self {
        self.desc().group = group;
        self
    }

    /// Replaces the system's user data.
    pub fn set_udata(mut self, udata: Arc<UserData>) -> Self {
        self.desc().udata = Some(udata);
        self
    }

    /// The system this handle mutates.
    #[inline]
    pub fn id(&self) -> SysId {
        self.sys
    }
}

/// Per-task window over the world passed to a system function.
///
/// Holds the matched entity slice for this `(system, lane)` task and the
/// lane's command buffer. Structural changes staged here become visible
/// after the next stage boundary.
pub struct View<'a> {
    ecs: &'a Ecs,
    entities: &'a [Entity],
    buffer: &'a mut CommandBuffer,
    lane: usize,
}

impl View<'_> {
    /// Matched entities, in driver-pool order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        self.entities
    }

    /// Number of matched entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the slice is empty (the driver does not invoke
    /// systems on empty slices, so user code normally never sees this).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Index of the lane executing this task.
    #[inline]
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// The world, for reads and entity allocation.
    #[inline]
    pub fn ecs(&self) -> &Ecs {
        self.ecs
    }

    /// Allocates an entity id (lock-free).
    #[inline]
    pub fn create(&self) -> Entity {
        self.ecs.create()
    }

    /// Reads a component payload.
    #[inline]
    pub fn get<T: Pod>(&self, entity: Entity, comp: CompId) -> Option<&T> {
        self.ecs.get(entity, comp)
    }

    /// Writes a component payload in place.
    ///
    /// The borrow is scoped to this call chain. Exclusivity holds because
    /// the stage builder keeps every other system that touches `comp` out
    /// of this stage, and lanes of the same system partition the matched
    /// entities; writing through an entity outside this view's slice is a
    /// contract violation.
    #[inline]
    pub fn get_mut<T: Pod>(&mut self, entity: Entity, comp: CompId) -> Option<&mut T> {
        let pool = &self.ecs.pools[comp.index()];
        debug_assert_eq!(std::mem::size_of::<T>(), pool.elem_size());
        pool.ptr_of(entity)
            .map(|p| unsafe { &mut *p.as_ptr().cast::<T>() })
    }

    /// Constant-time presence test.
    #[inline]
    pub fn has(&self, entity: Entity, comp: CompId) -> bool {
        self.ecs.has(entity, comp)
    }

    /// Stages a deferred component add; `value` is copied into the lane
    /// arena and lands in the pool at the next stage boundary.
    pub fn add<T: Pod>(&mut self, entity: Entity, comp: CompId, value: T) {
        debug_assert!(comp.index() < self.ecs.pools.len());
        debug_assert_eq!(
            std::mem::size_of::<T>(),
            self.ecs.pools[comp.index()].elem_size()
        );
        self.buffer.push_add(entity, comp, bytemuck::bytes_of(&value));
    }

    /// Stages a deferred component removal (ignored if absent at apply
    /// time).
    pub fn remove(&mut self, entity: Entity, comp: CompId) {
        debug_assert!(comp.index() < self.ecs.pools.len());
        self.buffer.push_remove(entity, comp);
    }

    /// Stages a deferred entity destruction.
    pub fn destroy(&mut self, entity: Entity) {
        self.buffer.push_destroy(entity);
    }
}
