//! Pool-backed ticks: lane sharding, stage barriers, and failure
//! propagation.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use stagewise::{EnqueueError, Job, JobPool, SystemError, TaskExecutor, TickError};
use stagewise::prelude::*;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct Position {
    x: i64,
    y: i64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct Velocity {
    vx: i64,
    vy: i64,
}

struct IncCtx {
    pos: CompId,
    touched: AtomicUsize,
}

fn increment(_ecs: &Ecs, view: &mut View<'_>, udata: Option<&UserData>) -> SystemResult {
    let ctx = udata.unwrap().downcast_ref::<IncCtx>().unwrap();
    ctx.touched.fetch_add(view.len(), Ordering::Relaxed);
    for i in 0..view.len() {
        let e = view.entities()[i];
        view.get_mut::<Position>(e, ctx.pos).unwrap().x += 1;
    }
    Ok(())
}

struct SumCtx {
    pos: CompId,
    sum: AtomicI64,
}

fn sum_positions(_ecs: &Ecs, view: &mut View<'_>, udata: Option<&UserData>) -> SystemResult {
    let ctx = udata.unwrap().downcast_ref::<SumCtx>().unwrap();
    for i in 0..view.len() {
        let e = view.entities()[i];
        let x = view.get::<Position>(e, ctx.pos).unwrap().x;
        ctx.sum.fetch_add(x, Ordering::Relaxed);
    }
    Ok(())
}

#[test]
fn lanes_partition_without_overlap_or_gaps() {
    // A prime entity count exercises uneven slice boundaries.
    const N: usize = 997;

    let pool = Arc::new(JobPool::new(4, 0));
    let mut ecs = Ecs::new();
    ecs.set_executor(pool, 8);

    let pos = ecs.register_component::<Position>();
    let mut entities = Vec::new();
    for _ in 0..N {
        let e = ecs.create();
        ecs.add(e, pos, Position { x: 0, y: 0 });
        entities.push(e);
    }

    let ctx = Arc::new(IncCtx {
        pos,
        touched: AtomicUsize::new(0),
    });
    let sys = ecs.create_system(increment, Some(ctx.clone()));
    ecs.system_mut(sys).require(pos).write(pos);

    ecs.progress(0).unwrap();

    assert_eq!(ctx.touched.load(Ordering::Relaxed), N);
    for &e in &entities {
        // Exactly once: no lane overlap, no gap.
        assert_eq!(ecs.get::<Position>(e, pos).unwrap().x, 1);
    }
}

#[test]
fn conflicting_systems_observe_stage_barrier() {
    const N: i64 = 100;

    let pool = Arc::new(JobPool::new(4, 0));
    let mut ecs = Ecs::new();
    ecs.set_executor(pool, 4);

    let pos = ecs.register_component::<Position>();
    for i in 0..N {
        let e = ecs.create();
        ecs.add(e, pos, Position { x: i, y: 0 });
    }

    let inc_ctx = Arc::new(IncCtx {
        pos,
        touched: AtomicUsize::new(0),
    });
    let writer = ecs.create_system(increment, Some(inc_ctx));
    ecs.system_mut(writer).require(pos).write(pos);

    let sum_ctx = Arc::new(SumCtx {
        pos,
        sum: AtomicI64::new(0),
    });
    let reader = ecs.create_system(sum_positions, Some(sum_ctx.clone()));
    ecs.system_mut(reader).require(pos);

    ecs.progress(0).unwrap();

    // The reader runs a stage later and must see every increment:
    // sum of (i + 1) for i in 0..N.
    assert_eq!(sum_ctx.sum.load(Ordering::Relaxed), N * (N + 1) / 2);
}

#[test]
fn independent_systems_share_a_stage_and_both_run() {
    let pool = Arc::new(JobPool::new(4, 0));
    let mut ecs = Ecs::new();
    ecs.set_executor(pool, 4);

    let pos = ecs.register_component::<Position>();
    let vel = ecs.register_component::<Velocity>();

    for i in 0..64 {
        let e = ecs.create();
        ecs.add(e, pos, Position { x: i, y: 0 });
        let f = ecs.create();
        ecs.add(f, vel, Velocity { vx: i, vy: 0 });
    }

    let inc_ctx = Arc::new(IncCtx {
        pos,
        touched: AtomicUsize::new(0),
    });
    let a = ecs.create_system(increment, Some(inc_ctx.clone()));
    ecs.system_mut(a).require(pos).write(pos);

    let sum_ctx = Arc::new(SumCtx {
        pos: vel,
        sum: AtomicI64::new(0),
    });
    fn sum_velocities(
        _ecs: &Ecs,
        view: &mut View<'_>,
        udata: Option<&UserData>,
    ) -> SystemResult {
        let ctx = udata.unwrap().downcast_ref::<SumCtx>().unwrap();
        for i in 0..view.len() {
            let e = view.entities()[i];
            let vx = view.get::<Velocity>(e, ctx.pos).unwrap().vx;
            ctx.sum.fetch_add(vx, Ordering::Relaxed);
        }
        Ok(())
    }
    let b = ecs.create_system(sum_velocities, Some(sum_ctx.clone()));
    ecs.system_mut(b).require(vel);

    // Disjoint access: one stage.
    assert_eq!(ecs.stages().len(), 1);

    ecs.progress(0).unwrap();
    assert_eq!(inc_ctx.touched.load(Ordering::Relaxed), 64);
    assert_eq!(sum_ctx.sum.load(Ordering::Relaxed), (0..64).sum::<i64>());
}

struct SpawnCtx {
    pos: CompId,
    vel: CompId,
}

fn spawn_velocity(_ecs: &Ecs, view: &mut View<'_>, udata: Option<&UserData>) -> SystemResult {
    let ctx = udata.unwrap().downcast_ref::<SpawnCtx>().unwrap();
    for i in 0..view.len() {
        let e = view.entities()[i];
        let x = view.get::<Position>(e, ctx.pos).unwrap().x;
        view.add(e, ctx.vel, Velocity { vx: x * 10, vy: 0 });
    }
    Ok(())
}

#[test]
fn deferred_spawn_under_parallel_execution() {
    const N: i64 = 256;

    let pool = Arc::new(JobPool::new(4, 0));
    let mut ecs = Ecs::new();
    ecs.set_executor(pool, 8);

    let pos = ecs.register_component::<Position>();
    let vel = ecs.register_component::<Velocity>();

    let mut entities = Vec::new();
    for i in 0..N {
        let e = ecs.create();
        ecs.add(e, pos, Position { x: i, y: 0 });
        entities.push(e);
    }

    let spawner = ecs.create_system(spawn_velocity, Some(Arc::new(SpawnCtx { pos, vel })));
    ecs.system_mut(spawner).require(pos).exclude(vel).write(vel);

    ecs.progress(0).unwrap();

    for (i, &e) in entities.iter().enumerate() {
        assert!(ecs.has(e, vel));
        assert_eq!(ecs.get::<Velocity>(e, vel).unwrap().vx, i as i64 * 10);
    }
}

struct FailCtx {
    vel: CompId,
}

fn fail_after_staging(_ecs: &Ecs, view: &mut View<'_>, udata: Option<&UserData>) -> SystemResult {
    let ctx = udata.unwrap().downcast_ref::<FailCtx>().unwrap();
    let e = view.entities()[0];
    view.add(e, ctx.vel, Velocity { vx: 99, vy: 0 });
    Err(SystemError::status(42))
}

#[test]
fn system_failure_short_circuits_but_drains() {
    let mut ecs = Ecs::new();
    let pos = ecs.register_component::<Position>();
    let vel = ecs.register_component::<Velocity>();

    let e = ecs.create();
    ecs.add(e, pos, Position { x: 0, y: 0 });

    // Three-writer chain on the same component: three stages.
    let inc_ctx = Arc::new(IncCtx {
        pos,
        touched: AtomicUsize::new(0),
    });
    let first = ecs.create_system(increment, Some(inc_ctx.clone()));
    ecs.system_mut(first).require(pos).write(pos);

    let failing = ecs.create_system(fail_after_staging, Some(Arc::new(FailCtx { vel })));
    ecs.system_mut(failing).require(pos).write(pos).write(vel);

    let last_ctx = Arc::new(IncCtx {
        pos,
        touched: AtomicUsize::new(0),
    });
    let last = ecs.create_system(increment, Some(last_ctx.clone()));
    ecs.system_mut(last).require(pos).write(pos);

    let result = ecs.progress(0);
    assert_eq!(
        result,
        Err(TickError::System {
            system: failing,
            source: SystemError { code: 42 },
        })
    );

    // The first stage ran, the stage after the failure did not.
    assert_eq!(inc_ctx.touched.load(Ordering::Relaxed), 1);
    assert_eq!(last_ctx.touched.load(Ordering::Relaxed), 0);

    // The final drain still applied what the failing stage staged.
    assert_eq!(ecs.get::<Velocity>(e, vel).unwrap().vx, 99);
}

#[test]
fn system_failure_propagates_from_workers() {
    let pool = Arc::new(JobPool::new(2, 0));
    let mut ecs = Ecs::new();
    ecs.set_executor(pool, 4);

    let pos = ecs.register_component::<Position>();
    let vel = ecs.register_component::<Velocity>();
    let e = ecs.create();
    ecs.add(e, pos, Position { x: 0, y: 0 });

    let failing = ecs.create_system(fail_after_staging, Some(Arc::new(FailCtx { vel })));
    ecs.system_mut(failing).require(pos).write(vel);

    match ecs.progress(0) {
        Err(TickError::System { system, source }) => {
            assert_eq!(system, failing);
            assert_eq!(source.code, 42);
        }
        other => panic!("expected system failure, got {other:?}"),
    }
    assert!(ecs.has(e, vel));
}

struct RefusingExecutor;

impl TaskExecutor for RefusingExecutor {
    fn enqueue(&self, _job: Job) -> Result<(), EnqueueError> {
        Err(EnqueueError { code: 7 })
    }

    fn wait(&self) {}
}

#[test]
fn enqueue_failure_aborts_the_tick() {
    let mut ecs = Ecs::new();
    ecs.set_executor(Arc::new(RefusingExecutor), 4);

    let pos = ecs.register_component::<Position>();
    let e = ecs.create();
    ecs.add(e, pos, Position { x: 0, y: 0 });

    let ctx = Arc::new(IncCtx {
        pos,
        touched: AtomicUsize::new(0),
    });
    let sys = ecs.create_system(increment, Some(ctx.clone()));
    ecs.system_mut(sys).require(pos).write(pos);

    assert_eq!(
        ecs.progress(0),
        Err(TickError::Enqueue(EnqueueError { code: 7 }))
    );
    assert_eq!(ctx.touched.load(Ordering::Relaxed), 0);

    // Subsequent ticks work again once a real executor is installed.
    ecs.set_executor(Arc::new(JobPool::new(2, 0)), 2);
    ecs.progress(0).unwrap();
    assert_eq!(ctx.touched.load(Ordering::Relaxed), 1);
}
