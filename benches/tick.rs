use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use criterion::{criterion_group, criterion_main, Criterion};

use stagewise::prelude::*;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Position {
    x: f32,
    y: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Velocity {
    vx: f32,
    vy: f32,
}

struct Ctx {
    pos: CompId,
    vel: CompId,
}

fn integrate(_ecs: &Ecs, view: &mut View<'_>, udata: Option<&UserData>) -> SystemResult {
    let ctx = udata.unwrap().downcast_ref::<Ctx>().unwrap();
    for i in 0..view.len() {
        let e = view.entities()[i];
        let v = *view.get::<Velocity>(e, ctx.vel).unwrap();
        let p = view.get_mut::<Position>(e, ctx.pos).unwrap();
        p.x += v.vx;
        p.y += v.vy;
    }
    Ok(())
}

fn damp(_ecs: &Ecs, view: &mut View<'_>, udata: Option<&UserData>) -> SystemResult {
    let ctx = udata.unwrap().downcast_ref::<Ctx>().unwrap();
    for i in 0..view.len() {
        let e = view.entities()[i];
        let v = view.get_mut::<Velocity>(e, ctx.vel).unwrap();
        v.vx *= 0.99;
        v.vy *= 0.99;
    }
    Ok(())
}

struct CountCtx {
    counter: Arc<AtomicUsize>,
}

fn count(_ecs: &Ecs, view: &mut View<'_>, udata: Option<&UserData>) -> SystemResult {
    let ctx = udata.unwrap().downcast_ref::<CountCtx>().unwrap();
    ctx.counter.fetch_add(view.len(), Ordering::Relaxed);
    Ok(())
}

fn make_world(entities: usize, workers: Option<(usize, usize)>) -> (Ecs, CompId, CompId) {
    let mut ecs = Ecs::new();
    if let Some((threads, lanes)) = workers {
        ecs.set_executor(Arc::new(JobPool::new(threads, 0)), lanes);
    }

    let pos = ecs.register_component::<Position>();
    let vel = ecs.register_component::<Velocity>();

    for i in 0..entities {
        let e = ecs.create();
        ecs.add(e, pos, Position { x: 0.0, y: 0.0 });
        ecs.add(
            e,
            vel,
            Velocity {
                vx: (i % 7) as f32,
                vy: (i % 13) as f32,
            },
        );
    }

    let ctx = Arc::new(Ctx { pos, vel });
    let a = ecs.create_system(integrate, Some(ctx.clone()));
    ecs.system_mut(a).require(pos).require(vel).write(pos);
    let b = ecs.create_system(damp, Some(ctx));
    ecs.system_mut(b).require(vel).write(vel);

    (ecs, pos, vel)
}

fn tick_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    group.bench_function("tick_2_systems_100k_single_thread", |b| {
        let (mut ecs, _, _) = make_world(100_000, None);
        b.iter(|| ecs.progress(0).unwrap());
    });

    group.bench_function("tick_2_systems_100k_pool4_lanes8", |b| {
        let (mut ecs, _, _) = make_world(100_000, Some((4, 8)));
        b.iter(|| ecs.progress(0).unwrap());
    });

    group.finish();
}

fn matching_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching");

    group.bench_function("count_matches_50k", |b| {
        let (mut ecs, pos, vel) = make_world(50_000, None);
        let counter = Arc::new(AtomicUsize::new(0));
        let sys = ecs.create_system(
            count,
            Some(Arc::new(CountCtx {
                counter: counter.clone(),
            })),
        );
        ecs.system_mut(sys).require(pos).require(vel);

        b.iter(|| ecs.run_system(sys).unwrap());
    });

    group.finish();
}

criterion_group!(benches, tick_benchmark, matching_benchmark);
criterion_main!(benches);
