//! Group masks: selective dispatch without reshaping the schedule.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use stagewise::prelude::*;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct Position {
    x: i32,
    y: i32,
}

struct CountCtx {
    seen: AtomicUsize,
}

impl CountCtx {
    fn take(&self) -> usize {
        self.seen.swap(0, Ordering::Relaxed)
    }
}

fn count_system(_ecs: &Ecs, view: &mut View<'_>, udata: Option<&UserData>) -> SystemResult {
    let ctx = udata.unwrap().downcast_ref::<CountCtx>().unwrap();
    ctx.seen.fetch_add(view.len(), Ordering::Relaxed);
    Ok(())
}

#[test]
fn group_mask_selects_systems() {
    let mut ecs = Ecs::new();
    let pos = ecs.register_component::<Position>();

    for _ in 0..10 {
        let e = ecs.create();
        ecs.add(e, pos, Position { x: 0, y: 0 });
    }

    let ctx_a = Arc::new(CountCtx {
        seen: AtomicUsize::new(0),
    });
    let sa = ecs.create_system(count_system, Some(ctx_a.clone()));
    ecs.system_mut(sa).require(pos).set_group(1);

    let ctx_b = Arc::new(CountCtx {
        seen: AtomicUsize::new(0),
    });
    let sb = ecs.create_system(count_system, Some(ctx_b.clone()));
    ecs.system_mut(sb).require(pos).set_group(2);

    let ctx_c = Arc::new(CountCtx {
        seen: AtomicUsize::new(0),
    });
    let sc = ecs.create_system(count_system, Some(ctx_c.clone()));
    ecs.system_mut(sc).require(pos);

    assert_eq!(ecs.system(sa).group(), 1);
    assert_eq!(ecs.system(sb).group(), 2);
    assert_eq!(ecs.system(sc).group(), 0);

    ecs.progress(1).unwrap();
    assert_eq!(ctx_a.take(), 10);
    assert_eq!(ctx_b.take(), 0);
    assert_eq!(ctx_c.take(), 0);

    ecs.progress(2).unwrap();
    assert_eq!(ctx_a.take(), 0);
    assert_eq!(ctx_b.take(), 10);
    assert_eq!(ctx_c.take(), 0);

    ecs.progress(1 | 2).unwrap();
    assert_eq!(ctx_a.take(), 10);
    assert_eq!(ctx_b.take(), 10);
    assert_eq!(ctx_c.take(), 0);

    // A zero mask selects exactly the default group.
    ecs.progress(0).unwrap();
    assert_eq!(ctx_a.take(), 0);
    assert_eq!(ctx_b.take(), 0);
    assert_eq!(ctx_c.take(), 10);
}

#[test]
fn disabled_system_skips_dispatch() {
    let mut ecs = Ecs::new();
    let pos = ecs.register_component::<Position>();
    let e = ecs.create();
    ecs.add(e, pos, Position { x: 0, y: 0 });

    let ctx = Arc::new(CountCtx {
        seen: AtomicUsize::new(0),
    });
    let sys = ecs.create_system(count_system, Some(ctx.clone()));
    ecs.system_mut(sys).require(pos);

    ecs.system_mut(sys).disable();
    assert!(!ecs.system(sys).enabled());
    ecs.progress(0).unwrap();
    assert_eq!(ctx.take(), 0);

    ecs.system_mut(sys).enable();
    ecs.progress(0).unwrap();
    assert_eq!(ctx.take(), 1);
}
