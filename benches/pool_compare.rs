use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use rayon::prelude::*;

use stagewise::JobPool;

const JOBS: usize = 10_000;

fn pool_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_compare");

    group.bench_function("ticket_pool_submit_wait_10k", |b| {
        let pool = JobPool::new(4, 0);
        let counter = Arc::new(AtomicUsize::new(0));
        b.iter(|| {
            for _ in 0..JOBS {
                let counter = Arc::clone(&counter);
                pool.submit(Box::new(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                }));
            }
            pool.wait();
        });
    });

    group.bench_function("rayon_par_iter_10k", |b| {
        let rayon_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        b.iter(|| {
            rayon_pool.install(|| {
                (0..JOBS).into_par_iter().for_each(|_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            });
        });
    });

    group.bench_function("inline_baseline_10k", |b| {
        let counter = AtomicUsize::new(0);
        b.iter(|| {
            for _ in 0..JOBS {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });
    });

    group.finish();
}

criterion_group!(benches, pool_compare);
criterion_main!(benches);
