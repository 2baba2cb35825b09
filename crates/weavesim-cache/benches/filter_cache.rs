//! Benchmarks for the lock-free filter-cache probe (§4.3's hot path).
//!
//! Run with: cargo bench -p weavesim-cache

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use weavesim_cache::FilterCache;

fn bench_probe_hit(c: &mut Criterion) {
    let fc = FilterCache::new(256);
    fc.fill(0x4000, 100, true);

    c.bench_function("filter_cache_probe_load_hit", |b| {
        b.iter(|| fc.probe_load(black_box(0x4000), black_box(100)));
    });

    c.bench_function("filter_cache_probe_store_hit", |b| {
        b.iter(|| fc.probe_store(black_box(0x4000), black_box(100)));
    });
}

fn bench_probe_miss(c: &mut Criterion) {
    let fc = FilterCache::new(256);

    c.bench_function("filter_cache_probe_load_miss", |b| {
        b.iter(|| fc.probe_load(black_box(0x8000), black_box(100)));
    });
}

fn bench_fill(c: &mut Criterion) {
    let fc = FilterCache::new(256);
    let mut cycle = 0u64;

    c.bench_function("filter_cache_fill", |b| {
        b.iter(|| {
            cycle += 1;
            fc.fill(black_box(0x4000), black_box(cycle), true);
        });
    });
}

criterion_group!(benches, bench_probe_hit, bench_probe_miss, bench_fill);
criterion_main!(benches);
