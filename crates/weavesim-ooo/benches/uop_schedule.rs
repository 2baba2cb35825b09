//! Benchmarks for the per-uop scheduling loop (§4.1).
//!
//! Run with: cargo bench -p weavesim-ooo

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use weavesim_core::{BblInfo, Operands, Uop, UopKind};
use weavesim_ooo::{FixedLatencyAccessor, OooCore};

fn alu_bbl(len: usize) -> BblInfo {
    let uops = (0..len)
        .map(|i| {
            let dst = (i % 14) as u16 + 1;
            let src = ((i + 1) % 14) as u16 + 1;
            Uop::new(
                Operands::new([Some(src), None], [Some(dst), None]),
                1,
                (i * 4) as u32,
                UopKind::General,
                0b0001,
                0,
            )
            .unwrap()
        })
        .collect();
    BblInfo::new(len as u32, (len * 4).max(1) as u32, uops).unwrap()
}

fn mem_bbl(len: usize) -> BblInfo {
    let uops = (0..len)
        .map(|i| {
            let kind = if i % 2 == 0 { UopKind::Load } else { UopKind::Store };
            Uop::new(Operands::NONE, 4, (i * 4) as u32, kind, 0b0010, 0).unwrap()
        })
        .collect();
    BblInfo::new(len as u32, (len * 4).max(1) as u32, uops).unwrap()
}

fn bench_alu_bbl(c: &mut Criterion) {
    let mut group = c.benchmark_group("ooo_execute_bbl_alu");
    for len in [8usize, 32, 128] {
        let bbl = alu_bbl(len);
        let mem_addrs = vec![None; len];
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                let mut core = OooCore::new();
                let mut mem = FixedLatencyAccessor { latency: 4 };
                black_box(core.execute_bbl(black_box(&bbl), black_box(&mem_addrs), &mut mem));
            });
        });
    }
    group.finish();
}

fn bench_mem_bbl(c: &mut Criterion) {
    let mut group = c.benchmark_group("ooo_execute_bbl_mem");
    for len in [8usize, 32, 128] {
        let bbl = mem_bbl(len);
        let mem_addrs: Vec<Option<u64>> = (0..len).map(|i| Some((i as u64 % 4) * 64)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                let mut core = OooCore::new();
                let mut mem = FixedLatencyAccessor { latency: 4 };
                black_box(core.execute_bbl(black_box(&bbl), black_box(&mem_addrs), &mut mem));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_alu_bbl, bench_mem_bbl);
criterion_main!(benches);
