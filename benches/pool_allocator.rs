//! Bank allocator benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tiledma::memory::{PoolAllocator, PoolConfig};

fn bench_alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_alloc_free");

    for live in [0usize, 16, 64, 128] {
        let mut pool = PoolAllocator::new(0x10_0000, 1 << 20, PoolConfig::default()).unwrap();
        // Fragment the pool so first-fit has blocks to walk past.
        let held: Vec<_> = (0..live * 2).map(|_| pool.alloc(256, 64).unwrap()).collect();
        for addr in held.iter().step_by(2) {
            pool.free(*addr);
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(live), &live, |b, _| {
            b.iter(|| {
                let addr = pool.alloc(std::hint::black_box(1024), 64).unwrap();
                pool.free(addr);
            });
        });
    }

    group.finish();
}

fn bench_fill_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_fill_and_drain");
    group.throughput(Throughput::Elements(100));
    group.bench_function("100_tiles_reverse_free", |b| {
        let mut pool = PoolAllocator::new(0x10_0000, 1 << 20, PoolConfig::default()).unwrap();
        b.iter(|| {
            let addrs: Vec<_> = (0..100).map(|i| pool.alloc(512 + i * 8, 64).unwrap()).collect();
            for addr in addrs.into_iter().rev() {
                pool.free(addr);
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_alloc_free, bench_fill_and_drain);
criterion_main!(benches);
