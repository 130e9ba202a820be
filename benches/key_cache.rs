//! Benchmarks for derived key lookups across the cache tiers

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spooltag_rs::{BambuKeyDerivation, CacheConfig, DerivedKeyCache, KeyDerivation, MemoryStore};
use std::sync::Arc;

fn uid(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

fn cache(memory_capacity: usize, persistent_capacity: usize) -> DerivedKeyCache {
    let config = CacheConfig {
        memory_capacity,
        persistent_capacity,
        ..CacheConfig::default()
    };
    DerivedKeyCache::new(
        Arc::new(BambuKeyDerivation::new()),
        Arc::new(MemoryStore::new()),
        &config,
    )
}

fn benchmark_derive(c: &mut Criterion) {
    let engine = BambuKeyDerivation::new();
    c.bench_function("derive_uncached", |b| {
        b.iter(|| black_box(engine.derive_keys(black_box(&[0x04, 0xA1, 0xB2, 0xC3]))));
    });
}

fn benchmark_memory_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_cache_memory_hit");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let cache = cache(size, size * 2);
            for i in 0..size as u32 {
                cache.get_derived_keys(&uid(i));
            }
            b.iter(|| black_box(cache.get_derived_keys(black_box(&uid(0)))));
        });
    }

    group.finish();
}

fn benchmark_persistent_hit(c: &mut Criterion) {
    c.bench_function("key_cache_persistent_hit", |b| {
        // one memory slot, so alternating uids always fall through to the store
        let cache = cache(1, 100);
        cache.get_derived_keys(&uid(1));
        cache.get_derived_keys(&uid(2));
        let mut n = 0u32;
        b.iter(|| {
            n = n.wrapping_add(1);
            black_box(cache.get_derived_keys(&uid(1 + n % 2)))
        });
    });
}

fn benchmark_cold_miss(c: &mut Criterion) {
    c.bench_function("key_cache_cold_miss", |b| {
        let cache = cache(100, 200);
        let mut n = 0u32;
        b.iter(|| {
            n = n.wrapping_add(1);
            black_box(cache.get_derived_keys(&uid(n)))
        });
    });
}

criterion_group!(
    benches,
    benchmark_derive,
    benchmark_memory_hit,
    benchmark_persistent_hit,
    benchmark_cold_miss
);
criterion_main!(benches);
