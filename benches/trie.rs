//! Benchmarks for bulk ingestion and the full-tree statistics pass.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use entrie::MemoryStorage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEPTH: usize = 3;

fn generate_ngrams(n: usize) -> Vec<Vec<String>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|_| {
            let len = rng.gen_range(1..=DEPTH);
            (0..len).map(|_| format!("t{}", rng.gen_range(0..50))).collect()
        })
        .collect()
}

fn bench_add_ngram(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_ngram");

    for size in [1_000, 10_000, 100_000].iter() {
        let ngrams = generate_ngrams(*size);

        group.bench_with_input(BenchmarkId::new("MemoryStorage", size), size, |b, _| {
            b.iter(|| {
                let mut storage = MemoryStorage::new(DEPTH);
                for (i, ngram) in ngrams.iter().enumerate() {
                    storage.add_ngram(ngram, (i % 16) as u64, 1).unwrap();
                }
                black_box(storage)
            });
        });
    }

    group.finish();
}

fn bench_update_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_stats");

    for size in [10_000, 100_000].iter() {
        let ngrams = generate_ngrams(*size);
        let mut storage = MemoryStorage::new(DEPTH);
        for (i, ngram) in ngrams.iter().enumerate() {
            storage.add_ngram(ngram, (i % 16) as u64, 1).unwrap();
        }
        let dirtying = ngrams[0].clone();

        group.bench_with_input(BenchmarkId::new("full_pass", size), size, |b, _| {
            b.iter(|| {
                // One write marks the tree stale so every pass does real work.
                storage.add_ngram(&dirtying, 0, 1).unwrap();
                storage.update_stats();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_add_ngram, bench_update_stats);
criterion_main!(benches);
