// Hash index micro-benchmarks: insert throughput and probe cost for
// point lookups on a resident working set.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use probedb::buffer::{BufferPoolManager, PAGE_SIZE};
use probedb::index::{LinearProbeHashTable, OrdComparator, SipKeyHasher};
use probedb::storage::DiskManager;
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;

type IntTable = LinearProbeHashTable<u64, u64, OrdComparator, SipKeyHasher>;

fn create_table(buckets: usize) -> (IntTable, TempDir) {
    let dir = TempDir::new().unwrap();
    let disk = DiskManager::new(dir.path(), PAGE_SIZE).unwrap();
    let pool = Arc::new(BufferPoolManager::new(64, Arc::new(disk)));
    let table = IntTable::new("bench_index", pool, OrdComparator, buckets, SipKeyHasher).unwrap();
    (table, dir)
}

fn bench_insert(c: &mut Criterion) {
    c.bench_function("insert_1k", |b| {
        b.iter_batched(
            || create_table(4096),
            |(table, _dir)| {
                for i in 0..1000u64 {
                    black_box(table.insert(&i, &i).unwrap());
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_get_value(c: &mut Criterion) {
    let (table, _dir) = create_table(4096);
    for i in 0..1000u64 {
        table.insert(&i, &i).unwrap();
    }

    c.bench_function("get_value_hit", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key = (key + 1) % 1000;
            black_box(table.get_value(&key).unwrap());
        });
    });

    c.bench_function("get_value_miss", |b| {
        b.iter(|| {
            black_box(table.get_value(&u64::MAX).unwrap());
        });
    });
}

criterion_group!(benches, bench_insert, bench_get_value);
criterion_main!(benches);
