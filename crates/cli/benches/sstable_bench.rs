use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use memtable::Memtable;
use sstable::{table_path, SSTable};
use tempfile::tempdir;

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn build_memtable() -> Memtable {
    let mut mem = Memtable::new();
    for i in 0..N_KEYS {
        mem.put(format!("key{:05}", i).into_bytes(), vec![b'x'; VALUE_SIZE]);
    }
    mem
}

fn sstable_write_benchmark(c: &mut Criterion) {
    c.bench_function("sstable_build_from_memtable_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = table_path(dir.path(), 1);
                (dir, path, build_memtable())
            },
            |(_dir, path, mem)| {
                SSTable::from_memtable(&mem, &path).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn sstable_open_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = table_path(dir.path(), 1);
    SSTable::from_memtable(&build_memtable(), &path).unwrap();

    c.bench_function("sstable_open_rescan_10k", |b| {
        b.iter(|| SSTable::open(&path).unwrap());
    });
}

fn sstable_get_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = table_path(dir.path(), 1);
    let table = SSTable::from_memtable(&build_memtable(), &path).unwrap();

    c.bench_function("sstable_get_hit_10k", |b| {
        b.iter(|| {
            for i in 0..N_KEYS {
                let key = format!("key{:05}", i).into_bytes();
                assert!(table.get(&key).unwrap().is_some());
            }
        });
    });

    c.bench_function("sstable_get_miss_10k", |b| {
        b.iter(|| {
            for i in 0..N_KEYS {
                let key = format!("missing{:05}", i).into_bytes();
                assert!(table.get(&key).unwrap().is_none());
            }
        });
    });
}

criterion_group!(
    benches,
    sstable_write_benchmark,
    sstable_open_benchmark,
    sstable_get_benchmark
);
criterion_main!(benches);
