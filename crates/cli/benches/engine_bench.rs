use config::EngineConfig;
use criterion::{criterion_group, criterion_main, Criterion};
use engine::Engine;
use tempfile::tempdir;

const N_KEYS: usize = 5_000;

fn config() -> EngineConfig {
    EngineConfig::default()
        .with_wal_sync(false)
        .with_memtable_max_bytes(64 * 1024)
}

fn engine_put_benchmark(c: &mut Criterion) {
    c.bench_function("engine_put_5k", |b| {
        b.iter(|| {
            let dir = tempdir().unwrap();
            let engine = Engine::open_with(dir.path(), config()).unwrap();
            for i in 0..N_KEYS {
                engine
                    .put(format!("key{:05}", i).into_bytes(), vec![b'v'; 64])
                    .unwrap();
            }
            engine.close().unwrap();
        });
    });
}

fn engine_get_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let engine = Engine::open_with(dir.path(), config()).unwrap();
    for i in 0..N_KEYS {
        engine
            .put(format!("key{:05}", i).into_bytes(), vec![b'v'; 64])
            .unwrap();
    }
    engine.force_flush().unwrap();

    c.bench_function("engine_get_5k", |b| {
        b.iter(|| {
            for i in 0..N_KEYS {
                let key = format!("key{:05}", i).into_bytes();
                assert!(engine.get(&key).unwrap().is_some());
            }
        });
    });
}

criterion_group!(benches, engine_put_benchmark, engine_get_benchmark);
criterion_main!(benches);
