//! Micro-benchmarks for FirmusDB core operations.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- create    # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use firmusdb::{Store, StoreConfig, SyncMode};
use rand::Rng;
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Default value payload for benchmarks (128 bytes).
const VALUE_128B: &str = "abcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyzabcdefghijkl\
                          abcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyzabcdefghijkl";

/// Format a zero-padded key.
fn make_key(i: u64) -> String {
    format!("key-{i:012}")
}

/// Open a fresh store with the given durability mode.
fn open_store(dir: &std::path::Path, sync: SyncMode) -> Store {
    Store::open(StoreConfig {
        wal_dir: dir.to_path_buf(),
        sync,
        ..StoreConfig::default()
    })
    .expect("open")
}

// ------------------------------------------------------------------------------------------------
// Benchmarks
// ------------------------------------------------------------------------------------------------

/// Sequential create throughput. Fsync-per-append dominates the default
/// mode, so both durability policies are measured.
fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");
    group.throughput(Throughput::Elements(1));

    group.bench_function("sync_always", |b| {
        let dir = TempDir::new().unwrap();
        let store = open_store(dir.path(), SyncMode::Always);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            store
                .create("bench", &make_key(i), black_box(VALUE_128B))
                .unwrap();
        });
    });

    group.bench_function("sync_never", |b| {
        let dir = TempDir::new().unwrap();
        let store = open_store(dir.path(), SyncMode::Never);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            store
                .create("bench", &make_key(i), black_box(VALUE_128B))
                .unwrap();
        });
    });

    group.finish();
}

/// Random point reads against a preloaded table. Reads never touch the
/// WAL, so sync mode is irrelevant here.
fn bench_read(c: &mut Criterion) {
    const PRELOAD: u64 = 10_000;

    let dir = TempDir::new().unwrap();
    let store = open_store(dir.path(), SyncMode::Never);
    for i in 0..PRELOAD {
        store.create("bench", &make_key(i), VALUE_128B).unwrap();
    }

    let mut group = c.benchmark_group("read");
    group.throughput(Throughput::Elements(1));
    group.bench_function("random_hit", |b| {
        let mut rng = rand::rng();
        b.iter(|| {
            let key = make_key(rng.random_range(0..PRELOAD));
            black_box(store.read("bench", &key).unwrap());
        });
    });
    group.bench_function("random_miss", |b| {
        let mut rng = rand::rng();
        b.iter(|| {
            let key = make_key(PRELOAD + rng.random_range(0..PRELOAD));
            let _ = black_box(store.read("bench", &key));
        });
    });
    group.finish();
}

/// Updates of random existing keys.
fn bench_update(c: &mut Criterion) {
    const PRELOAD: u64 = 1_000;

    let dir = TempDir::new().unwrap();
    let store = open_store(dir.path(), SyncMode::Never);
    for i in 0..PRELOAD {
        store.create("bench", &make_key(i), VALUE_128B).unwrap();
    }

    let mut group = c.benchmark_group("update");
    group.throughput(Throughput::Elements(1));
    group.bench_function("random_existing", |b| {
        let mut rng = rand::rng();
        b.iter(|| {
            let key = make_key(rng.random_range(0..PRELOAD));
            store.update("bench", &key, black_box("updated-value")).unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_create, bench_read, bench_update);
criterion_main!(benches);
