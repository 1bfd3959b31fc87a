//! Throughput Benchmark for DuraKV
//!
//! Measures the store under various workloads, plus request parsing and
//! snapshot writes.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use durakv::commands::CommandHandler;
use durakv::protocol::LineParser;
use durakv::storage::{Store, StoreConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn populated_store(n: usize) -> Store {
    let store = Store::new();
    for i in 0..n {
        store.set(format!("key:{}", i), format!("value:{}", i));
    }
    store
}

/// Benchmark set operations
fn bench_set(c: &mut Criterion) {
    let store = Store::new();

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store.set(format!("key:{}", i), "small_value");
            i += 1;
        });
    });

    group.bench_function("set_1kb", |b| {
        let mut i = 0u64;
        let value = "x".repeat(1024);
        b.iter(|| {
            store.set(format!("key:{}", i), value.clone());
            i += 1;
        });
    });

    group.bench_function("set_integer", |b| {
        let mut i = 0i64;
        b.iter(|| {
            store.set(format!("n:{}", i % 1000), i);
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark get operations
fn bench_get(c: &mut Criterion) {
    let store = populated_store(100_000);

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.get(&format!("key:{}", i % 100_000)));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.get(&format!("missing:{}", i)));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark mixed workload (80% reads, 20% writes)
fn bench_mixed(c: &mut Criterion) {
    let store = populated_store(10_000);

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                store.set(format!("new:{}", i), "value");
            } else {
                black_box(store.get(&format!("key:{}", i % 10_000)));
            }
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark append on short and growing strings
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(1));

    group.bench_function("append_rotating_keys", |b| {
        let store = populated_store(1_000);
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 1_000);
            black_box(store.append(&key, "x").ok());
            i += 1;
        });
    });

    group.bench_function("append_fresh_key", |b| {
        b.iter_batched(
            || {
                let store = Store::new();
                store.set("log", "");
                store
            },
            |store| {
                for _ in 0..100 {
                    black_box(store.append("log", "entry;").ok());
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmark concurrent access through the single store lock
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let store = Arc::new(Store::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            store.set(key.clone(), "value");
                            store.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(store.len());
        });
    });

    group.finish();
}

/// Benchmark expiry operations
fn bench_expiry(c: &mut Criterion) {
    let store = Store::new();

    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store.set_with_ttl(format!("ttl:{}", i), "value", Duration::from_secs(3600));
            i += 1;
        });
    });

    group.bench_function("expire_existing", |b| {
        for i in 0..10_000 {
            store.set(format!("expire:{}", i), "value");
        }

        let mut i = 0u64;
        b.iter(|| {
            store.expire(&format!("expire:{}", i % 10_000), Duration::from_secs(3600));
            i += 1;
        });
    });

    group.bench_function("sweep_10k_elapsed", |b| {
        b.iter_batched(
            || {
                let store = Store::new();
                for i in 0..10_000 {
                    store.set_with_ttl(format!("gone:{}", i), "v", Duration::ZERO);
                }
                store
            },
            |store| black_box(store.evict_expired()),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

/// Benchmark listing live keys
fn bench_keys(c: &mut Criterion) {
    let store = Store::new();
    for i in 0..1_000 {
        store.set(format!("user:{}", i), "user_data");
        store.set_with_ttl(
            format!("session:{}", i),
            "session_data",
            Duration::from_secs(3600),
        );
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_2k", |b| {
        b.iter(|| {
            black_box(store.keys());
        });
    });

    group.finish();
}

/// Benchmark request parsing and dispatch
fn bench_requests(c: &mut Criterion) {
    let parser = LineParser::new();
    let handler = CommandHandler::new(Arc::new(Store::new()));

    let mut group = c.benchmark_group("requests");
    group.throughput(Throughput::Elements(1));

    group.bench_function("parse_quoted_set", |b| {
        let line = b"set greeting \"hello world\" ex 60\n";
        b.iter(|| {
            black_box(parser.parse(line).ok());
        });
    });

    group.bench_function("execute_set_get", |b| {
        let set: Vec<String> = ["set", "k", "v"].iter().map(|s| s.to_string()).collect();
        let get: Vec<String> = ["get", "k"].iter().map(|s| s.to_string()).collect();
        b.iter(|| {
            black_box(handler.execute_args(&set));
            black_box(handler.execute_args(&get));
        });
    });

    group.finish();
}

/// Benchmark atomic snapshot writes
fn bench_snapshot(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(StoreConfig {
        snapshot_path: Some(dir.path().join("bench_snapshot.json")),
    });
    for i in 0..10_000 {
        store.set(format!("key:{}", i), format!("value:{}", i));
    }

    let mut group = c.benchmark_group("snapshot");
    group.sample_size(20);

    group.bench_function("save_10k_keys", |b| {
        b.iter(|| {
            store.save_snapshot().unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_append,
    bench_concurrent,
    bench_expiry,
    bench_keys,
    bench_requests,
    bench_snapshot
);
criterion_main!(benches);
