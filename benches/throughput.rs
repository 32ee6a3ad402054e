//! Keyspace throughput benchmarks.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flarekv::storage::Keyspace;
use std::sync::Arc;

fn bench_strings(c: &mut Criterion) {
    let keyspace = Arc::new(Keyspace::new());

    let mut group = c.benchmark_group("strings");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 10_000));
            keyspace.set(key, Bytes::from_static(b"value"), None);
            i += 1;
        });
    });

    for i in 0..10_000u64 {
        keyspace.set(
            Bytes::from(format!("key:{}", i)),
            Bytes::from_static(b"value"),
            None,
        );
    }
    group.bench_function("get", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 10_000));
            black_box(keyspace.get(&key).unwrap());
            i += 1;
        });
    });

    group.bench_function("incr", |b| {
        let key = Bytes::from_static(b"counter");
        b.iter(|| {
            black_box(keyspace.incr_by(&key, 1).unwrap());
        });
    });

    group.finish();
}

fn bench_lists(c: &mut Criterion) {
    let keyspace = Arc::new(Keyspace::new());

    let mut group = c.benchmark_group("lists");
    group.throughput(Throughput::Elements(1));

    group.bench_function("rpush_lpop", |b| {
        let key = Bytes::from_static(b"queue");
        b.iter(|| {
            keyspace
                .list_push(key.clone(), vec![Bytes::from_static(b"job")], false)
                .unwrap();
            black_box(keyspace.list_pop(&key, true).unwrap());
        });
    });

    group.finish();
}

fn bench_snapshot_capture(c: &mut Criterion) {
    let keyspace = Arc::new(Keyspace::new());
    for i in 0..10_000u64 {
        keyspace.set(
            Bytes::from(format!("key:{}", i)),
            Bytes::from(format!("value:{}", i)),
            None,
        );
    }

    c.bench_function("snapshot_capture_10k", |b| {
        b.iter(|| black_box(keyspace.create_snapshot()));
    });
}

criterion_group!(benches, bench_strings, bench_lists, bench_snapshot_capture);
criterion_main!(benches);
