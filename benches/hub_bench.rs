//! Benchmarks for the ingest hot path
//!
//! Run with: cargo bench

use chrono::DateTime;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ews::reading::{decode_payload, Reading, SensorPayload};
use ews::storage::{ReadingStore, SqliteStore};
use ews::websocket::subscriber_channel;
use std::sync::Arc;
use tempfile::tempdir;

fn sample_reading(timestamp_ms: i64) -> Reading {
    Reading {
        timestamp: DateTime::from_timestamp_millis(timestamp_ms).unwrap(),
        temperature: 28.5,
        humidity: 77.0,
        pressure: 1008.2,
        altitude: 41.5,
        co2: 412.0,
        distance: 120.4,
        wind_speed: 3.2,
        wind_direction: 270.0,
        rainfall: 0.8,
        voltage: 4.9,
        bus_voltage: 5.02,
        current: 131.5,
    }
}

fn bench_decode(c: &mut Criterion) {
    let payload =
        serde_json::to_vec(&SensorPayload::from_reading(&sample_reading(1_700_000_000_000)))
            .unwrap();

    c.bench_function("decode_payload", |b| {
        b.iter(|| decode_payload(black_box(&payload)).unwrap())
    });
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");
    let reading = Arc::new(sample_reading(0));

    for subscribers in [10, 100, 1000] {
        let (mut handles, mut queues): (Vec<_>, Vec<_>) =
            (0..subscribers).map(|_| subscriber_channel(64)).unzip();

        group.throughput(Throughput::Elements(subscribers as u64));

        group.bench_function(format!("offer_{}", subscribers), |b| {
            b.iter(|| {
                for handle in handles.iter_mut() {
                    black_box(handle.offer(&reading));
                }
                for queue in queues.iter_mut() {
                    queue.try_recv();
                }
            })
        });
    }

    group.finish();
}

fn bench_store_write(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("bench.db")).unwrap();
    let reading = sample_reading(1_700_000_000_000);

    c.bench_function("store_write", |b| {
        b.iter(|| runtime.block_on(store.write(black_box(&reading))).unwrap())
    });
}

criterion_group!(benches, bench_decode, bench_fanout, bench_store_write);
criterion_main!(benches);
