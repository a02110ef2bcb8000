use std::hint::black_box;
use std::sync::Arc;
use std::thread;

use criterion::{Criterion, criterion_group, criterion_main};

use gimbal_tracker::telemetry::TelemetryRecord;
use gimbal_tracker::tracker::slot::TelemetrySlot;

fn slot_bench(c: &mut Criterion) {
    let record = TelemetryRecord {
        accel: [0.1, -9.81, 0.2],
        gyro: [3.0, 0.0, -7.5],
    };

    let slot = TelemetrySlot::new();
    c.bench_function("slot_publish", |b| {
        b.iter(|| slot.publish(black_box(record)))
    });

    c.bench_function("slot_snapshot", |b| b.iter(|| black_box(slot.snapshot())));

    // Snapshot latency while a writer hammers the slot from another thread:
    // the reader path must stay wait-free under contention.
    c.bench_function("slot_snapshot_contended", |b| {
        let slot = Arc::new(TelemetrySlot::new());
        let writer_slot = slot.clone();
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_flag = stop.clone();
        let writer = thread::spawn(move || {
            while !stop_flag.load(std::sync::atomic::Ordering::Relaxed) {
                writer_slot.publish(record);
            }
        });

        b.iter(|| black_box(slot.snapshot()));

        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        let _ = writer.join();
    });
}

criterion_group!(benches, slot_bench);
criterion_main!(benches);
