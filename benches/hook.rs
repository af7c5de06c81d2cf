//! Benchmarks for the allocation hook and snapshotting.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use memscene::{
    AllocatorType, MemoryTracker, ProfileSerializer, Region, SceneMetricsAccumulator,
    TrackerConfig,
};
use std::alloc::Layout;
use std::sync::Arc;

fn bench_hook(c: &mut Criterion) {
    let tracker = MemoryTracker::new(TrackerConfig::minimal().with_registry_shards(64));

    let mut group = c.benchmark_group("hook");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("allocate_free_1000x", |b| {
        b.iter(|| {
            for i in 1..=1000usize {
                tracker.on_allocate(black_box(i << 4), 64, Region::Heap, AllocatorType::Default);
            }
            for i in 1..=1000usize {
                tracker.on_deallocate(black_box(i << 4));
            }
        })
    });

    group.bench_function("untracked_free_1000x", |b| {
        b.iter(|| {
            for i in 1..=1000usize {
                tracker.on_deallocate(black_box(0xDEAD_0000 + (i << 4)));
            }
        })
    });

    let layout = Layout::from_size_align(64, 8).unwrap();
    group.bench_function("tracked_alloc_dealloc_1000x", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                let ptr = tracker
                    .tracked_alloc(layout, Region::Graphics, AllocatorType::Pool)
                    .unwrap();
                unsafe { tracker.tracked_dealloc(black_box(ptr), layout) };
            }
        })
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for live in [1_000usize, 10_000, 100_000] {
        let tracker = Arc::new(MemoryTracker::new(TrackerConfig::minimal()));
        for i in 1..=live {
            tracker.on_allocate(i << 4, 32, Region::Assets, AllocatorType::Default);
        }
        let scenes = SceneMetricsAccumulator::new(Arc::clone(&tracker));

        group.throughput(Throughput::Elements(live as u64));
        group.bench_with_input(BenchmarkId::new("capture", live), &live, |b, _| {
            b.iter(|| black_box(tracker.capture()))
        });
        group.bench_with_input(BenchmarkId::new("scene_round_trip", live), &live, |b, _| {
            b.iter(|| {
                scenes.begin_scene("bench").unwrap();
                scenes.take_snapshot().unwrap();
                let series = scenes.end_scene().unwrap();
                let bytes = ProfileSerializer::to_bytes(&series).unwrap();
                black_box(ProfileSerializer::from_bytes(&bytes).unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hook, bench_snapshot);
criterion_main!(benches);
