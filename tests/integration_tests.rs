//! Integration tests for memscene.

use memscene::{
    AllocatorType, MemoryError, MemoryTracker, ProfileSerializer, Region, SceneMetricsAccumulator,
    SceneMetricsExporter, SharedSceneMetrics, TrackerConfig,
};
use std::alloc::Layout;
use std::sync::Arc;
use std::thread;

fn tracker() -> Arc<MemoryTracker> {
    Arc::new(MemoryTracker::new(TrackerConfig::minimal()))
}

#[test]
fn test_allocate_then_free_address() {
    let tracker = tracker();
    let a = 0x7f00_0000_1000usize;

    tracker.on_allocate(a, 4, Region::Unknown, AllocatorType::Default);
    assert!(tracker.is_pointer_stored(a));

    tracker.on_deallocate(a);
    assert!(!tracker.is_pointer_stored(a));
}

#[test]
fn test_null_and_unknown_addresses_are_not_stored() {
    let tracker = tracker();
    assert!(!tracker.is_pointer_stored(0));
    assert!(!tracker.is_pointer_stored(0x1234_5678));
    assert!(tracker.get_pointer_data(0x1234_5678).is_none());
}

#[test]
fn test_begin_while_active_keeps_original_scene() {
    let scenes = SceneMetricsAccumulator::new(tracker());
    scenes.begin_scene("test").unwrap();
    assert!(scenes.is_scene_active());

    let err = scenes.begin_scene("new_test").unwrap_err();
    assert!(matches!(err, MemoryError::SceneAlreadyActive { .. }));
    assert!(scenes.is_scene_active());
    assert_eq!(scenes.active_scene().unwrap().name, "test");
}

#[test]
fn test_exporter_and_accumulator_share_one_scene() {
    let tracker = tracker();
    let scenes = SceneMetricsAccumulator::new(Arc::clone(&tracker));
    let exporter = SceneMetricsExporter::new(Arc::clone(&tracker));

    scenes.begin_scene("test").unwrap();
    let err = exporter.begin_scene("other").unwrap_err();
    assert!(matches!(err, MemoryError::SceneAlreadyActive { .. }));
    assert!(scenes.is_scene_active());
    assert!(!exporter.is_scene_active());
    assert!(exporter.end_scene().unwrap().is_none());
    assert_eq!(scenes.active_scene().unwrap().name, "test");
}

#[test]
fn test_end_on_fresh_accumulator() {
    let scenes = SceneMetricsAccumulator::new(tracker());
    assert!(scenes.end_scene().is_none());
    assert!(!scenes.is_scene_active());
}

#[test]
fn test_double_end_is_harmless() {
    let scenes = SceneMetricsAccumulator::new(tracker());
    scenes.begin_scene("test").unwrap();
    assert!(scenes.end_scene().is_some());
    assert!(scenes.end_scene().is_none());
    assert!(!scenes.is_scene_active());

    // A new scene can start afterwards.
    scenes.begin_scene("again").unwrap();
    assert_eq!(scenes.active_scene().unwrap().name, "again");
}

#[test]
fn test_three_snapshots_survive_export_and_import() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = tracker();
    let scenes = SceneMetricsAccumulator::new(Arc::clone(&tracker));

    scenes.begin_scene("round_trip").unwrap();
    tracker.on_allocate(0x1000, 16, Region::Graphics, AllocatorType::Pool);
    scenes.take_snapshot().unwrap();
    tracker.on_allocate(0x2000, 256, Region::Audio, AllocatorType::Default);
    scenes.take_snapshot().unwrap();
    tracker.on_deallocate(0x1000);
    scenes.take_snapshot().unwrap();
    let series = scenes.end_scene().unwrap();

    let path = dir.path().join("round_trip.memprof");
    ProfileSerializer::export(&series, &path).unwrap();
    let loaded = ProfileSerializer::import(&path).unwrap();

    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded, series);
    for (a, b) in loaded.snapshots().iter().zip(series.snapshots()) {
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.records, b.records);
    }
    assert!(loaded
        .snapshots()
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn test_alive_count_invariant_under_threads() {
    let tracker = tracker();
    let handles: Vec<_> = (0..4usize)
        .map(|t| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                let layout = Layout::from_size_align(32, 8).unwrap();
                let mut live = Vec::new();
                for i in 0..200 {
                    let region = Region::ALL[(t + i) % Region::ALL.len()];
                    live.push(
                        tracker
                            .tracked_alloc(layout, region, AllocatorType::Default)
                            .unwrap(),
                    );
                    if i % 4 == 3 {
                        let ptr = live.swap_remove(0);
                        unsafe { tracker.tracked_dealloc(ptr, layout) };
                    }
                    let c = tracker.counters();
                    assert_eq!(c.alive_count, c.total_allocations - c.total_frees);
                }
                for ptr in live {
                    unsafe { tracker.tracked_dealloc(ptr, layout) };
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let c = tracker.counters();
    assert_eq!(c.total_allocations, 800);
    assert_eq!(c.total_frees, 800);
    assert_eq!(c.live_bytes, 0);
    assert_eq!(c.peak_bytes % 32, 0);
    assert!(tracker.storage().is_empty());
}

#[test]
fn test_snapshots_while_threads_allocate() {
    let tracker = tracker();
    let scenes = Arc::new(SceneMetricsAccumulator::new(Arc::clone(&tracker)));
    scenes.begin_scene("busy").unwrap();

    let workers: Vec<_> = (0..3usize)
        .map(|t| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for i in 1..=500usize {
                    let addr = (t + 1) << 40 | i << 4;
                    tracker.on_allocate(addr, 16, Region::Physics, AllocatorType::Pool);
                    if i % 2 == 0 {
                        tracker.on_deallocate(addr);
                    }
                }
            })
        })
        .collect();

    for _ in 0..20 {
        scenes.take_snapshot().unwrap();
    }
    for w in workers {
        w.join().unwrap();
    }
    scenes.take_snapshot().unwrap();

    let series = scenes.end_scene().unwrap();
    for snapshot in series.snapshots() {
        assert_eq!(snapshot.counters.alive_count, snapshot.records.len() as u64);
        assert_eq!(snapshot.counters.live_bytes, snapshot.live_bytes());
    }
    let last = series.snapshots().last().unwrap();
    assert_eq!(last.records.len(), 3 * 250);
}

#[test]
fn test_exporter_publishes_and_panel_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Arc::new(MemoryTracker::new(
        TrackerConfig::minimal().with_snapshot_interval(1),
    ));
    let shared = Arc::new(SharedSceneMetrics::new());
    let exporter = SceneMetricsExporter::new(Arc::clone(&tracker))
        .with_output_dir(dir.path())
        .with_shared(Arc::clone(&shared));

    exporter.begin_scene("boss fight").unwrap();
    tracker.on_allocate(0xA0, 40, Region::Scripting, AllocatorType::Linear);
    exporter.on_frame();
    exporter.on_frame();
    let path = exporter.end_scene().unwrap().unwrap();
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("boss_fight_"));

    let live = shared.current();
    assert_eq!(live.scene_name(), "boss fight");
    assert_eq!(live.snapshot_count(), 2);

    shared.clear();
    let reloaded = shared.load_profile(&path).unwrap();
    assert_eq!(*reloaded, *live);
    assert_eq!(reloaded.allocation_times().len(), 2);
    assert_eq!(reloaded.allocation_data_over_time()[0].region, Region::Scripting);
}

#[test]
fn test_corrupted_profile_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = tracker();
    let scenes = SceneMetricsAccumulator::new(Arc::clone(&tracker));
    scenes.begin_scene("broken").unwrap();
    tracker.on_allocate(0x500, 8, Region::Heap, AllocatorType::Default);
    scenes.take_snapshot().unwrap();
    let series = scenes.end_scene().unwrap();

    let mut bytes = ProfileSerializer::to_bytes(&series).unwrap();
    bytes.truncate(bytes.len() - 3);
    let path = dir.path().join("broken.memprof");
    std::fs::write(&path, &bytes).unwrap();

    let shared = SharedSceneMetrics::new();
    let err = shared.load_profile(&path).unwrap_err();
    assert!(matches!(err, MemoryError::CorruptedProfile(_)));
    assert_eq!(shared.current().snapshot_count(), 0);
}
