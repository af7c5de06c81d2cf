//! The tracker installed as the process allocator.

use memscene::{
    AllocatorType, MemoryTracker, Region, RegionScope, SceneMetricsAccumulator, TrackerConfig,
    TrackingAllocator,
};
use std::sync::{Arc, OnceLock};
use std::thread;

#[global_allocator]
static ALLOC: TrackingAllocator = TrackingAllocator::system();

fn tracker() -> &'static Arc<MemoryTracker> {
    static TRACKER: OnceLock<Arc<MemoryTracker>> = OnceLock::new();
    TRACKER.get_or_init(|| {
        let tracker = Arc::new(MemoryTracker::new(TrackerConfig::minimal()));
        ALLOC.install(Arc::clone(&tracker));
        tracker
    })
}

#[test]
fn test_box_is_tracked_with_scope_tags() {
    let tracker = tracker();
    let boxed = {
        let _scope = RegionScope::enter(Region::Assets, AllocatorType::Pool);
        Box::new([7u8; 100])
    };
    let addr = boxed.as_ptr() as usize;

    let record = tracker.get_pointer_data(addr).expect("box not tracked");
    assert_eq!(record.size, 100);
    assert_eq!(record.region, Region::Assets);
    assert_eq!(record.allocator_type, AllocatorType::Pool);
    assert_eq!(record.thread_id_hash, memscene::thread_id_hash());

    drop(boxed);
    assert!(!tracker.is_pointer_stored(addr));
}

#[test]
fn test_growing_vec_follows_reallocations() {
    let tracker = tracker();
    let mut v: Vec<u64> = Vec::with_capacity(1);
    for i in 0..10_000 {
        v.push(i);
    }
    let addr = v.as_ptr() as usize;
    let record = tracker.get_pointer_data(addr).expect("vec buffer not tracked");
    assert_eq!(record.size, v.capacity() * std::mem::size_of::<u64>());
    assert_eq!(record.region, Region::Heap);

    drop(v);
    assert!(!tracker.is_pointer_stored(addr));
}

#[test]
fn test_other_threads_are_tracked() {
    let tracker = tracker();
    let (addr, hash) = thread::spawn(|| {
        let s = String::from("allocated on a worker thread");
        let addr = s.as_ptr() as usize;
        // Leak so the record survives the thread.
        std::mem::forget(s);
        (addr, memscene::thread_id_hash())
    })
    .join()
    .unwrap();

    let record = tracker.get_pointer_data(addr).expect("worker allocation not tracked");
    assert_eq!(record.thread_id_hash, hash);
    assert_ne!(hash, memscene::thread_id_hash());
}

#[test]
fn test_scene_captures_process_allocations() {
    let tracker = tracker();
    let scenes = SceneMetricsAccumulator::new(Arc::clone(tracker));
    scenes.begin_scene("global").unwrap();

    let keep = memscene::with_region(Region::Networking, AllocatorType::Default, || {
        vec![0u8; 4096]
    });
    scenes.take_snapshot().unwrap();
    let series = scenes.end_scene().unwrap();

    let snapshot = &series.snapshots()[0];
    let addr = keep.as_ptr() as usize;
    let record = snapshot
        .records
        .iter()
        .find(|r| r.address == addr)
        .expect("buffer missing from snapshot");
    assert_eq!(record.region, Region::Networking);
    assert_eq!(record.size, 4096);

    // The tracker's own snapshot buffers are not recorded.
    assert!(!tracker.is_pointer_stored(snapshot.records.as_ptr() as usize));
    let c = snapshot.counters;
    assert_eq!(c.alive_count, c.total_allocations - c.total_frees);
}
