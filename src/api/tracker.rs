//! The tracking context: registry, counters and hook entry points.

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::config::TrackerConfig;
use crate::api::error::{MemoryError, Result};
use crate::api::record::AllocationRecord;
use crate::api::region::{AllocatorType, Region};
use crate::api::stats::MetricsCounters;
use crate::core::clock::Clock;
use crate::core::metrics::MemoryMetrics;
use crate::core::stacks::StackTable;
use crate::core::storage::AllocationStorage;
use crate::core::tls::{self, ReentrancyGuard, UntrackedScope};
use crate::diagnostics::{self, Anomaly, AnomalyKind, AnomalyLog};
use crate::sync::mutex::Mutex;

/// Consistent copy of the registry and counters at one instant.
#[derive(Debug, Clone)]
pub struct LiveCapture {
    /// Tracker clock reading when the registry was frozen.
    pub timestamp: u64,
    /// Counters read while the registry was frozen.
    pub counters: MetricsCounters,
    /// Every live record, ordered by address.
    pub records: Vec<AllocationRecord>,
}

/// Owns the allocation registry and the process-wide counters.
///
/// A tracker is an explicit context object: create one, share it (usually
/// through an `Arc`) with the frame loop and scene recorders, and optionally
/// install it into a [`TrackingAllocator`](crate::TrackingAllocator) to
/// observe every heap allocation in the process. Engine code that cannot go
/// through the global allocator can use [`tracked_alloc`](Self::tracked_alloc)
/// and [`tracked_dealloc`](Self::tracked_dealloc) directly.
pub struct MemoryTracker {
    config: TrackerConfig,
    clock: Clock,
    storage: AllocationStorage,
    metrics: MemoryMetrics,
    stacks: StackTable,
    anomalies: AnomalyLog,
    enabled: AtomicBool,
    /// Name of the scene being recorded against this tracker, if any.
    active_scene: Mutex<Option<String>>,
}

impl MemoryTracker {
    /// Create a new tracker with the given configuration.
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            storage: AllocationStorage::new(config.effective_shards()),
            metrics: MemoryMetrics::new(),
            stacks: StackTable::new(),
            anomalies: AnomalyLog::new(config.anomaly_log_capacity),
            clock: Clock::new(),
            enabled: AtomicBool::new(true),
            active_scene: Mutex::new(None),
            config,
        }
    }

    /// Create a tracker with [`TrackerConfig::default`].
    pub fn with_defaults() -> Self {
        Self::new(TrackerConfig::default())
    }

    /// Get the configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The allocation registry.
    pub fn storage(&self) -> &AllocationStorage {
        &self.storage
    }

    /// The aggregate counters.
    pub fn metrics(&self) -> &MemoryMetrics {
        &self.metrics
    }

    /// Copy of every counter.
    pub fn counters(&self) -> MetricsCounters {
        self.metrics.counters()
    }

    /// Recent anomalies.
    pub fn anomalies(&self) -> &AnomalyLog {
        &self.anomalies
    }

    /// Microseconds since this tracker was created.
    pub fn now_us(&self) -> u64 {
        self.clock.now_us()
    }

    /// Pause or resume recording of new allocations. Frees of already
    /// tracked addresses are always processed.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether new allocations are being recorded.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Name of the scene currently recording against this tracker.
    pub fn active_scene_name(&self) -> Option<String> {
        self.active_scene.lock().clone()
    }

    /// Claim the tracker for scene `name`. Only one scene records at a
    /// time, whichever accumulator starts it.
    pub(crate) fn claim_scene(&self, name: &str) -> Result<()> {
        let mut active = self.active_scene.lock();
        if let Some(current) = active.as_ref() {
            return Err(MemoryError::SceneAlreadyActive {
                active: current.clone(),
                requested: name.to_owned(),
            });
        }
        *active = Some(name.to_owned());
        Ok(())
    }

    pub(crate) fn release_scene(&self) {
        *self.active_scene.lock() = None;
    }

    /// Frame-boundary tick: clear the per-frame window.
    pub fn reset_frame_counters(&self) {
        self.metrics.reset_frame_counters();
    }

    /// Whether `address` currently has a live record.
    pub fn is_pointer_stored(&self, address: usize) -> bool {
        self.storage.is_pointer_stored(address)
    }

    /// The live record for `address`, if any.
    pub fn get_pointer_data(&self, address: usize) -> Option<AllocationRecord> {
        self.storage.get_pointer_data(address)
    }

    /// Observe an allocation.
    ///
    /// Best effort: null addresses, calls made while this thread is already
    /// inside the hook, and calls while disabled are ignored.
    pub fn on_allocate(
        &self,
        address: usize,
        size: usize,
        region: Region,
        allocator_type: AllocatorType,
    ) {
        if address == 0 || !self.is_enabled() {
            return;
        }
        let Some(_guard) = ReentrancyGuard::enter() else {
            return;
        };
        self.record_allocation(address, size, region, allocator_type, None);
    }

    /// Observe a deallocation. Untracked addresses are ignored.
    pub fn on_deallocate(&self, address: usize) {
        if address == 0 {
            return;
        }
        let Some(_guard) = ReentrancyGuard::enter() else {
            return;
        };
        self.remove_allocation(address);
    }

    /// Allocate through the system allocator and record the block.
    ///
    /// A failed allocation is returned as
    /// [`MemoryError::AllocationFailure`] and nothing is recorded.
    /// Zero-sized layouts cannot be served by the system allocator and are
    /// reported the same way.
    pub fn tracked_alloc(
        &self,
        layout: Layout,
        region: Region,
        allocator_type: AllocatorType,
    ) -> Result<NonNull<u8>> {
        let failure = MemoryError::AllocationFailure {
            size: layout.size(),
            align: layout.align(),
        };
        if layout.size() == 0 {
            return Err(failure);
        }

        // Safety: layout has a non-zero size.
        let ptr = unsafe { System.alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or(failure)?;
        self.on_allocate(ptr.as_ptr() as usize, layout.size(), region, allocator_type);
        Ok(ptr)
    }

    /// Free a block obtained from [`tracked_alloc`](Self::tracked_alloc).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `tracked_alloc` on this tracker with
    /// the same `layout`, and must not be used afterwards.
    pub unsafe fn tracked_dealloc(&self, ptr: NonNull<u8>, layout: Layout) {
        // Untrack before freeing so a concurrent reuse of the address is
        // never removed by mistake.
        self.on_deallocate(ptr.as_ptr() as usize);
        System.dealloc(ptr.as_ptr(), layout);
    }

    /// Take the record for `address` out of the registry ahead of a
    /// reallocation. Counters are left alone until the outcome is known.
    pub(crate) fn detach(&self, address: usize) -> Option<AllocationRecord> {
        if address == 0 {
            return None;
        }
        let _guard = ReentrancyGuard::enter()?;
        self.storage.free_pointer(address)
    }

    /// Record the block produced by a successful reallocation of
    /// `old_address`. The detached block is accounted as freed and the new
    /// one as allocated, keeping the old tags (or the thread's current scope
    /// if the old block was not tracked).
    pub(crate) fn reattach(
        &self,
        previous: Option<AllocationRecord>,
        old_address: usize,
        address: usize,
        size: usize,
    ) {
        let (region, allocator_type) = match previous {
            Some(record) => (record.region, record.allocator_type),
            None => tls::current_scope(),
        };
        let guard = ReentrancyGuard::enter();
        if guard.is_none() || address == 0 || !self.is_enabled() {
            if let Some(record) = previous {
                self.metrics.record_free(record.size);
            }
            return;
        }
        if previous.is_none() && old_address != 0 {
            self.untracked_free(old_address);
        }
        self.record_allocation(address, size, region, allocator_type, previous.as_ref());
    }

    /// Put back a record taken by [`detach`](Self::detach) when the
    /// reallocation failed. The block never changed hands, so no counter
    /// moves.
    pub(crate) fn restore(&self, record: AllocationRecord) {
        let Some(_guard) = ReentrancyGuard::enter() else {
            return;
        };
        let metrics = &self.metrics;
        self.storage.add_pointer_observed(record, |previous| {
            if let Some(previous) = previous {
                metrics.record_duplicate();
                metrics.record_free(previous.size);
            }
        });
    }

    /// Freeze the registry and copy it together with the counters.
    ///
    /// Concurrent allocators stall only while the records are copied.
    pub fn capture(&self) -> LiveCapture {
        let _untracked = UntrackedScope::new();
        self.storage.freeze(|frozen| LiveCapture {
            timestamp: self.clock.now_us(),
            counters: self.metrics.counters(),
            records: frozen.to_sorted_vec(),
        })
    }

    /// Symbolized stack trace for a live record's stack identifier.
    pub fn resolve_stacktrace(&self, id: u32) -> Option<String> {
        self.stacks.resolve(id)
    }

    pub(crate) fn stacks(&self) -> &StackTable {
        &self.stacks
    }

    /// Number of distinct stack traces captured so far.
    pub fn stacktrace_count(&self) -> usize {
        self.stacks.len()
    }

    /// Insert a new record. `moved_from` is the detached record of a block
    /// this one replaces through reallocation; it is accounted as freed
    /// under the same shard lock.
    fn record_allocation(
        &self,
        address: usize,
        size: usize,
        region: Region,
        allocator_type: AllocatorType,
        moved_from: Option<&AllocationRecord>,
    ) {
        let timestamp = self.clock.now_us();
        let thread_id_hash = tls::thread_id_hash();
        let mut record = AllocationRecord::new(
            address,
            size,
            region,
            allocator_type,
            thread_id_hash,
            timestamp,
        );
        if self.config.capture_stacktraces {
            record.stacktrace = self.stacks.capture(self.config.max_stack_frames);
        }

        let metrics = &self.metrics;
        let stale = self.storage.add_pointer_observed(record, |previous| {
            if let Some(previous) = previous {
                // The stale block can no longer be freed through its record;
                // account for it as released so alive == allocs - frees holds.
                metrics.record_duplicate();
                metrics.record_free(previous.size);
            }
            if let Some(moved_from) = moved_from {
                metrics.record_free(moved_from.size);
            }
            metrics.record_alloc(size);
        });

        if let Some(stale) = stale {
            self.report(Anomaly {
                kind: AnomalyKind::DuplicateAllocationAddress,
                address,
                size: stale.size,
                thread_id_hash,
                timestamp,
            });
        }
    }

    fn remove_allocation(&self, address: usize) {
        let metrics = &self.metrics;
        let removed = self
            .storage
            .free_pointer_observed(address, |record| metrics.record_free(record.size));

        if removed.is_none() {
            self.untracked_free(address);
        }
    }

    fn untracked_free(&self, address: usize) {
        self.metrics.record_untracked_free();
        if diagnostics::is_verbose() {
            self.report(Anomaly {
                kind: AnomalyKind::UntrackedFree,
                address,
                size: 0,
                thread_id_hash: tls::thread_id_hash(),
                timestamp: self.clock.now_us(),
            });
        }
    }

    pub(crate) fn report(&self, anomaly: Anomaly) {
        self.anomalies.push(anomaly);
        diagnostics::emit(&anomaly);
    }
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for MemoryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTracker")
            .field("config", &self.config)
            .field("enabled", &self.is_enabled())
            .field("active_scene", &self.active_scene_name())
            .field("counters", &self.counters())
            .finish_non_exhaustive()
    }
}
