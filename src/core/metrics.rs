//! Process-wide aggregate counters.
//!
//! Only the hook (through [`MemoryTracker`](crate::MemoryTracker)) and the
//! frame-boundary reset write here; everything else reads a
//! [`MetricsCounters`] copy.

use crate::api::stats::MetricsCounters;
use crate::sync::atomics::{AtomicCounter, AtomicGauge};

/// Lock-free counters derived from hook events.
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    total_allocations: AtomicCounter,
    total_frees: AtomicCounter,
    frame_allocations: AtomicCounter,
    frame_frees: AtomicCounter,
    live_bytes: AtomicGauge,
    peak_bytes: AtomicGauge,
    bytes_allocated: AtomicCounter,
    bytes_freed: AtomicCounter,
    duplicate_addresses: AtomicCounter,
    untracked_frees: AtomicCounter,
    frame_index: AtomicCounter,
}

impl MemoryMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tracked allocation.
    #[inline]
    pub(crate) fn record_alloc(&self, size: usize) {
        let size = size as u64;
        self.total_allocations.increment_release();
        self.frame_allocations.increment();
        self.bytes_allocated.add(size);
        let live = self.live_bytes.add(size);
        self.peak_bytes.update_max(live);
    }

    /// Record a free of a tracked allocation.
    #[inline]
    pub(crate) fn record_free(&self, size: usize) {
        let size = size as u64;
        self.total_frees.increment_release();
        self.frame_frees.increment();
        self.bytes_freed.add(size);
        self.live_bytes.sub(size);
    }

    /// Record that a live address was allocated again.
    #[inline]
    pub(crate) fn record_duplicate(&self) {
        self.duplicate_addresses.increment();
    }

    /// Record a free of an address with no live record.
    #[inline]
    pub(crate) fn record_untracked_free(&self) {
        self.untracked_frees.increment();
    }

    /// Clear the per-frame window without touching lifetime totals.
    ///
    /// Called once per update tick by the frame loop.
    pub fn reset_frame_counters(&self) {
        self.frame_allocations.reset();
        self.frame_frees.reset();
        self.frame_index.increment();
    }

    /// Allocations recorded since creation.
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations.get_acquire()
    }

    /// Frees recorded since creation.
    pub fn total_frees(&self) -> u64 {
        self.total_frees.get_acquire()
    }

    /// `total_allocations - total_frees`.
    ///
    /// Frees are loaded first: a free is always counted after its
    /// allocation, so the difference never underflows.
    pub fn alive_count(&self) -> u64 {
        let frees = self.total_frees.get_acquire();
        let allocations = self.total_allocations.get_acquire();
        allocations.saturating_sub(frees)
    }

    /// Allocations recorded in the current frame window.
    pub fn frame_allocations(&self) -> u64 {
        self.frame_allocations.get()
    }

    /// Frame allocations not yet balanced by frees in the same window.
    pub fn frame_alive(&self) -> u64 {
        self.frame_allocations
            .get()
            .saturating_sub(self.frame_frees.get())
    }

    /// Bytes currently held by tracked allocations.
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.get()
    }

    /// High-water mark of live bytes.
    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes.get()
    }

    /// Frame boundaries seen so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index.get()
    }

    /// Copy every counter.
    pub fn counters(&self) -> MetricsCounters {
        let total_frees = self.total_frees.get_acquire();
        let total_allocations = self.total_allocations.get_acquire();
        MetricsCounters {
            total_allocations,
            total_frees,
            alive_count: total_allocations.saturating_sub(total_frees),
            frame_allocations: self.frame_allocations.get(),
            frame_frees: self.frame_frees.get(),
            live_bytes: self.live_bytes.get(),
            peak_bytes: self.peak_bytes.get(),
            bytes_allocated_lifetime: self.bytes_allocated.get(),
            bytes_freed_lifetime: self.bytes_freed.get(),
            duplicate_addresses: self.duplicate_addresses.get(),
            untracked_frees: self.untracked_frees.get(),
            frame_index: self.frame_index.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alive_is_difference() {
        let metrics = MemoryMetrics::new();
        metrics.record_alloc(16);
        metrics.record_alloc(32);
        metrics.record_free(16);
        assert_eq!(metrics.alive_count(), 1);
        let c = metrics.counters();
        assert_eq!(c.alive_count, c.total_allocations - c.total_frees);
        assert_eq!(c.live_bytes, 32);
        assert_eq!(c.peak_bytes, 48);
    }

    #[test]
    fn test_frame_reset_keeps_totals() {
        let metrics = MemoryMetrics::new();
        metrics.record_alloc(8);
        metrics.record_alloc(8);
        metrics.record_free(8);
        assert_eq!(metrics.frame_alive(), 1);

        metrics.reset_frame_counters();

        let c = metrics.counters();
        assert_eq!(c.frame_allocations, 0);
        assert_eq!(c.frame_frees, 0);
        assert_eq!(c.total_allocations, 2);
        assert_eq!(c.total_frees, 1);
        assert_eq!(c.frame_index, 1);
    }
}
