//! Per-allocation metadata.

use crate::api::region::{AllocatorType, Region};

/// Metadata describing one live heap allocation.
///
/// Records are plain `Copy` values: the registry always stores and hands out
/// whole records, so no reader can observe a partially built one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationRecord {
    /// Address of the allocation. Unique while the allocation is alive.
    pub address: usize,

    /// Requested size in bytes.
    pub size: usize,

    /// Logical memory category.
    pub region: Region,

    /// Allocation strategy that produced the block.
    pub allocator_type: AllocatorType,

    /// Opaque identifier of the allocating thread.
    pub thread_id_hash: u64,

    /// Microseconds since the tracker's clock epoch.
    pub timestamp: u64,

    /// Index into a stack-trace table, if one was captured.
    ///
    /// Inside a live tracker this refers to the tracker's stack table; inside
    /// a [`MetricsSeries`](crate::MetricsSeries) it refers to the series'
    /// own string table.
    pub stacktrace: Option<u32>,
}

impl AllocationRecord {
    /// Create a record without a stack trace.
    pub fn new(
        address: usize,
        size: usize,
        region: Region,
        allocator_type: AllocatorType,
        thread_id_hash: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            address,
            size,
            region,
            allocator_type,
            thread_id_hash,
            timestamp,
            stacktrace: None,
        }
    }

    /// Builder: attach a stack-trace index.
    pub fn with_stacktrace(mut self, index: u32) -> Self {
        self.stacktrace = Some(index);
        self
    }
}
