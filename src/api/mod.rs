//! Public API for memscene.
//!
//! Most users only need [`MemoryTracker`](tracker::MemoryTracker), the
//! region tags and, for process-wide coverage,
//! [`TrackingAllocator`](hook::TrackingAllocator).

pub mod config;
pub mod error;
pub mod hook;
pub mod record;
pub mod region;
pub mod stats;
pub mod tracker;
