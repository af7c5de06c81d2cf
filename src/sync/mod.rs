//! Synchronization primitives.
//!
//! Provides thin wrappers over std or parking_lot locks, plus the atomic
//! counters used on the allocation hot path.

pub(crate) mod atomics;
pub(crate) mod mutex;
