//! Concurrent registry of live allocations.
//!
//! The registry is split into a power-of-two number of shards, each a
//! `HashMap` behind its own mutex. Single-address operations lock exactly
//! one shard. [`AllocationStorage::freeze`] locks every shard in index
//! order, which gives snapshot readers a consistent view while stalling
//! concurrent allocators only for the duration of the copy.
//!
//! Every path that may allocate while a shard is held runs inside an
//! untracked scope, so the maps' own growth never re-enters the hook.

use std::collections::HashMap;

use crate::api::record::AllocationRecord;
use crate::core::tls::UntrackedScope;
use crate::sync::atomics::AtomicCounter;
use crate::sync::mutex::{Mutex, MutexGuard};

/// One registry shard, padded to its own cache line.
#[repr(align(64))]
struct Shard {
    records: Mutex<HashMap<usize, AllocationRecord>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

/// Concurrent mapping from a live address to its [`AllocationRecord`].
///
/// Read-only outside the crate: records are only added and removed by the
/// owning [`MemoryTracker`](crate::MemoryTracker), together with its
/// counters.
///
/// ```compile_fail
/// let tracker = memscene::MemoryTracker::with_defaults();
/// tracker.storage().free_pointer(0x1000);
/// ```
pub struct AllocationStorage {
    shards: Box<[Shard]>,
    shift: u32,
    duplicates: AtomicCounter,
}

impl AllocationStorage {
    /// Create a registry with `shards` shards (rounded up to a power of two).
    pub fn new(shards: usize) -> Self {
        let count = shards.clamp(1, 4096).next_power_of_two();
        Self {
            shards: (0..count).map(|_| Shard::new()).collect(),
            shift: 64 - count.trailing_zeros(),
            duplicates: AtomicCounter::new(0),
        }
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    fn shard_for(&self, address: usize) -> &Shard {
        if self.shards.len() == 1 {
            return &self.shards[0];
        }
        // Fibonacci hashing; allocator addresses share their low bits.
        let hash = (address as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        &self.shards[(hash >> self.shift) as usize]
    }

    /// Insert a record.
    ///
    /// If the address is already live the new record replaces the stale one,
    /// the condition is counted as an anomaly and the stale record returned.
    #[cfg(test)]
    pub(crate) fn add_pointer(&self, record: AllocationRecord) -> Option<AllocationRecord> {
        self.add_pointer_observed(record, |_| {})
    }

    /// [`add_pointer`](Self::add_pointer), running `observe` while the shard
    /// is still locked so counter updates stay consistent with snapshots.
    pub(crate) fn add_pointer_observed<F>(
        &self,
        record: AllocationRecord,
        observe: F,
    ) -> Option<AllocationRecord>
    where
        F: FnOnce(Option<&AllocationRecord>),
    {
        // Map growth below must not re-enter the hook while the shard is held.
        let _untracked = UntrackedScope::new();
        let mut records = self.shard_for(record.address).records.lock();
        let previous = records.insert(record.address, record);
        if previous.is_some() {
            self.duplicates.increment();
        }
        observe(previous.as_ref());
        previous
    }

    /// Remove the record for `address`. No-op if it is not live.
    pub(crate) fn free_pointer(&self, address: usize) -> Option<AllocationRecord> {
        self.free_pointer_observed(address, |_| {})
    }

    /// [`free_pointer`](Self::free_pointer), running `observe` with the
    /// removed record while the shard is still locked.
    pub(crate) fn free_pointer_observed<F>(
        &self,
        address: usize,
        observe: F,
    ) -> Option<AllocationRecord>
    where
        F: FnOnce(&AllocationRecord),
    {
        if address == 0 {
            return None;
        }
        let mut records = self.shard_for(address).records.lock();
        let removed = records.remove(&address);
        if let Some(ref record) = removed {
            observe(record);
        }
        removed
    }

    /// Whether a live record exists for `address`. Always `false` for null.
    pub fn is_pointer_stored(&self, address: usize) -> bool {
        if address == 0 {
            return false;
        }
        self.shard_for(address).records.lock().contains_key(&address)
    }

    /// The live record for `address`, if any.
    pub fn get_pointer_data(&self, address: usize) -> Option<AllocationRecord> {
        if address == 0 {
            return None;
        }
        self.shard_for(address).records.lock().get(&address).copied()
    }

    /// Number of live records. Not synchronized across shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.records.lock().len()).sum()
    }

    /// Whether no records are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of duplicate-address insertions seen.
    pub fn duplicate_count(&self) -> u64 {
        self.duplicates.get()
    }

    /// Lock every shard and hand `f` a frozen view of the registry.
    ///
    /// Shards are locked in index order and released together when `f`
    /// returns. `f` must not call back into this registry.
    pub fn freeze<R>(&self, f: impl FnOnce(&FrozenStorage<'_>) -> R) -> R {
        let _untracked = UntrackedScope::new();
        let mut guards: Vec<MutexGuard<'_, HashMap<usize, AllocationRecord>>> =
            Vec::with_capacity(self.shards.len());
        for shard in self.shards.iter() {
            guards.push(shard.records.lock());
        }
        let frozen = FrozenStorage { guards };
        f(&frozen)
    }

    /// Copy every live record, ordered by address.
    pub fn snapshot(&self) -> Vec<AllocationRecord> {
        self.freeze(|frozen| frozen.to_sorted_vec())
    }
}

impl Default for AllocationStorage {
    fn default() -> Self {
        Self::new(64)
    }
}

/// A registry whose shards are all locked.
pub struct FrozenStorage<'a> {
    guards: Vec<MutexGuard<'a, HashMap<usize, AllocationRecord>>>,
}

impl<'a> FrozenStorage<'a> {
    /// Number of live records.
    pub fn len(&self) -> usize {
        self.guards.iter().map(|g| g.len()).sum()
    }

    /// Whether no records are live.
    pub fn is_empty(&self) -> bool {
        self.guards.iter().all(|g| g.is_empty())
    }

    /// Iterate over every live record in shard order.
    pub fn iter(&self) -> impl Iterator<Item = &AllocationRecord> + '_ {
        self.guards.iter().flat_map(|g| g.values())
    }

    /// Sum of live record sizes.
    pub fn live_bytes(&self) -> u64 {
        self.iter().map(|r| r.size as u64).sum()
    }

    /// Copy every live record, ordered by address.
    pub fn to_sorted_vec(&self) -> Vec<AllocationRecord> {
        let mut records = Vec::with_capacity(self.len());
        records.extend(self.iter().copied());
        records.sort_unstable_by_key(|r| r.address);
        records
    }
}
