//! Thread-local state used by the allocation hook.
//!
//! Everything here is const-initialized `Cell` data without destructors, so
//! it is safe to touch from inside a global allocator, including while the
//! thread is being torn down (accesses after destruction fall back to
//! defaults instead of panicking).

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::api::region::{AllocatorType, Region};

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
    static THREAD_HASH: Cell<u64> = const { Cell::new(0) };
    static SCOPE: Cell<(Region, AllocatorType)> =
        const { Cell::new((Region::Heap, AllocatorType::Default)) };
}

/// Source of per-thread identities. Starts at 1 so that 0 means "unassigned".
static NEXT_THREAD_SEQ: AtomicU64 = AtomicU64::new(1);

/// Re-entrancy guard for the allocation hook.
///
/// Only the outermost entry on a thread obtains a guard; any allocation
/// performed while it is held is not tracked.
pub(crate) struct ReentrancyGuard(());

impl ReentrancyGuard {
    /// Enter the hook. Returns `None` if this thread is already inside it
    /// (or its thread-local storage is gone).
    #[inline]
    pub(crate) fn enter() -> Option<Self> {
        IN_HOOK
            .try_with(|flag| {
                if flag.get() {
                    false
                } else {
                    flag.set(true);
                    true
                }
            })
            .unwrap_or(false)
            .then_some(Self(()))
    }
}

impl Drop for ReentrancyGuard {
    #[inline]
    fn drop(&mut self) {
        let _ = IN_HOOK.try_with(|flag| flag.set(false));
    }
}

/// Marks a region of tracker-internal work: allocations made by this thread
/// while the scope is alive are invisible to the hook.
///
/// Unlike [`ReentrancyGuard`] this nests, restoring the previous state on
/// drop.
pub(crate) struct UntrackedScope {
    previous: bool,
}

impl UntrackedScope {
    pub(crate) fn new() -> Self {
        let previous = IN_HOOK.try_with(|flag| flag.replace(true)).unwrap_or(true);
        Self { previous }
    }
}

impl Drop for UntrackedScope {
    fn drop(&mut self) {
        let previous = self.previous;
        let _ = IN_HOOK.try_with(|flag| flag.set(previous));
    }
}

/// Whether allocations on this thread are currently bypassing the hook.
#[cfg(test)]
pub(crate) fn is_untracked() -> bool {
    IN_HOOK.try_with(Cell::get).unwrap_or(true)
}

/// Opaque, stable identifier of the calling thread.
///
/// Assigned lazily from a process-wide sequence and mixed so values spread
/// over the whole `u64` range. Never zero.
pub fn thread_id_hash() -> u64 {
    THREAD_HASH
        .try_with(|cell| {
            let cached = cell.get();
            if cached != 0 {
                return cached;
            }
            let seq = NEXT_THREAD_SEQ.fetch_add(1, Ordering::Relaxed);
            let hash = mix64(seq).max(1);
            cell.set(hash);
            hash
        })
        .unwrap_or(0)
}

/// Current region tags for this thread.
pub(crate) fn current_scope() -> (Region, AllocatorType) {
    SCOPE
        .try_with(Cell::get)
        .unwrap_or((Region::Unknown, AllocatorType::Default))
}

/// Replace the region tags for this thread, returning the previous ones.
pub(crate) fn replace_scope(scope: (Region, AllocatorType)) -> (Region, AllocatorType) {
    SCOPE
        .try_with(|cell| cell.replace(scope))
        .unwrap_or((Region::Unknown, AllocatorType::Default))
}

/// splitmix64 finalizer.
#[inline]
pub(crate) fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentrancy_guard_blocks_nested_entry() {
        let outer = ReentrancyGuard::enter();
        assert!(outer.is_some());
        assert!(ReentrancyGuard::enter().is_none());
        drop(outer);
        assert!(ReentrancyGuard::enter().is_some());
    }

    #[test]
    fn test_untracked_scope_nests() {
        assert!(!is_untracked());
        {
            let _a = UntrackedScope::new();
            {
                let _b = UntrackedScope::new();
                assert!(is_untracked());
            }
            assert!(is_untracked());
            assert!(ReentrancyGuard::enter().is_none());
        }
        assert!(!is_untracked());
    }

    #[test]
    fn test_thread_hash_is_stable_and_distinct() {
        let here = thread_id_hash();
        assert_ne!(here, 0);
        assert_eq!(here, thread_id_hash());
        let other = std::thread::spawn(thread_id_hash).join().unwrap();
        assert_ne!(here, other);
    }
}
