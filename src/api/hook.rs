//! Process-wide allocation interception through `#[global_allocator]`.

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crate::api::tracker::MemoryTracker;
use crate::core::tls;

/// A `GlobalAlloc` wrapper that reports every allocation to a
/// [`MemoryTracker`].
///
/// The wrapper forwards to `A` and returns its result unchanged: a null
/// pointer from the inner allocator reaches the caller as-is and nothing is
/// recorded. Until [`install`](Self::install) is called it only forwards.
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use memscene::{MemoryTracker, TrackingAllocator};
///
/// #[global_allocator]
/// static ALLOC: TrackingAllocator = TrackingAllocator::system();
///
/// fn main() {
///     let tracker = Arc::new(MemoryTracker::with_defaults());
///     ALLOC.install(Arc::clone(&tracker));
/// }
/// ```
pub struct TrackingAllocator<A = System> {
    inner: A,
    tracker: AtomicPtr<MemoryTracker>,
}

impl TrackingAllocator<System> {
    /// Wrap the system allocator.
    pub const fn system() -> Self {
        Self::new(System)
    }
}

impl<A> TrackingAllocator<A> {
    /// Wrap `inner`. No tracker is attached yet.
    pub const fn new(inner: A) -> Self {
        Self {
            inner,
            tracker: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Attach `tracker`. Only the first call succeeds; later calls return
    /// `false` and leave the installed tracker in place.
    ///
    /// The installed tracker lives for the rest of the process.
    pub fn install(&self, tracker: Arc<MemoryTracker>) -> bool {
        let raw = Arc::into_raw(tracker) as *mut MemoryTracker;
        match self
            .tracker
            .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                log::info!("memscene: allocation hook installed");
                true
            }
            Err(_) => {
                // Safety: `raw` came from `Arc::into_raw` above and was not
                // published.
                drop(unsafe { Arc::from_raw(raw) });
                log::warn!("memscene: allocation hook already installed");
                false
            }
        }
    }

    /// The installed tracker, if any.
    #[inline]
    pub fn tracker(&self) -> Option<&MemoryTracker> {
        let raw = self.tracker.load(Ordering::Acquire);
        // Safety: a published pointer is never released.
        unsafe { raw.as_ref() }
    }

    /// Whether a tracker is attached.
    pub fn is_installed(&self) -> bool {
        !self.tracker.load(Ordering::Acquire).is_null()
    }
}

impl Default for TrackingAllocator<System> {
    fn default() -> Self {
        Self::system()
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            if let Some(tracker) = self.tracker() {
                let (region, allocator_type) = tls::current_scope();
                tracker.on_allocate(ptr as usize, layout.size(), region, allocator_type);
            }
        }
        ptr
    }

    #[inline]
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            if let Some(tracker) = self.tracker() {
                let (region, allocator_type) = tls::current_scope();
                tracker.on_allocate(ptr as usize, layout.size(), region, allocator_type);
            }
        }
        ptr
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // The address may be handed out again as soon as the inner allocator
        // has it back, so the record goes first.
        if let Some(tracker) = self.tracker() {
            tracker.on_deallocate(ptr as usize);
        }
        self.inner.dealloc(ptr, layout);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Some(tracker) = self.tracker() else {
            return self.inner.realloc(ptr, layout, new_size);
        };

        let previous = tracker.detach(ptr as usize);
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if new_ptr.is_null() {
            // The old block is still live.
            if let Some(record) = previous {
                tracker.restore(record);
            }
        } else {
            tracker.reattach(previous, ptr as usize, new_ptr as usize, new_size);
        }
        new_ptr
    }
}
