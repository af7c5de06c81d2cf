//! Region and allocator-type tags attached to every allocation record.

use crate::core::tls;

/// Logical memory category of an allocation, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Region {
    /// No category was attached.
    Unknown = 0,
    /// General-purpose heap memory.
    Heap = 1,
    /// Rendering and GPU-upload staging memory.
    Graphics = 2,
    /// Audio buffers and mixer state.
    Audio = 3,
    /// Physics world and collision data.
    Physics = 4,
    /// Script runtime memory.
    Scripting = 5,
    /// Loaded asset data.
    Assets = 6,
    /// UI and debug overlay memory.
    Ui = 7,
    /// Network buffers.
    Networking = 8,
}

impl Region {
    /// Every region, in ordinal order.
    pub const ALL: [Region; 9] = [
        Region::Unknown,
        Region::Heap,
        Region::Graphics,
        Region::Audio,
        Region::Physics,
        Region::Scripting,
        Region::Assets,
        Region::Ui,
        Region::Networking,
    ];

    /// Ordinal used by the profile file format.
    #[inline]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Region::ordinal`].
    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Region::Unknown => "unknown",
            Region::Heap => "heap",
            Region::Graphics => "graphics",
            Region::Audio => "audio",
            Region::Physics => "physics",
            Region::Scripting => "scripting",
            Region::Assets => "assets",
            Region::Ui => "ui",
            Region::Networking => "networking",
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::Heap
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which allocation strategy produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AllocatorType {
    /// The process default allocator.
    Default = 0,
    /// A pooled / slab allocator.
    Pool = 1,
    /// A per-frame bump arena.
    Frame = 2,
    /// A linear or stack allocator.
    Linear = 3,
}

impl AllocatorType {
    /// Every allocator type, in ordinal order.
    pub const ALL: [AllocatorType; 4] = [
        AllocatorType::Default,
        AllocatorType::Pool,
        AllocatorType::Frame,
        AllocatorType::Linear,
    ];

    /// Ordinal used by the profile file format.
    #[inline]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Inverse of [`AllocatorType::ordinal`].
    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            AllocatorType::Default => "default",
            AllocatorType::Pool => "pool",
            AllocatorType::Frame => "frame",
            AllocatorType::Linear => "linear",
        }
    }
}

impl Default for AllocatorType {
    fn default() -> Self {
        Self::Default
    }
}

impl std::fmt::Display for AllocatorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// RAII guard that tags allocations observed by the global hook on this
/// thread with a region and allocator type.
///
/// Scopes nest; dropping a guard restores the tags that were active when it
/// was created.
///
/// ```rust,no_run
/// use memscene::{AllocatorType, Region, RegionScope};
///
/// let _scope = RegionScope::enter(Region::Graphics, AllocatorType::Default);
/// let staging = vec![0u8; 4096]; // recorded as Region::Graphics
/// # drop(staging);
/// ```
pub struct RegionScope {
    previous: (Region, AllocatorType),
}

impl RegionScope {
    /// Activate `region` and `allocator_type` for the current thread.
    pub fn enter(region: Region, allocator_type: AllocatorType) -> Self {
        let previous = tls::replace_scope((region, allocator_type));
        Self { previous }
    }

    /// The tags this scope replaced.
    pub fn previous(&self) -> (Region, AllocatorType) {
        self.previous
    }
}

impl Drop for RegionScope {
    fn drop(&mut self) {
        tls::replace_scope(self.previous);
    }
}

/// Execute a closure with a region scope active.
pub fn with_region<F, R>(region: Region, allocator_type: AllocatorType, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _scope = RegionScope::enter(region, allocator_type);
    f()
}

/// The region and allocator type currently attached to this thread.
pub fn current_region() -> (Region, AllocatorType) {
    tls::current_scope()
}
