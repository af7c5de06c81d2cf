//! Aggregate counter snapshots.

/// Point-in-time copy of the process-wide memory counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsCounters {
    /// Allocations recorded since the tracker was created.
    pub total_allocations: u64,

    /// Frees of tracked allocations since the tracker was created.
    pub total_frees: u64,

    /// Allocations currently alive (`total_allocations - total_frees`).
    pub alive_count: u64,

    /// Allocations recorded since the last frame boundary.
    pub frame_allocations: u64,

    /// Frees recorded since the last frame boundary.
    pub frame_frees: u64,

    /// Bytes currently held by tracked allocations.
    pub live_bytes: u64,

    /// High-water mark of `live_bytes`.
    pub peak_bytes: u64,

    /// Bytes ever allocated through the hook.
    pub bytes_allocated_lifetime: u64,

    /// Bytes ever freed through the hook.
    pub bytes_freed_lifetime: u64,

    /// Allocations that reused an address still marked live.
    pub duplicate_addresses: u64,

    /// Frees of addresses with no live record.
    pub untracked_frees: u64,

    /// Number of frame boundaries seen.
    pub frame_index: u64,
}

impl MetricsCounters {
    /// Allocations made in the current frame window that have not been
    /// balanced by frees in the same window.
    pub fn frame_alive(&self) -> u64 {
        self.frame_allocations.saturating_sub(self.frame_frees)
    }
}

impl std::fmt::Display for MetricsCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Memory Counters (frame {}):", self.frame_index)?;
        writeln!(f, "  Allocations:     {}", self.total_allocations)?;
        writeln!(f, "  Frees:           {}", self.total_frees)?;
        writeln!(f, "  Alive:           {}", self.alive_count)?;
        writeln!(f, "  Frame allocs:    {}", self.frame_allocations)?;
        writeln!(f, "  Frame frees:     {}", self.frame_frees)?;
        writeln!(f, "  Live bytes:      {}", self.live_bytes)?;
        writeln!(f, "  Peak bytes:      {}", self.peak_bytes)?;
        writeln!(f, "  Duplicate addrs: {}", self.duplicate_addresses)?;
        writeln!(f, "  Untracked frees: {}", self.untracked_frees)?;
        Ok(())
    }
}
