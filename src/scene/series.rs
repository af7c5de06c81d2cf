//! Snapshots and the sealed series a scene produces.

use crate::api::record::AllocationRecord;
use crate::api::stats::MetricsCounters;
use crate::profile::format::ProfileFormatError;

/// Aggregate counters stored with every snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SnapshotCounters {
    pub total_allocations: u64,
    pub total_frees: u64,
    pub alive_count: u64,
    pub frame_allocations: u64,
    pub live_bytes: u64,
}

impl From<MetricsCounters> for SnapshotCounters {
    fn from(c: MetricsCounters) -> Self {
        Self {
            total_allocations: c.total_allocations,
            total_frees: c.total_frees,
            alive_count: c.alive_count,
            frame_allocations: c.frame_allocations,
            live_bytes: c.live_bytes,
        }
    }
}

/// One timestamped capture of the registry and counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Microseconds on the tracker clock.
    pub timestamp: u64,
    pub counters: SnapshotCounters,
    /// Records alive at `timestamp`, ordered by address.
    pub records: Vec<AllocationRecord>,
}

impl Snapshot {
    /// Sum of record sizes.
    pub fn live_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.size as u64).sum()
    }
}

/// Name and start time of a recording session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneInfo {
    pub name: String,
    /// Microseconds on the tracker clock.
    pub start_time: u64,
}

/// The sealed, ordered output of one scene.
///
/// A series is immutable once built. Record stacktrace indices refer to
/// [`stacktraces`](Self::stacktraces).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSeries {
    scene_name: String,
    start_time: u64,
    snapshots: Vec<Snapshot>,
    stacktraces: Vec<String>,
}

impl MetricsSeries {
    /// Build a series, checking its structural invariants.
    pub fn from_parts(
        scene_name: impl Into<String>,
        start_time: u64,
        snapshots: Vec<Snapshot>,
        stacktraces: Vec<String>,
    ) -> Result<Self, ProfileFormatError> {
        let series = Self {
            scene_name: scene_name.into(),
            start_time,
            snapshots,
            stacktraces,
        };
        series.validate()?;
        Ok(series)
    }

    /// Build a series produced by the accumulator, which upholds the
    /// invariants itself.
    pub(crate) fn sealed(
        scene_name: String,
        start_time: u64,
        snapshots: Vec<Snapshot>,
        stacktraces: Vec<String>,
    ) -> Self {
        let series = Self {
            scene_name,
            start_time,
            snapshots,
            stacktraces,
        };
        debug_assert_eq!(series.validate(), Ok(()));
        series
    }

    pub fn scene_name(&self) -> &str {
        &self.scene_name
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn info(&self) -> SceneInfo {
        SceneInfo {
            name: self.scene_name.clone(),
            start_time: self.start_time,
        }
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn stacktraces(&self) -> &[String] {
        &self.stacktraces
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Total number of records over every snapshot.
    pub fn record_count(&self) -> usize {
        self.snapshots.iter().map(|s| s.records.len()).sum()
    }

    /// Check the invariants every series must hold:
    /// timestamps never decrease and never precede the scene start,
    /// counters agree with each other, records are ordered by unique
    /// address and stacktrace indices resolve.
    pub fn validate(&self) -> Result<(), ProfileFormatError> {
        let mut previous = self.start_time;
        for (index, snapshot) in self.snapshots.iter().enumerate() {
            if snapshot.timestamp < previous {
                return Err(ProfileFormatError::NonMonotonicTimestamp {
                    index,
                    previous,
                    timestamp: snapshot.timestamp,
                });
            }
            previous = snapshot.timestamp;

            let c = &snapshot.counters;
            if c.total_allocations.checked_sub(c.total_frees) != Some(c.alive_count) {
                return Err(ProfileFormatError::InconsistentCounters {
                    index,
                    alive: c.alive_count,
                    allocations: c.total_allocations,
                    frees: c.total_frees,
                });
            }

            for pair in snapshot.records.windows(2) {
                if pair[1].address <= pair[0].address {
                    return Err(ProfileFormatError::UnorderedRecords {
                        index,
                        address: pair[1].address as u64,
                    });
                }
            }

            for record in &snapshot.records {
                if let Some(stack) = record.stacktrace {
                    if stack as usize >= self.stacktraces.len() {
                        return Err(ProfileFormatError::StacktraceOutOfRange {
                            index: stack,
                            len: self.stacktraces.len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
