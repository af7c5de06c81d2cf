//! Read-only indexed views over a series for visualization panels.

use std::path::Path;
use std::sync::Arc;

use crate::api::error::Result;
use crate::api::record::AllocationRecord;
use crate::api::region::Region;
use crate::profile::serializer::ProfileSerializer;
use crate::scene::series::{MetricsSeries, SnapshotCounters};
use crate::sync::mutex::RwLock;

/// Flattened, index-addressable view of a sealed [`MetricsSeries`].
///
/// `allocation_data_over_time()[i]` belongs to the snapshot taken at
/// `allocation_times()[i]`; records of one snapshot are contiguous.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneMetricsStorage {
    scene_name: String,
    start_time: u64,
    snapshot_times: Vec<u64>,
    counters: Vec<SnapshotCounters>,
    records: Vec<AllocationRecord>,
    times: Vec<u64>,
    /// `offsets[i]..offsets[i + 1]` are snapshot `i`'s records.
    offsets: Vec<usize>,
    stacktraces: Vec<String>,
}

impl SceneMetricsStorage {
    /// An empty view, shown before any scene was captured or loaded.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_series(series: MetricsSeries) -> Self {
        let total = series.record_count();
        let mut records = Vec::with_capacity(total);
        let mut times = Vec::with_capacity(total);
        let mut offsets = Vec::with_capacity(series.len() + 1);
        let mut snapshot_times = Vec::with_capacity(series.len());
        let mut counters = Vec::with_capacity(series.len());

        offsets.push(0);
        for snapshot in series.snapshots() {
            records.extend_from_slice(&snapshot.records);
            times.extend(std::iter::repeat(snapshot.timestamp).take(snapshot.records.len()));
            offsets.push(records.len());
            snapshot_times.push(snapshot.timestamp);
            counters.push(snapshot.counters);
        }

        Self {
            scene_name: series.scene_name().to_owned(),
            start_time: series.start_time(),
            snapshot_times,
            counters,
            records,
            times,
            offsets,
            stacktraces: series.stacktraces().to_vec(),
        }
    }

    pub fn scene_name(&self) -> &str {
        &self.scene_name
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshot_times.len()
    }

    /// Every record of every snapshot, in snapshot order.
    pub fn allocation_data_over_time(&self) -> &[AllocationRecord] {
        &self.records
    }

    /// Snapshot timestamp of each record, index-aligned with
    /// [`allocation_data_over_time`](Self::allocation_data_over_time).
    pub fn allocation_times(&self) -> &[u64] {
        &self.times
    }

    pub fn snapshot_times(&self) -> &[u64] {
        &self.snapshot_times
    }

    pub fn stacktrace_storage(&self) -> &[String] {
        &self.stacktraces
    }

    /// The stacktrace a record refers to.
    pub fn stacktrace(&self, record: &AllocationRecord) -> Option<&str> {
        let index = record.stacktrace? as usize;
        self.stacktraces.get(index).map(String::as_str)
    }

    pub fn snapshot_records(&self, index: usize) -> Option<&[AllocationRecord]> {
        let start = *self.offsets.get(index)?;
        let end = *self.offsets.get(index + 1)?;
        Some(&self.records[start..end])
    }

    pub fn snapshot_counters(&self, index: usize) -> Option<&SnapshotCounters> {
        self.counters.get(index)
    }

    /// `(timestamp, live bytes)` per snapshot, for the timeline graph.
    pub fn live_bytes_over_time(&self) -> Vec<(u64, u64)> {
        self.snapshot_times
            .iter()
            .zip(&self.counters)
            .map(|(&t, c)| (t, c.live_bytes))
            .collect()
    }

    /// Live bytes per region in snapshot `index`, in [`Region::ALL`] order.
    pub fn bytes_by_region(&self, index: usize) -> Option<Vec<(Region, u64)>> {
        let records = self.snapshot_records(index)?;
        let mut totals = [0u64; Region::ALL.len()];
        for record in records {
            totals[record.region.ordinal() as usize] += record.size as u64;
        }
        Some(Region::ALL.iter().copied().zip(totals).collect())
    }
}

impl From<MetricsSeries> for SceneMetricsStorage {
    fn from(series: MetricsSeries) -> Self {
        Self::from_series(series)
    }
}

/// The view currently shown by the panels, replaced as a whole.
///
/// Readers take an `Arc` to the current view and keep it as long as they
/// like; loading a new profile swaps the pointer and never mutates a view
/// someone is reading.
#[derive(Debug, Default)]
pub struct SharedSceneMetrics {
    current: RwLock<Arc<SceneMetricsStorage>>,
}

impl SharedSceneMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Arc<SceneMetricsStorage> {
        Arc::clone(&*self.current.read())
    }

    /// Show `series`, returning the new view.
    pub fn replace(&self, series: MetricsSeries) -> Arc<SceneMetricsStorage> {
        let view = Arc::new(SceneMetricsStorage::from_series(series));
        *self.current.write() = Arc::clone(&view);
        view
    }

    /// Import `path` and show it. On failure the current view is kept.
    pub fn load_profile(&self, path: impl AsRef<Path>) -> Result<Arc<SceneMetricsStorage>> {
        let series = ProfileSerializer::import(path)?;
        Ok(self.replace(series))
    }

    pub fn clear(&self) {
        *self.current.write() = Arc::new(SceneMetricsStorage::new());
    }
}
