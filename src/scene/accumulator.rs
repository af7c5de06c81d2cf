//! Scene recording state machine.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use crate::api::error::{MemoryError, Result};
use crate::api::tracker::MemoryTracker;
use crate::core::tls::{self, UntrackedScope};
use crate::diagnostics::{Anomaly, AnomalyKind};
use crate::scene::series::{MetricsSeries, SceneInfo, Snapshot};
use crate::sync::mutex::Mutex;

struct ActiveScene {
    info: SceneInfo,
    snapshots: Vec<Snapshot>,
    last_timestamp: u64,
    frames_since_snapshot: u32,
    limit_reported: bool,
}

enum SceneState {
    Inactive,
    Active(ActiveScene),
}

/// Records snapshots of a [`MemoryTracker`] between `begin_scene` and
/// `end_scene`.
///
/// Two states: inactive (initial and terminal) and active. At most one
/// scene is active per tracker: starting a scene claims the tracker, and a
/// second accumulator over the same tracker is refused until the first
/// scene ends (or its accumulator is dropped).
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use memscene::{MemoryTracker, SceneMetricsAccumulator};
///
/// let tracker = Arc::new(MemoryTracker::with_defaults());
/// let scenes = SceneMetricsAccumulator::new(Arc::clone(&tracker));
///
/// scenes.begin_scene("level_1").unwrap();
/// for _frame in 0..3 {
///     // ... update ...
///     scenes.on_frame();
/// }
/// let series = scenes.end_scene().unwrap();
/// assert_eq!(series.len(), 3);
/// ```
pub struct SceneMetricsAccumulator {
    tracker: Arc<MemoryTracker>,
    state: Mutex<SceneState>,
}

impl SceneMetricsAccumulator {
    pub fn new(tracker: Arc<MemoryTracker>) -> Self {
        Self {
            tracker,
            state: Mutex::new(SceneState::Inactive),
        }
    }

    pub fn tracker(&self) -> &Arc<MemoryTracker> {
        &self.tracker
    }

    /// Start recording. Fails without touching the running scene if one is
    /// already active on this tracker, through this accumulator or another.
    pub fn begin_scene(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let mut state = self.state.lock();
        self.tracker.claim_scene(&name)?;

        let start_time = self.tracker.now_us();
        log::info!("memscene: scene '{name}' started");
        *state = SceneState::Active(ActiveScene {
            info: SceneInfo { name, start_time },
            snapshots: Vec::new(),
            last_timestamp: start_time,
            frames_since_snapshot: 0,
            limit_reported: false,
        });
        Ok(())
    }

    pub fn is_scene_active(&self) -> bool {
        matches!(*self.state.lock(), SceneState::Active(_))
    }

    /// Name and start time of the running scene.
    pub fn active_scene(&self) -> Option<SceneInfo> {
        match &*self.state.lock() {
            SceneState::Active(active) => Some(active.info.clone()),
            SceneState::Inactive => None,
        }
    }

    /// Snapshots recorded so far in the running scene (0 when inactive).
    pub fn snapshot_count(&self) -> usize {
        match &*self.state.lock() {
            SceneState::Active(active) => active.snapshots.len(),
            SceneState::Inactive => 0,
        }
    }

    /// Capture the tracker's registry and counters and append them to the
    /// running scene. Returns the number of snapshots in the scene.
    ///
    /// Once the scene holds `max_snapshots_per_scene` snapshots, further
    /// captures are dropped.
    pub fn take_snapshot(&self) -> Result<usize> {
        let mut state = self.state.lock();
        let SceneState::Active(active) = &mut *state else {
            return Err(MemoryError::NoActiveScene);
        };
        Ok(self.snapshot_into(active))
    }

    /// Frame-boundary tick.
    ///
    /// While a scene is active, every `snapshot_interval_frames`-th call
    /// takes a snapshot (before the frame window is cleared, so the snapshot
    /// still sees this frame's counters). Always resets the tracker's frame
    /// counters. Returns the snapshot count when a snapshot was taken.
    pub fn on_frame(&self) -> Option<usize> {
        let interval = self.tracker.config().effective_interval();
        let taken = {
            let mut state = self.state.lock();
            match &mut *state {
                SceneState::Active(active) => {
                    active.frames_since_snapshot += 1;
                    if active.frames_since_snapshot >= interval {
                        active.frames_since_snapshot = 0;
                        Some(self.snapshot_into(active))
                    } else {
                        None
                    }
                }
                SceneState::Inactive => None,
            }
        };
        self.tracker.reset_frame_counters();
        taken
    }

    /// Stop recording and return the sealed series.
    ///
    /// Returns `None` when no scene is active; calling it again is harmless.
    pub fn end_scene(&self) -> Option<MetricsSeries> {
        let active = {
            let mut state = self.state.lock();
            match mem::replace(&mut *state, SceneState::Inactive) {
                SceneState::Active(active) => active,
                SceneState::Inactive => return None,
            }
        };
        self.tracker.release_scene();

        let series = self.seal(active);
        log::info!(
            "memscene: scene '{}' ended with {} snapshots",
            series.scene_name(),
            series.len()
        );
        Some(series)
    }

    fn snapshot_into(&self, active: &mut ActiveScene) -> usize {
        let cap = self.tracker.config().max_snapshots_per_scene;
        if cap != 0 && active.snapshots.len() >= cap {
            if !active.limit_reported {
                active.limit_reported = true;
                self.tracker.report(Anomaly {
                    kind: AnomalyKind::SnapshotLimitReached,
                    address: 0,
                    size: cap,
                    thread_id_hash: tls::thread_id_hash(),
                    timestamp: active.last_timestamp,
                });
            }
            return active.snapshots.len();
        }

        let capture = self.tracker.capture();
        let _untracked = UntrackedScope::new();
        let timestamp = capture.timestamp.max(active.last_timestamp);
        active.last_timestamp = timestamp;
        active.snapshots.push(Snapshot {
            timestamp,
            counters: capture.counters.into(),
            records: capture.records,
        });
        active.snapshots.len()
    }

    /// Rewrite tracker stack identifiers into indices of the series' own
    /// string table, symbolizing each distinct stack once.
    fn seal(&self, mut active: ActiveScene) -> MetricsSeries {
        let _untracked = UntrackedScope::new();
        let mut remap: HashMap<u32, Option<u32>> = HashMap::new();
        let mut stacktraces = Vec::new();

        for snapshot in &mut active.snapshots {
            for record in &mut snapshot.records {
                let Some(id) = record.stacktrace else {
                    continue;
                };
                record.stacktrace = *remap.entry(id).or_insert_with(|| {
                    let text = self.tracker.resolve_stacktrace(id)?;
                    stacktraces.push(text);
                    Some((stacktraces.len() - 1) as u32)
                });
            }
        }

        MetricsSeries::sealed(
            active.info.name,
            active.info.start_time,
            active.snapshots,
            stacktraces,
        )
    }
}

impl Drop for SceneMetricsAccumulator {
    fn drop(&mut self) {
        if let SceneState::Active(active) = &*self.state.lock() {
            log::warn!(
                "memscene: scene '{}' dropped without end_scene",
                active.info.name
            );
            self.tracker.release_scene();
        }
    }
}

impl std::fmt::Debug for SceneMetricsAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneMetricsAccumulator")
            .field("active_scene", &self.active_scene())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::TrackerConfig;
    use crate::api::record::AllocationRecord;
    use crate::api::region::{AllocatorType, Region};

    fn accumulator(config: TrackerConfig) -> SceneMetricsAccumulator {
        SceneMetricsAccumulator::new(Arc::new(MemoryTracker::new(config)))
    }

    #[test]
    fn test_second_begin_is_rejected() {
        let acc = accumulator(TrackerConfig::minimal());
        acc.begin_scene("test").unwrap();
        let err = acc.begin_scene("new_test").unwrap_err();
        assert!(matches!(
            err,
            MemoryError::SceneAlreadyActive { ref active, ref requested }
                if active == "test" && requested == "new_test"
        ));
        assert!(acc.is_scene_active());
        assert_eq!(acc.active_scene().unwrap().name, "test");
    }

    #[test]
    fn test_one_scene_per_tracker() {
        let tracker = Arc::new(MemoryTracker::new(TrackerConfig::minimal()));
        let first = SceneMetricsAccumulator::new(Arc::clone(&tracker));
        let second = SceneMetricsAccumulator::new(Arc::clone(&tracker));

        first.begin_scene("test").unwrap();
        let err = second.begin_scene("other").unwrap_err();
        assert!(matches!(
            err,
            MemoryError::SceneAlreadyActive { ref active, ref requested }
                if active == "test" && requested == "other"
        ));
        assert!(first.is_scene_active());
        assert!(!second.is_scene_active());
        assert_eq!(tracker.active_scene_name().as_deref(), Some("test"));

        first.end_scene().unwrap();
        assert_eq!(tracker.active_scene_name(), None);
        second.begin_scene("other").unwrap();
        assert_eq!(tracker.active_scene_name().as_deref(), Some("other"));
    }

    #[test]
    fn test_dropping_active_accumulator_releases_tracker() {
        let tracker = Arc::new(MemoryTracker::new(TrackerConfig::minimal()));
        {
            let abandoned = SceneMetricsAccumulator::new(Arc::clone(&tracker));
            abandoned.begin_scene("abandoned").unwrap();
        }
        assert_eq!(tracker.active_scene_name(), None);
        let next = SceneMetricsAccumulator::new(tracker);
        next.begin_scene("next").unwrap();
    }

    #[test]
    fn test_end_is_idempotent() {
        let acc = accumulator(TrackerConfig::minimal());
        assert!(acc.end_scene().is_none());
        assert!(!acc.is_scene_active());

        acc.begin_scene("test").unwrap();
        assert!(acc.end_scene().is_some());
        assert!(acc.end_scene().is_none());
        assert!(!acc.is_scene_active());
    }

    #[test]
    fn test_snapshot_requires_active_scene() {
        let acc = accumulator(TrackerConfig::minimal());
        assert!(matches!(acc.take_snapshot(), Err(MemoryError::NoActiveScene)));
    }

    #[test]
    fn test_snapshots_capture_registry() {
        let acc = accumulator(TrackerConfig::minimal());
        let tracker = Arc::clone(acc.tracker());
        acc.begin_scene("capture").unwrap();

        tracker.on_allocate(0x1000, 32, Region::Ui, AllocatorType::Default);
        assert_eq!(acc.take_snapshot().unwrap(), 1);
        tracker.on_allocate(0x2000, 64, Region::Ui, AllocatorType::Default);
        assert_eq!(acc.take_snapshot().unwrap(), 2);
        tracker.on_deallocate(0x1000);
        assert_eq!(acc.take_snapshot().unwrap(), 3);

        let series = acc.end_scene().unwrap();
        let sizes: Vec<Vec<usize>> = series
            .snapshots()
            .iter()
            .map(|s| s.records.iter().map(|r| r.size).collect())
            .collect();
        assert_eq!(sizes, vec![vec![32], vec![32, 64], vec![64]]);
        assert_eq!(series.snapshots()[2].counters.alive_count, 1);
        assert!(series
            .snapshots()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(series.snapshots()[0].timestamp >= series.start_time());
    }

    #[test]
    fn test_on_frame_respects_interval() {
        let acc = accumulator(TrackerConfig::minimal().with_snapshot_interval(3));
        acc.begin_scene("interval").unwrap();
        let taken: Vec<_> = (0..7).map(|_| acc.on_frame()).collect();
        assert_eq!(taken, vec![None, None, Some(1), None, None, Some(2), None]);
        assert_eq!(acc.tracker().counters().frame_index, 7);
    }

    #[test]
    fn test_snapshot_sees_frame_before_reset() {
        let acc = accumulator(TrackerConfig::minimal().with_snapshot_interval(1));
        let tracker = Arc::clone(acc.tracker());
        acc.begin_scene("frames").unwrap();
        tracker.on_allocate(0x40, 8, Region::Heap, AllocatorType::Frame);
        acc.on_frame();
        acc.on_frame();
        let series = acc.end_scene().unwrap();
        assert_eq!(series.snapshots()[0].counters.frame_allocations, 1);
        assert_eq!(series.snapshots()[1].counters.frame_allocations, 0);
    }

    #[test]
    fn test_snapshot_cap() {
        let acc = accumulator(TrackerConfig::minimal().with_max_snapshots(2));
        acc.begin_scene("capped").unwrap();
        for _ in 0..5 {
            acc.take_snapshot().unwrap();
        }
        assert_eq!(acc.snapshot_count(), 2);
        let anomalies = acc.tracker().anomalies().drain();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::SnapshotLimitReached);
        assert_eq!(acc.end_scene().unwrap().len(), 2);
    }

    #[test]
    fn test_stacktraces_are_reindexed() {
        let acc = accumulator(TrackerConfig::minimal());
        let tracker = Arc::clone(acc.tracker());
        let a = tracker.stacks().intern(vec![0x10, 0x20]).unwrap();
        let b = tracker.stacks().intern(vec![0x30]).unwrap();

        acc.begin_scene("stacks").unwrap();
        for address in [0x100, 0x200] {
            let record =
                AllocationRecord::new(address, 1, Region::Heap, AllocatorType::Default, 1, 0);
            tracker.storage().add_pointer(record.with_stacktrace(b));
        }
        acc.take_snapshot().unwrap();
        let series = acc.end_scene().unwrap();

        assert_ne!(a, b);
        assert_eq!(series.stacktraces().len(), 1);
        for record in &series.snapshots()[0].records {
            assert_eq!(record.stacktrace, Some(0));
        }
    }
}
