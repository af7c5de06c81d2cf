//! Scene recording that persists and publishes its result.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::error::{MemoryError, Result};
use crate::api::tracker::MemoryTracker;
use crate::profile::format::EXTENSION;
use crate::profile::serializer::ProfileSerializer;
use crate::scene::accumulator::SceneMetricsAccumulator;
use crate::scene::series::MetricsSeries;
use crate::scene::storage::SharedSceneMetrics;

/// A [`SceneMetricsAccumulator`] that, on `end_scene`, writes the series to
/// `<dir>/<scene>_<start>.memprof` and shows it in a [`SharedSceneMetrics`].
pub struct SceneMetricsExporter {
    accumulator: SceneMetricsAccumulator,
    output_dir: PathBuf,
    shared: Arc<SharedSceneMetrics>,
}

impl SceneMetricsExporter {
    /// Export into the tracker's configured profile directory.
    pub fn new(tracker: Arc<MemoryTracker>) -> Self {
        let output_dir = tracker.config().profile_directory.clone();
        Self {
            accumulator: SceneMetricsAccumulator::new(tracker),
            output_dir,
            shared: Arc::new(SharedSceneMetrics::new()),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Publish finished scenes into `shared` instead of a private view.
    pub fn with_shared(mut self, shared: Arc<SharedSceneMetrics>) -> Self {
        self.shared = shared;
        self
    }

    pub fn accumulator(&self) -> &SceneMetricsAccumulator {
        &self.accumulator
    }

    pub fn shared(&self) -> &Arc<SharedSceneMetrics> {
        &self.shared
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn begin_scene(&self, name: impl Into<String>) -> Result<()> {
        self.accumulator.begin_scene(name)
    }

    pub fn is_scene_active(&self) -> bool {
        self.accumulator.is_scene_active()
    }

    pub fn take_snapshot(&self) -> Result<usize> {
        self.accumulator.take_snapshot()
    }

    pub fn on_frame(&self) -> Option<usize> {
        self.accumulator.on_frame()
    }

    /// End the scene, publish it and write it to disk.
    ///
    /// Returns the written path, or `None` if no scene was active. The
    /// series is published even when writing fails.
    pub fn end_scene(&self) -> Result<Option<PathBuf>> {
        let Some(series) = self.accumulator.end_scene() else {
            return Ok(None);
        };
        let path = self.output_dir.join(profile_file_name(&series));
        let written = fs::create_dir_all(&self.output_dir)
            .map_err(MemoryError::from)
            .and_then(|()| ProfileSerializer::export(&series, &path));
        self.shared.replace(series);
        written.map(|()| Some(path))
    }
}

/// `<sanitized name>_<start µs>.memprof`
pub fn profile_file_name(series: &MetricsSeries) -> String {
    let mut name: String = series
        .scene_name()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        name.push_str("scene");
    }
    format!("{name}_{}.{EXTENSION}", series.start_time())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::TrackerConfig;

    #[test]
    fn test_file_name_is_sanitized() {
        let series = MetricsSeries::from_parts("Boss Fight/2", 1234, Vec::new(), Vec::new()).unwrap();
        assert_eq!(profile_file_name(&series), "Boss_Fight_2_1234.memprof");

        let unnamed = MetricsSeries::from_parts("", 5, Vec::new(), Vec::new()).unwrap();
        assert_eq!(profile_file_name(&unnamed), "scene_5.memprof");
    }

    #[test]
    fn test_end_without_scene() {
        let tracker = Arc::new(MemoryTracker::new(TrackerConfig::minimal()));
        let exporter = SceneMetricsExporter::new(tracker);
        assert!(exporter.end_scene().unwrap().is_none());
    }

    #[test]
    fn test_end_scene_writes_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(MemoryTracker::new(TrackerConfig::minimal()));
        let exporter = SceneMetricsExporter::new(tracker).with_output_dir(dir.path().join("out"));

        exporter.begin_scene("menu").unwrap();
        exporter.take_snapshot().unwrap();
        exporter.take_snapshot().unwrap();
        let path = exporter.end_scene().unwrap().unwrap();

        assert!(path.starts_with(dir.path().join("out")));
        assert_eq!(exporter.shared().current().snapshot_count(), 2);
        let loaded = ProfileSerializer::import(&path).unwrap();
        assert_eq!(loaded.scene_name(), "menu");
        assert_eq!(loaded.len(), 2);
    }
}
