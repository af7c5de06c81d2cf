//! Tracker configuration.

use std::path::PathBuf;

/// Environment variable toggling stack-trace capture (`1`/`true`/`on`).
pub const ENV_STACKTRACES: &str = "MEMSCENE_STACKTRACES";
/// Environment variable setting the snapshot cadence in frames.
pub const ENV_SNAPSHOT_INTERVAL: &str = "MEMSCENE_SNAPSHOT_INTERVAL";
/// Environment variable capping snapshots per scene (`0` = unlimited).
pub const ENV_MAX_SNAPSHOTS: &str = "MEMSCENE_MAX_SNAPSHOTS";
/// Environment variable overriding the profile output directory.
pub const ENV_PROFILE_DIR: &str = "MEMSCENE_PROFILE_DIR";

/// Configuration for a [`MemoryTracker`](crate::MemoryTracker) and the scene
/// recorders built on top of it.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Capture a stack trace for every tracked allocation.
    ///
    /// Only has an effect with the `debug` feature enabled.
    pub capture_stacktraces: bool,

    /// Maximum frames kept per stack trace (default: 16)
    pub max_stack_frames: usize,

    /// Number of registry shards, rounded up to a power of two (default: 64)
    pub registry_shards: usize,

    /// Take a snapshot every N frames while a scene is active (default: 1)
    pub snapshot_interval_frames: u32,

    /// Maximum snapshots kept per scene, 0 = unlimited (default: 0)
    pub max_snapshots_per_scene: usize,

    /// Capacity of the recent-anomaly log (default: 256)
    pub anomaly_log_capacity: usize,

    /// Directory where finished scenes are exported (default: "target/memscene")
    pub profile_directory: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            capture_stacktraces: cfg!(feature = "debug"),
            max_stack_frames: 16,
            registry_shards: 64,
            snapshot_interval_frames: 1,
            max_snapshots_per_scene: 0,
            anomaly_log_capacity: 256,
            profile_directory: PathBuf::from("target/memscene"),
        }
    }
}

impl TrackerConfig {
    /// Create a minimal config for testing or constrained environments.
    pub fn minimal() -> Self {
        Self {
            capture_stacktraces: false,
            max_stack_frames: 0,
            registry_shards: 8,
            snapshot_interval_frames: 10,
            max_snapshots_per_scene: 600,
            anomaly_log_capacity: 32,
            ..Self::default()
        }
    }

    /// Create a config that records as much as possible.
    pub fn detailed() -> Self {
        Self {
            capture_stacktraces: true,
            max_stack_frames: 32,
            registry_shards: 128,
            snapshot_interval_frames: 1,
            max_snapshots_per_scene: 0,
            anomaly_log_capacity: 1024,
            ..Self::default()
        }
    }

    /// Start from [`TrackerConfig::default`] and apply `MEMSCENE_*`
    /// environment overrides. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var(ENV_STACKTRACES) {
            config.capture_stacktraces = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(interval) = parse_env::<u32>(ENV_SNAPSHOT_INTERVAL) {
            config.snapshot_interval_frames = interval;
        }
        if let Some(max) = parse_env::<usize>(ENV_MAX_SNAPSHOTS) {
            config.max_snapshots_per_scene = max;
        }
        if let Ok(dir) = std::env::var(ENV_PROFILE_DIR) {
            if !dir.trim().is_empty() {
                config.profile_directory = PathBuf::from(dir);
            }
        }

        config
    }

    /// Builder pattern: enable stack-trace capture.
    pub fn with_stacktraces(mut self, enable: bool) -> Self {
        self.capture_stacktraces = enable;
        self
    }

    /// Builder pattern: set maximum stack depth.
    pub fn with_max_stack_frames(mut self, frames: usize) -> Self {
        self.max_stack_frames = frames;
        self
    }

    /// Builder pattern: set registry shard count.
    pub fn with_registry_shards(mut self, shards: usize) -> Self {
        self.registry_shards = shards;
        self
    }

    /// Builder pattern: set snapshot cadence in frames.
    pub fn with_snapshot_interval(mut self, frames: u32) -> Self {
        self.snapshot_interval_frames = frames;
        self
    }

    /// Builder pattern: cap the number of snapshots per scene.
    pub fn with_max_snapshots(mut self, max: usize) -> Self {
        self.max_snapshots_per_scene = max;
        self
    }

    /// Builder pattern: set the recent-anomaly log capacity.
    pub fn with_anomaly_log_capacity(mut self, capacity: usize) -> Self {
        self.anomaly_log_capacity = capacity;
        self
    }

    /// Builder pattern: set the profile export directory.
    pub fn with_profile_directory<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.profile_directory = dir.into();
        self
    }

    /// Shard count actually used by the registry.
    pub(crate) fn effective_shards(&self) -> usize {
        self.registry_shards.clamp(1, 4096).next_power_of_two()
    }

    /// Snapshot cadence, never zero.
    pub(crate) fn effective_interval(&self) -> u32 {
        self.snapshot_interval_frames.max(1)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}
