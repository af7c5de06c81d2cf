//! # memscene
//!
//! Scene-scoped heap allocation tracking for Rust game engines.
//!
//! ## Features
//!
//! - Process-wide allocation hook (`#[global_allocator]`) or an explicit
//!   tracked allocation API
//! - Concurrent registry of every live allocation, tagged with region,
//!   allocator type, thread and time
//! - Lock-free aggregate counters with a per-frame window
//! - Named scenes that snapshot the registry over time
//! - Versioned binary profiles for offline inspection
//! - Optional stack traces (`debug` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use memscene::{MemoryTracker, SceneMetricsExporter, TrackerConfig, TrackingAllocator};
//!
//! #[global_allocator]
//! static ALLOC: TrackingAllocator = TrackingAllocator::system();
//!
//! fn main() -> memscene::Result<()> {
//!     let tracker = Arc::new(MemoryTracker::new(TrackerConfig::from_env()));
//!     ALLOC.install(Arc::clone(&tracker));
//!
//!     let scenes = SceneMetricsExporter::new(tracker);
//!     scenes.begin_scene("level_1")?;
//!     for _frame in 0..60 {
//!         // ... update and render ...
//!         scenes.on_frame();
//!     }
//!     if let Some(path) = scenes.end_scene()? {
//!         println!("profile written to {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Re-entrancy
//!
//! The tracker's own bookkeeping allocates. Those allocations happen with a
//! thread-local marker set and are never recorded, so the hook cannot
//! recurse into itself.

pub mod api;
pub mod diagnostics;
pub mod profile;
pub mod scene;

mod core;
mod debug;
mod sync;

// Re-export public API at crate root for convenience
pub use api::config::TrackerConfig;
pub use api::error::{MemoryError, Result};
pub use api::hook::TrackingAllocator;
pub use api::record::AllocationRecord;
pub use api::region::{current_region, with_region, AllocatorType, Region, RegionScope};
pub use api::stats::MetricsCounters;
pub use api::tracker::{LiveCapture, MemoryTracker};

// Registry and counters
pub use crate::core::metrics::MemoryMetrics;
pub use crate::core::storage::{AllocationStorage, FrozenStorage};
pub use crate::core::tls::thread_id_hash;

// Scenes
pub use scene::accumulator::SceneMetricsAccumulator;
pub use scene::exporter::{profile_file_name, SceneMetricsExporter};
pub use scene::series::{MetricsSeries, SceneInfo, Snapshot, SnapshotCounters};
pub use scene::storage::{SceneMetricsStorage, SharedSceneMetrics};

// Profiles
pub use profile::format::ProfileFormatError;
pub use profile::serializer::ProfileSerializer;

// Diagnostics
pub use diagnostics::{Anomaly, AnomalyKind, AnomalyLog, DiagnosticCode, MS001, MS002, MS003};
