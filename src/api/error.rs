//! Error types surfaced to callers (UI layer, frame loop, explicit
//! allocation API).
//!
//! Tracking anomalies (untracked frees, duplicate addresses) are not errors:
//! they are recovered inside the hook and reported through
//! [`diagnostics`](crate::diagnostics).

use thiserror::Error;

use crate::profile::format::ProfileFormatError;

/// Errors returned by the memory instrumentation subsystem.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// `begin_scene` was called while another scene is recording.
    #[error("cannot begin scene '{requested}': scene '{active}' is already active")]
    SceneAlreadyActive {
        /// Name of the scene that keeps recording.
        active: String,
        /// Name passed to the rejected call.
        requested: String,
    },

    /// A snapshot was requested while no scene is recording.
    #[error("no scene is active")]
    NoActiveScene,

    /// The underlying allocator could not satisfy a request.
    #[error("allocation of {size} bytes with alignment {align} failed")]
    AllocationFailure {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },

    /// A profile file could not be parsed.
    #[error("corrupted profile: {0}")]
    CorruptedProfile(#[from] ProfileFormatError),

    /// Reading or writing a profile file failed.
    #[error("profile I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MemoryError>;
