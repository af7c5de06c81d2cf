//! Anomaly emission to the `log` facade.

use std::sync::atomic::{AtomicBool, Ordering};

use super::anomaly::{Anomaly, AnomalyKind};

/// Global flag to enable verbose diagnostics.
static VERBOSE_DIAGNOSTICS: AtomicBool = AtomicBool::new(cfg!(feature = "diagnostics"));

/// Log every anomaly, including untracked frees, at `warn` level.
pub fn set_verbose(verbose: bool) {
    VERBOSE_DIAGNOSTICS.store(verbose, Ordering::Relaxed);
}

/// Whether verbose diagnostics are enabled.
pub fn is_verbose() -> bool {
    VERBOSE_DIAGNOSTICS.load(Ordering::Relaxed)
}

/// Emit an anomaly.
///
/// Untracked frees are routine (anything allocated before installation) and
/// are only logged in verbose mode.
pub fn emit(anomaly: &Anomaly) {
    let verbose = is_verbose();
    match anomaly.kind {
        AnomalyKind::UntrackedFree if !verbose => {}
        AnomalyKind::UntrackedFree => log::warn!("{anomaly}"),
        AnomalyKind::DuplicateAllocationAddress if verbose => log::warn!("{anomaly}"),
        AnomalyKind::DuplicateAllocationAddress => log::debug!("{anomaly}"),
        AnomalyKind::SnapshotLimitReached => log::warn!("{anomaly}"),
    }
}
