//! Tracking anomalies and their codes.
//!
//! Anomalies are conditions the hook recovers from locally. They never
//! interrupt the host allocation path.

/// Diagnostic code wrapper for type-safe code references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagnosticCode(&'static str);

impl DiagnosticCode {
    /// Create a new diagnostic code.
    pub const fn new(code: &'static str) -> Self {
        Self(code)
    }

    /// Get the code string.
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Duplicate allocation address.
pub const MS001: DiagnosticCode = DiagnosticCode::new("MS001");
/// Free of an untracked address.
pub const MS002: DiagnosticCode = DiagnosticCode::new("MS002");
/// Per-scene snapshot cap reached.
pub const MS003: DiagnosticCode = DiagnosticCode::new("MS003");

/// Kind of recovered tracking anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalyKind {
    /// An address was allocated again while its record was still live.
    /// The stale record was overwritten.
    DuplicateAllocationAddress,
    /// An address with no live record was freed (allocated before the hook
    /// was installed, or by tracker-internal code). Ignored.
    UntrackedFree,
    /// A scene hit its snapshot cap; further snapshots are dropped.
    SnapshotLimitReached,
}

impl AnomalyKind {
    /// Diagnostic code for this kind.
    pub const fn code(self) -> DiagnosticCode {
        match self {
            AnomalyKind::DuplicateAllocationAddress => MS001,
            AnomalyKind::UntrackedFree => MS002,
            AnomalyKind::SnapshotLimitReached => MS003,
        }
    }

    /// Short description.
    pub const fn message(self) -> &'static str {
        match self {
            AnomalyKind::DuplicateAllocationAddress => {
                "address allocated again before its previous record was freed"
            }
            AnomalyKind::UntrackedFree => "free of an address with no live record",
            AnomalyKind::SnapshotLimitReached => "scene snapshot limit reached",
        }
    }
}

/// One recovered anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anomaly {
    /// What happened.
    pub kind: AnomalyKind,
    /// Address involved, 0 if not applicable.
    pub address: usize,
    /// Size of the stale or incoming block, 0 if unknown.
    pub size: usize,
    /// Thread that observed the anomaly.
    pub thread_id_hash: u64,
    /// Tracker clock reading.
    pub timestamp: u64,
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[memscene][{}] {} (address 0x{:x}, {} bytes, thread {:016x}, t={}us)",
            self.kind.code(),
            self.kind.message(),
            self.address,
            self.size,
            self.thread_id_hash,
            self.timestamp
        )
    }
}
