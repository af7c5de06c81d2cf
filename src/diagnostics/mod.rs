//! Diagnostics for the tracking layer.
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                                   |
//! |-------|-------------------------------------------|
//! | MS001 | Duplicate allocation address (overwritten) |
//! | MS002 | Free of an untracked address (ignored)    |
//! | MS003 | Scene snapshot limit reached              |

pub mod anomaly;
pub mod emit;
pub mod anomaly_log;

pub use anomaly::{Anomaly, AnomalyKind, DiagnosticCode, MS001, MS002, MS003};
pub use emit::{emit, is_verbose, set_verbose};
pub use anomaly_log::AnomalyLog;
