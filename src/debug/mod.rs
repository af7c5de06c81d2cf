//! Debug utilities for tracking allocations.
//!
//! Stack capture is real only when the `debug` feature is enabled.

pub(crate) mod backtrace;
