//! Versioned binary persistence of metrics series.

pub mod format;
pub mod serializer;
