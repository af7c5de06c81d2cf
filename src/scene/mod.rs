//! Scene-scoped recording: begin a scene, snapshot the tracker over time,
//! end it and hand the sealed series to panels or to disk.

pub mod accumulator;
pub mod exporter;
pub mod series;
pub mod storage;
