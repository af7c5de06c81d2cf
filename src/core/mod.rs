//! Tracker internals: the registry, counters, stack table and the
//! thread-local state the hook relies on.

pub(crate) mod clock;
pub mod metrics;
pub(crate) mod stacks;
pub mod storage;
pub(crate) mod tls;
