//! Profile file layout (version 1, little endian).
//!
//! ```text
//! magic            4 bytes  b"MSPF"
//! version          u32
//! scene name       u32 length + UTF-8
//! scene start      u64 (µs)
//! snapshot count   u64
//!   timestamp      u64 (µs)
//!   counters       5 x u64
//!   record count   u64
//!     record       address u64, size u64, region u8, allocator u8,
//!                  thread u64, timestamp u64, stacktrace u32
//! string count     u32
//!   string         u32 length + UTF-8
//! ```

use thiserror::Error;

/// File signature.
pub const MAGIC: [u8; 4] = *b"MSPF";

/// Current format version.
pub const VERSION: u32 = 1;

/// Conventional profile file extension.
pub const EXTENSION: &str = "memprof";

/// Stacktrace index meaning "no stack captured".
pub const NO_STACKTRACE: u32 = u32::MAX;

/// Encoded size of one allocation record.
pub const RECORD_LEN: usize = 8 + 8 + 1 + 1 + 8 + 8 + 4;

/// Encoded size of a snapshot header (timestamp, counters, record count).
pub const SNAPSHOT_HEADER_LEN: usize = 8 + 5 * 8 + 8;

/// Why a profile could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileFormatError {
    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("unsupported format version {found} (expected {expected})", expected = VERSION)]
    UnsupportedVersion { found: u32 },

    #[error("truncated at byte {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("invalid UTF-8 in string at byte {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("address {0:#x} does not fit this platform's pointer width")]
    AddressOutOfRange(u64),

    #[error("allocation size {0} does not fit this platform's pointer width")]
    SizeOutOfRange(u64),

    #[error("unknown region ordinal {0}")]
    InvalidRegion(u8),

    #[error("unknown allocator type ordinal {0}")]
    InvalidAllocatorType(u8),

    #[error("snapshot {index} timestamp {timestamp} precedes {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: u64,
        timestamp: u64,
    },

    #[error("snapshot {index}: alive count {alive} != {allocations} allocations - {frees} frees")]
    InconsistentCounters {
        index: usize,
        alive: u64,
        allocations: u64,
        frees: u64,
    },

    #[error("snapshot {index}: records not in strictly increasing address order at {address:#x}")]
    UnorderedRecords { index: usize, address: u64 },

    #[error("stacktrace index {index} out of range ({len} strings)")]
    StacktraceOutOfRange { index: u32, len: usize },

    #[error("{0} trailing bytes after string table")]
    TrailingBytes(usize),
}
