//! Export and import of [`MetricsSeries`] profile files.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::api::error::Result;
use crate::api::record::AllocationRecord;
use crate::api::region::{AllocatorType, Region};
use crate::core::tls::UntrackedScope;
use crate::profile::format::{
    ProfileFormatError, MAGIC, NO_STACKTRACE, RECORD_LEN, SNAPSHOT_HEADER_LEN, VERSION,
};
use crate::scene::series::{MetricsSeries, Snapshot, SnapshotCounters};

/// Reads and writes the binary profile format.
///
/// All work happens with allocation tracking suspended on the calling
/// thread, so buffers used here never show up in the profile being written.
pub struct ProfileSerializer;

impl ProfileSerializer {
    /// Write `series` to `path`.
    ///
    /// The file is written next to its destination under a temporary name
    /// and renamed into place once complete; a failed export leaves any
    /// existing file at `path` untouched.
    pub fn export(series: &MetricsSeries, path: impl AsRef<Path>) -> Result<()> {
        let _untracked = UntrackedScope::new();
        let path = path.as_ref();
        let tmp = temp_path(path);

        let written = File::create(&tmp).and_then(|file| {
            let mut writer = BufWriter::new(file);
            Self::write_to(series, &mut writer)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()
        });
        if let Err(err) = written.and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            log::warn!("memscene: failed to export profile to {}: {err}", path.display());
            return Err(err.into());
        }

        log::info!(
            "memscene: exported scene '{}' ({} snapshots) to {}",
            series.scene_name(),
            series.len(),
            path.display()
        );
        Ok(())
    }

    /// Read a series from `path`.
    pub fn import(path: impl AsRef<Path>) -> Result<MetricsSeries> {
        let _untracked = UntrackedScope::new();
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        match Self::from_bytes(&bytes) {
            Ok(series) => {
                log::info!(
                    "memscene: imported scene '{}' ({} snapshots) from {}",
                    series.scene_name(),
                    series.len(),
                    path.display()
                );
                Ok(series)
            }
            Err(err) => {
                log::warn!("memscene: rejected profile {}: {err}", path.display());
                Err(err.into())
            }
        }
    }

    /// Encode `series` into `writer`.
    pub fn write_to<W: Write>(series: &MetricsSeries, writer: &mut W) -> io::Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        write_str(writer, series.scene_name())?;
        writer.write_all(&series.start_time().to_le_bytes())?;

        writer.write_all(&(series.len() as u64).to_le_bytes())?;
        for snapshot in series.snapshots() {
            let c = &snapshot.counters;
            writer.write_all(&snapshot.timestamp.to_le_bytes())?;
            for value in [
                c.total_allocations,
                c.total_frees,
                c.alive_count,
                c.frame_allocations,
                c.live_bytes,
            ] {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.write_all(&(snapshot.records.len() as u64).to_le_bytes())?;
            for record in &snapshot.records {
                writer.write_all(&encode_record(record))?;
            }
        }

        writer.write_all(&(series.stacktraces().len() as u32).to_le_bytes())?;
        for stack in series.stacktraces() {
            write_str(writer, stack)?;
        }
        Ok(())
    }

    /// Encode `series` into a new buffer.
    ///
    /// Fails only when a string does not fit the format's `u32` length
    /// prefix.
    pub fn to_bytes(series: &MetricsSeries) -> Result<Vec<u8>> {
        let _untracked = UntrackedScope::new();
        let mut out = Vec::with_capacity(
            16 + series.scene_name().len()
                + series.len() * SNAPSHOT_HEADER_LEN
                + series.record_count() * RECORD_LEN,
        );
        Self::write_to(series, &mut out)?;
        Ok(out)
    }

    /// Decode a series from `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<MetricsSeries, ProfileFormatError> {
        let _untracked = UntrackedScope::new();
        let mut reader = ByteReader::new(bytes);

        let magic = reader.array::<4>()?;
        if magic != MAGIC {
            return Err(ProfileFormatError::BadMagic(magic));
        }
        let version = reader.u32()?;
        if version != VERSION {
            return Err(ProfileFormatError::UnsupportedVersion { found: version });
        }
        let scene_name = reader.string()?;
        let start_time = reader.u64()?;

        let snapshot_count = reader.u64()?;
        let mut snapshots =
            Vec::with_capacity(reader.capacity_hint(snapshot_count, SNAPSHOT_HEADER_LEN));
        for _ in 0..snapshot_count {
            snapshots.push(read_snapshot(&mut reader)?);
        }

        let string_count = reader.u32()?;
        let mut stacktraces = Vec::with_capacity(reader.capacity_hint(string_count as u64, 4));
        for _ in 0..string_count {
            stacktraces.push(reader.string()?);
        }

        if reader.remaining() != 0 {
            return Err(ProfileFormatError::TrailingBytes(reader.remaining()));
        }

        MetricsSeries::from_parts(scene_name, start_time, snapshots, stacktraces)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn string_len(len: usize) -> io::Result<u32> {
    u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string longer than u32::MAX"))
}

fn write_str<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    let len = string_len(value.len())?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(value.as_bytes())
}

fn encode_record(record: &AllocationRecord) -> [u8; RECORD_LEN] {
    let mut buf = [0u8; RECORD_LEN];
    buf[0..8].copy_from_slice(&(record.address as u64).to_le_bytes());
    buf[8..16].copy_from_slice(&(record.size as u64).to_le_bytes());
    buf[16] = record.region.ordinal();
    buf[17] = record.allocator_type.ordinal();
    buf[18..26].copy_from_slice(&record.thread_id_hash.to_le_bytes());
    buf[26..34].copy_from_slice(&record.timestamp.to_le_bytes());
    buf[34..38].copy_from_slice(&record.stacktrace.unwrap_or(NO_STACKTRACE).to_le_bytes());
    buf
}

fn read_snapshot(reader: &mut ByteReader<'_>) -> std::result::Result<Snapshot, ProfileFormatError> {
    let timestamp = reader.u64()?;
    let counters = SnapshotCounters {
        total_allocations: reader.u64()?,
        total_frees: reader.u64()?,
        alive_count: reader.u64()?,
        frame_allocations: reader.u64()?,
        live_bytes: reader.u64()?,
    };
    let record_count = reader.u64()?;
    let mut records = Vec::with_capacity(reader.capacity_hint(record_count, RECORD_LEN));
    for _ in 0..record_count {
        records.push(read_record(reader)?);
    }
    Ok(Snapshot {
        timestamp,
        counters,
        records,
    })
}

fn read_record(
    reader: &mut ByteReader<'_>,
) -> std::result::Result<AllocationRecord, ProfileFormatError> {
    let address = reader.u64()?;
    let address =
        usize::try_from(address).map_err(|_| ProfileFormatError::AddressOutOfRange(address))?;
    let size = reader.u64()?;
    let size = usize::try_from(size).map_err(|_| ProfileFormatError::SizeOutOfRange(size))?;
    let region = reader.u8()?;
    let region = Region::from_ordinal(region).ok_or(ProfileFormatError::InvalidRegion(region))?;
    let allocator = reader.u8()?;
    let allocator_type = AllocatorType::from_ordinal(allocator)
        .ok_or(ProfileFormatError::InvalidAllocatorType(allocator))?;
    let thread_id_hash = reader.u64()?;
    let timestamp = reader.u64()?;
    let stacktrace = match reader.u32()? {
        NO_STACKTRACE => None,
        index => Some(index),
    };
    Ok(AllocationRecord {
        address,
        size,
        region,
        allocator_type,
        thread_id_hash,
        timestamp,
        stacktrace,
    })
}

/// Bounds-checked little-endian cursor.
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Capacity to reserve for `count` items of at least `min_len` bytes,
    /// never more than the remaining input could hold.
    fn capacity_hint(&self, count: u64, min_len: usize) -> usize {
        let fits = (self.remaining() / min_len.max(1)) as u64;
        count.min(fits) as usize
    }

    fn take(&mut self, len: usize) -> std::result::Result<&'a [u8], ProfileFormatError> {
        if len > self.remaining() {
            return Err(ProfileFormatError::Truncated {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> std::result::Result<[u8; N], ProfileFormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> std::result::Result<u8, ProfileFormatError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> std::result::Result<u32, ProfileFormatError> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> std::result::Result<u64, ProfileFormatError> {
        self.array().map(u64::from_le_bytes)
    }

    fn string(&mut self) -> std::result::Result<String, ProfileFormatError> {
        let len = self.u32()? as usize;
        let offset = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProfileFormatError::InvalidUtf8 { offset })
    }
}
