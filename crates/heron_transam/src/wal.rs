//! Durability-log boundary consumed by the identifier allocator.
//!
//! `append` must not return until the record is recoverable after a crash;
//! the object-id batch reservation depends on that guarantee.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use heron_common::config::SyncMode;
use heron_common::error::{TransamError, TransamResult};
use heron_common::types::{Lsn, ObjectId, TransactionId};

/// Log format version for compatibility checks.
pub const LOG_FORMAT_VERSION: u32 = 1;

/// Magic bytes at the start of the log file.
pub const LOG_MAGIC: &[u8; 4] = b"HRNT";

/// Header: magic (4) + format version (4).
pub const LOG_HEADER_SIZE: usize = 8;

/// A single durability record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    /// Installation bootstrap: the initial allocator seeds.
    Init {
        next_xid: TransactionId,
        next_oid: ObjectId,
    },
    /// Object ids below `boundary` are reserved; after a crash none of
    /// them may ever be reissued, consumed or not.
    OidBoundary { boundary: ObjectId },
    /// Transaction id high-water mark at checkpoint time.
    XidHighWater { next_xid: TransactionId },
}

/// Append-only durability log.
pub trait DurabilityLog: Send + Sync {
    /// Append a record. On return the record is recoverable after a crash
    /// (subject to the log's sync mode).
    fn append(&self, record: &LogRecord) -> TransamResult<Lsn>;

    /// Every record in append order, for recovery replay.
    fn records(&self) -> TransamResult<Vec<LogRecord>>;
}

// ---------------------------------------------------------------------------
// In-memory log
// ---------------------------------------------------------------------------

/// In-memory log for tests and throwaway installations. `fail_next_append`
/// injects a failure to exercise the allocator's no-advance-on-failure
/// contract.
#[derive(Default)]
pub struct MemLog {
    records: Mutex<Vec<LogRecord>>,
    fail_next: AtomicBool,
}

impl MemLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_append(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl DurabilityLog for MemLog {
    fn append(&self, record: &LogRecord) -> TransamResult<Lsn> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransamError::Log("injected append failure".into()));
        }
        let mut records = self.records.lock();
        records.push(record.clone());
        Ok(Lsn(records.len() as u64 - 1))
    }

    fn records(&self) -> TransamResult<Vec<LogRecord>> {
        Ok(self.records.lock().clone())
    }
}

// ---------------------------------------------------------------------------
// File-backed log
// ---------------------------------------------------------------------------

/// Append-only file log. Record framing is `[len:4][crc32:4][payload]`,
/// payload bincode-encoded. Replay stops at the first torn or corrupt
/// frame, so a crash mid-append loses at most the record being written.
pub struct FileLog {
    inner: Mutex<BufWriter<File>>,
    path: PathBuf,
    lsn: AtomicU64,
    sync_mode: SyncMode,
}

impl FileLog {
    pub fn open(path: &Path, sync_mode: SyncMode) -> TransamResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = BufWriter::new(file);
        let existing = if is_new {
            writer.write_all(LOG_MAGIC)?;
            writer.write_all(&LOG_FORMAT_VERSION.to_le_bytes())?;
            writer.flush()?;
            writer.get_ref().sync_data()?;
            0
        } else {
            Self::read_from(path)?.len() as u64
        };

        Ok(Self {
            inner: Mutex::new(writer),
            path: path.to_path_buf(),
            lsn: AtomicU64::new(existing),
            sync_mode,
        })
    }

    /// Scan a log file and return every intact record in order.
    pub fn read_from(path: &Path) -> TransamResult<Vec<LogRecord>> {
        let mut file = File::open(path)?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        if raw.len() < LOG_HEADER_SIZE || &raw[0..4] != LOG_MAGIC {
            return Err(TransamError::Log(format!(
                "{} is not a durability log (bad magic)",
                path.display()
            )));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&raw[4..8]);
        let version = u32::from_le_bytes(version);
        if version != LOG_FORMAT_VERSION {
            return Err(TransamError::Log(format!(
                "durability log format version {version}, expected {LOG_FORMAT_VERSION}"
            )));
        }

        let mut records = Vec::new();
        let mut pos = LOG_HEADER_SIZE;
        while pos + 8 <= raw.len() {
            let mut len = [0u8; 4];
            len.copy_from_slice(&raw[pos..pos + 4]);
            let len = u32::from_le_bytes(len) as usize;
            let mut crc = [0u8; 4];
            crc.copy_from_slice(&raw[pos + 4..pos + 8]);
            let crc = u32::from_le_bytes(crc);

            let start = pos + 8;
            if start + len > raw.len() {
                break; // torn tail
            }
            let payload = &raw[start..start + len];
            if crc32fast::hash(payload) != crc {
                break; // torn or corrupt tail
            }
            let record = bincode::deserialize(payload)
                .map_err(|e| TransamError::Serialization(e.to_string()))?;
            records.push(record);
            pos = start + len;
        }
        Ok(records)
    }
}

impl DurabilityLog for FileLog {
    fn append(&self, record: &LogRecord) -> TransamResult<Lsn> {
        let payload =
            bincode::serialize(record).map_err(|e| TransamError::Serialization(e.to_string()))?;
        let crc = crc32fast::hash(&payload);

        let mut inner = self.inner.lock();
        inner.write_all(&(payload.len() as u32).to_le_bytes())?;
        inner.write_all(&crc.to_le_bytes())?;
        inner.write_all(&payload)?;
        inner.flush()?;
        match self.sync_mode {
            SyncMode::None => {}
            SyncMode::FSync => inner.get_ref().sync_data()?,
        }
        Ok(Lsn(self.lsn.fetch_add(1, Ordering::SeqCst)))
    }

    fn records(&self) -> TransamResult<Vec<LogRecord>> {
        // Drain buffered frames before re-reading the file.
        self.inner.lock().flush()?;
        Self::read_from(&self.path)
    }
}
