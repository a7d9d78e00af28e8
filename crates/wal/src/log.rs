//! Single-file append-only log with configurable sync policy.

use crate::record::{Record, HEADER_SIZE};
use ember_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// When appended bytes are forced to disk.
///
/// The engine's durability guarantee (a successful reply implies the
/// mutation's WAL bytes are on disk) holds only under `Always`. `Batched`
/// is an operator opt-out that trades a bounded window of recent writes
/// for throughput.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncPolicy {
    /// fdatasync after every append (default).
    Always,
    /// fdatasync every `batch_size` appends or `interval_ms`, whichever
    /// comes first.
    Batched { interval_ms: u64, batch_size: usize },
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::Always
    }
}

/// WAL configuration.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Path of the single log file.
    pub path: PathBuf,
    /// Sync policy for appends.
    pub sync: SyncPolicy,
}

impl WalConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WalConfig {
            path: path.into(),
            sync: SyncPolicy::default(),
        }
    }

    pub fn with_sync(mut self, sync: SyncPolicy) -> Self {
        self.sync = sync;
        self
    }
}

/// Append-only, CRC-checksummed log over a single file.
///
/// The caller serializes access (the engine holds this behind a mutex whose
/// critical section includes the fsync), so `&mut self` everywhere.
pub struct Wal {
    path: PathBuf,
    file: File,
    /// Length of the durable prefix plus any bytes written this process.
    offset: u64,
    sync: SyncPolicy,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl Wal {
    /// Open the log file, creating it (and parent directories) if absent.
    /// The write position is the current end of file; call [`Wal::read_all`]
    /// to replay and to trim any crash tail before appending.
    pub fn open(config: WalConfig) -> Result<Wal> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&config.path)?;
        let offset = file.seek(SeekFrom::End(0))?;

        debug!(target: "ember::wal", path = %config.path.display(), size = offset, "wal opened");

        Ok(Wal {
            path: config.path,
            file,
            offset,
            sync: config.sync,
            writes_since_sync: 0,
            last_sync: Instant::now(),
        })
    }

    /// Current file length in bytes.
    pub fn size(&self) -> u64 {
        self.offset
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Returns once the bytes are durable under the
    /// configured sync policy. On failure nothing is retried; the caller
    /// must treat the mutation as not applied.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let bytes = record.encode();
        self.write_and_sync(&bytes, 1)
    }

    /// Append several records contiguously with a single sync. A crash
    /// mid-batch leaves a tail that fails CRC and is discarded on the next
    /// [`Wal::read_all`], so after recovery either all records of the
    /// durable prefix are visible or none past it are.
    pub fn append_batch(&mut self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let total: usize = records.iter().map(Record::encoded_len).sum();
        let mut buf = Vec::with_capacity(total);
        for record in records {
            record.encode_into(&mut buf);
        }
        self.write_and_sync(&buf, records.len())
    }

    fn write_and_sync(&mut self, bytes: &[u8], count: usize) -> Result<()> {
        self.file.write_all(bytes).map_err(Error::Wal)?;
        self.offset += bytes.len() as u64;
        self.writes_since_sync += count;

        let due = match self.sync {
            SyncPolicy::Always => true,
            SyncPolicy::Batched {
                interval_ms,
                batch_size,
            } => {
                self.writes_since_sync >= batch_size
                    || self.last_sync.elapsed().as_millis() as u64 >= interval_ms
            }
        };
        if due {
            self.file.sync_data().map_err(Error::Wal)?;
            self.writes_since_sync = 0;
            self.last_sync = Instant::now();
        }
        Ok(())
    }

    /// Scan the file from byte 0 and return every intact record in order.
    ///
    /// The first header whose magic or CRC fails marks the crash tail: the
    /// file is truncated at the last-known-good offset (idempotent) and the
    /// records before it are returned.
    pub fn read_all(&mut self) -> Result<Vec<Record>> {
        let mut bytes = Vec::with_capacity(self.offset as usize);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut bytes)?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        let mut tail_error = None;
        while offset < bytes.len() {
            if bytes.len() - offset < HEADER_SIZE {
                tail_error = Some("short header at tail".to_string());
                break;
            }
            match Record::decode_at(&bytes, offset) {
                Ok((record, next)) => {
                    records.push(record);
                    offset = next;
                }
                Err(e) => {
                    tail_error = Some(e.to_string());
                    break;
                }
            }
        }

        if let Some(reason) = tail_error {
            let dropped = bytes.len() - offset;
            warn!(
                target: "ember::wal",
                offset,
                dropped_bytes = dropped,
                %reason,
                "discarding corrupt wal tail"
            );
            self.file.set_len(offset as u64).map_err(Error::Wal)?;
            self.file.sync_data().map_err(Error::Wal)?;
        }

        self.offset = offset as u64;
        self.file.seek(SeekFrom::Start(self.offset))?;
        info!(target: "ember::wal", records = records.len(), bytes = offset, "wal scan complete");
        Ok(records)
    }

    /// Atomically empty the file (FLUSHDB, snapshot restore).
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0).map_err(Error::Wal)?;
        self.file.sync_data().map_err(Error::Wal)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.offset = 0;
        self.writes_since_sync = 0;
        Ok(())
    }

    /// Force outstanding bytes to disk regardless of sync policy.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.writes_since_sync = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Flush outstanding buffers and sync. Used at shutdown.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Opcode;
    use tempfile::tempdir;

    fn open_wal(path: &Path) -> Wal {
        Wal::open(WalConfig::new(path)).unwrap()
    }

    fn set_record(key: &str, value: &str) -> Record {
        Record::with_value(Opcode::Set, key.as_bytes().to_vec(), value.as_bytes().to_vec())
    }

    #[test]
    fn test_append_then_read_all() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ember.wal");

        let mut wal = open_wal(&path);
        wal.append(&set_record("a", "1")).unwrap();
        wal.append(&set_record("b", "2")).unwrap();
        drop(wal);

        let mut wal = open_wal(&path);
        let records = wal.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, b"a");
        assert_eq!(records[1].key, b"b");
    }

    #[test]
    fn test_append_batch_single_contiguous_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ember.wal");

        let mut wal = open_wal(&path);
        let batch: Vec<Record> = (0..10)
            .map(|i| set_record(&format!("k{}", i), &format!("v{}", i)))
            .collect();
        wal.append_batch(&batch).unwrap();

        let records = wal.read_all().unwrap();
        assert_eq!(records, batch);
    }

    #[test]
    fn test_garbage_tail_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ember.wal");

        let mut wal = open_wal(&path);
        wal.append(&set_record("x", "1")).unwrap();
        wal.append(&set_record("y", "2")).unwrap();
        drop(wal);

        // Simulate a crash mid-append: arbitrary trailing garbage.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]).unwrap();
        drop(file);

        let mut wal = open_wal(&path);
        let records = wal.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].key, b"y");

        // Truncation happened at the last good offset.
        let expected: u64 = records.iter().map(|r| r.encoded_len() as u64).sum();
        assert_eq!(wal.size(), expected);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), expected);
    }

    #[test]
    fn test_partial_final_record_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ember.wal");

        let mut wal = open_wal(&path);
        wal.append(&set_record("keep", "me")).unwrap();
        let keep_len = wal.size();
        wal.append(&set_record("torn", "record")).unwrap();
        drop(wal);

        // Chop the final record in half.
        let full = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(keep_len + (full - keep_len) / 2).unwrap();
        drop(file);

        let mut wal = open_wal(&path);
        let records = wal.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, b"keep");
        assert_eq!(wal.size(), keep_len);
    }

    #[test]
    fn test_truncation_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ember.wal");

        let mut wal = open_wal(&path);
        wal.append(&set_record("a", "1")).unwrap();
        drop(wal);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"garbage").unwrap();
        drop(file);

        let mut wal = open_wal(&path);
        let first = wal.read_all().unwrap();
        let size_after_first = wal.size();
        drop(wal);

        let mut wal = open_wal(&path);
        let second = wal.read_all().unwrap();
        assert_eq!(first, second);
        assert_eq!(wal.size(), size_after_first);
    }

    #[test]
    fn test_truncate_empties_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ember.wal");

        let mut wal = open_wal(&path);
        wal.append(&set_record("a", "1")).unwrap();
        wal.truncate().unwrap();
        assert_eq!(wal.size(), 0);
        assert!(wal.read_all().unwrap().is_empty());

        // Appends continue to work after truncation.
        wal.append(&set_record("b", "2")).unwrap();
        let records = wal.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, b"b");
    }

    #[test]
    fn test_record_in_middle_corrupted_drops_suffix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ember.wal");

        let mut wal = open_wal(&path);
        wal.append(&set_record("first", "1")).unwrap();
        let good = wal.size();
        wal.append(&set_record("second", "2")).unwrap();
        wal.append(&set_record("third", "3")).unwrap();
        drop(wal);

        // Flip one byte inside the second record's body.
        let mut bytes = std::fs::read(&path).unwrap();
        let idx = good as usize + HEADER_SIZE + 2;
        bytes[idx] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let mut wal = open_wal(&path);
        let records = wal.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, b"first");
    }

    #[test]
    fn test_batched_policy_appends_survive_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ember.wal");

        let config = WalConfig::new(&path).with_sync(SyncPolicy::Batched {
            interval_ms: 60_000,
            batch_size: 1_000,
        });
        let mut wal = Wal::open(config).unwrap();
        wal.append(&set_record("a", "1")).unwrap();
        wal.close().unwrap();

        let mut wal = open_wal(&path);
        assert_eq!(wal.read_all().unwrap().len(), 1);
    }
}
