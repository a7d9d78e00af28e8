//! Write-ahead log for EmberDB.
//!
//! Every state-mutating command is serialized into a binary record and
//! appended here **before** the corresponding in-memory update. On restart
//! the log is replayed to reconstruct the keyspace, so no acknowledged
//! write is lost. Corrupted tail bytes (a crash mid-append) are detected by
//! CRC and truncated away; every record before the corruption survives.
//!
//! ## Record format
//!
//! Little-endian, 24-byte header followed by key and value bytes:
//!
//! ```text
//! magic:      u16 = 0xFD1B    per-record marker, aids resync
//! opcode:     u8
//! reserved:   u8  = 0
//! key_len:    u32
//! value_len:  u32
//! expire_ms:  i64             absolute epoch-ms; 0 means "unset"
//! crc32:      u32             over the 20 header bytes above + key + value
//! key:        key_len bytes
//! value:      value_len bytes
//! ```
//!
//! Multi-argument operations pack their extra operands into the value field
//! (see the `payload` module); the layouts are part of the on-disk format.

pub mod log;
pub mod payload;
pub mod record;

pub use log::{SyncPolicy, Wal, WalConfig};
pub use record::{Opcode, Record, HEADER_SIZE, RECORD_MAGIC};
