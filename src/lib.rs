//! # EmberDB
//!
//! An in-memory, single-node key-value database speaking a
//! Redis-compatible wire protocol (RESP2), with durability through a
//! checksummed write-ahead log.
//!
//! Every mutating command is appended to the WAL and fsynced before it is
//! applied in memory or acknowledged, so an acknowledged write survives a
//! crash. On startup the log is replayed; a corrupt tail (from a crash
//! mid-append) is detected by CRC and truncated away. Around that core:
//! five value types (string, hash, list, set, sorted set), TTL expiration
//! (lazy plus a sampling sweeper), point-in-time snapshots of the string
//! keyspace, a bounded change feed with live subscriptions, pub/sub,
//! MULTI/EXEC transactions, ACLs, a slow-log, and per-client rate limits.
//!
//! # Quick start
//!
//! ```no_run
//! use emberdb::{Engine, EngineConfig, Server, ServerConfig};
//! use std::sync::Arc;
//!
//! fn main() -> emberdb::Result<()> {
//!     let engine = Arc::new(Engine::open(EngineConfig::new("data/ember.wal"))?);
//!     let server = Server::bind(ServerConfig::new("127.0.0.1:6379"), Arc::clone(&engine))?;
//!     server.run();
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! The [`Engine`] is usable embedded, without the server: every command
//! the wire protocol exposes is a method on it.

pub use ember_core::{Error, Result};
pub use ember_engine::{
    ChangeEvent, ChangeFeed, ChangeKind, Engine, EngineConfig, SetOptions, SetOutcome,
    SnapshotMeta, StatsSnapshot, TtlChange,
};
pub use ember_server::{
    AclPerms, AclUser, Frame, RateLimitConfig, RespReader, RespWriter, Server, ServerConfig,
    ServerHandle, TlsConfig,
};
pub use ember_store::{EntryType, ScoreBound};
pub use ember_wal::{Opcode, Record, SyncPolicy, Wal, WalConfig};
