//! The EmberDB engine: single entry point for every mutation and query.
//!
//! The engine owns the keyspace behind one read-write lock, the WAL behind
//! its own mutex, the change feed, the hot-key tracker, the TTL sweeper,
//! and the snapshot directory. Every mutating operation follows the same
//! contract: build the WAL record(s), append them (durable before return),
//! then apply in memory, then do the bookkeeping. A failed append means
//! nothing was applied.

pub mod cdc;
pub mod config;
pub mod engine;
pub mod hotkeys;
pub mod ops;
pub mod replay;
pub mod snapshot;
pub mod stats;
pub mod sweeper;

pub use cdc::{ChangeEvent, ChangeFeed, ChangeKind};
pub use config::EngineConfig;
pub use engine::{Engine, TxnGuard};
pub use ops::strings::{SetOptions, SetOutcome, TtlChange};
pub use snapshot::{SnapshotEntry, SnapshotManager, SnapshotMeta};
pub use stats::{Stats, StatsSnapshot};
