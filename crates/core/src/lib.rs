//! Shared foundation for EmberDB: the error taxonomy used across every
//! layer, byte-string key/value aliases, epoch-millisecond time helpers,
//! and the glob matcher backing `KEYS`, `SCAN`, and pattern subscriptions.

pub mod error;
pub mod glob;
pub mod types;

pub use error::{Error, Result};
pub use types::{now_ms, now_ns, Key, Value};
