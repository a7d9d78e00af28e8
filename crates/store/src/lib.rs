//! In-memory typed keyspace for EmberDB.
//!
//! [`Keyspace`] owns five typed maps (string, hash, list, set, sorted set)
//! plus the TTL index. It is a plain data structure with no interior
//! locking; the engine wraps it in a single read-write lock and is the only
//! caller. Returned values are deep copies, so callers can never mutate
//! stored state through retained buffers.
//!
//! Expiration is lazy here: read paths treat an expired-but-unswept key as
//! absent without mutating anything, write paths purge it first, and the
//! engine's sweeper reclaims the rest.

pub mod hashes;
pub mod keyspace;
pub mod lists;
pub mod sets;
pub mod strings;
pub mod zset;
pub mod zsets;

pub use keyspace::{EntryType, Keyspace, ScanPage};
pub use lists::{linsert_plan, lrem_plan};
pub use strings::{format_f64, parse_f64, parse_i64};
pub use zset::{clamp_range, Score, ScoreBound, SortedSet};
