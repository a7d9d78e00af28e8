//! Engine operations, grouped by command family. Every mutating method
//! follows the same shape: plan the mutation and its WAL record(s) under
//! the store's write lock, append durably, apply, then account for the
//! change (feed event, hot-key sample, counters).

pub mod hashes;
pub mod keys;
pub mod lists;
pub mod sets;
pub mod strings;
pub mod zsets;
