//! Engine counters surfaced through `INFO`.
//!
//! All counters use Relaxed ordering: they are observational metrics that
//! synchronize nothing, and the atomic ops rule out torn updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub struct Stats {
    started: Instant,
    started_unix: u64,
    reads: AtomicU64,
    writes: AtomicU64,
    expired_keys: AtomicU64,
    connections_accepted: AtomicU64,
    connections_current: AtomicU64,
    commands: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub started_unix: u64,
    pub reads: u64,
    pub writes: u64,
    pub expired_keys: u64,
    pub connections_accepted: u64,
    pub connections_current: u64,
    pub commands: u64,
}

impl Stats {
    pub fn new() -> Stats {
        let started_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Stats {
            started: Instant::now(),
            started_unix,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            expired_keys: AtomicU64::new(0),
            connections_accepted: AtomicU64::new(0),
            connections_current: AtomicU64::new(0),
            commands: AtomicU64::new(0),
        }
    }

    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, n: u64) {
        self.expired_keys.fetch_add(n, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.connections_current.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_current.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            started_unix: self.started_unix,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            expired_keys: self.expired_keys.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_current: self.connections_current.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Stats::new()
    }
}
