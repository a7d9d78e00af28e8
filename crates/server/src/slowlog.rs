//! Slow-command log: a bounded ring of commands whose execution crossed
//! the configured threshold. Threshold and length are mutable at runtime
//! through `CONFIG SET`.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One recorded slow command.
#[derive(Debug, Clone)]
pub struct SlowLogEntry {
    pub id: u64,
    /// Unix seconds at execution time.
    pub unix_secs: i64,
    pub duration: Duration,
    pub peer: String,
    pub command: String,
    pub args: Vec<Vec<u8>>,
}

pub struct SlowLog {
    entries: Mutex<VecDeque<SlowLogEntry>>,
    next_id: AtomicU64,
    threshold: Mutex<Duration>,
    max_len: Mutex<usize>,
}

impl SlowLog {
    pub fn new(threshold: Duration, max_len: usize) -> SlowLog {
        SlowLog {
            entries: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(0),
            threshold: Mutex::new(threshold),
            max_len: Mutex::new(max_len.max(1)),
        }
    }

    pub fn threshold(&self) -> Duration {
        *self.threshold.lock()
    }

    pub fn set_threshold(&self, threshold: Duration) {
        *self.threshold.lock() = threshold;
    }

    pub fn max_len(&self) -> usize {
        *self.max_len.lock()
    }

    pub fn set_max_len(&self, max_len: usize) {
        *self.max_len.lock() = max_len.max(1);
        let cap = self.max_len();
        let mut entries = self.entries.lock();
        while entries.len() > cap {
            entries.pop_front();
        }
    }

    /// Record one execution if it crossed the threshold. Arguments are
    /// truncated to keep the ring small.
    pub fn observe(&self, duration: Duration, peer: &str, command: &str, args: &[Vec<u8>]) {
        if duration < self.threshold() {
            return;
        }
        let unix_secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let entry = SlowLogEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            unix_secs,
            duration,
            peer: peer.to_string(),
            command: command.to_string(),
            args: args
                .iter()
                .take(8)
                .map(|arg| {
                    let mut a = arg.clone();
                    a.truncate(64);
                    a
                })
                .collect(),
        };
        let cap = self.max_len();
        let mut entries = self.entries.lock();
        if entries.len() == cap {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent first, up to `n`.
    pub fn get(&self, n: usize) -> Vec<SlowLogEntry> {
        let entries = self.entries.lock();
        entries.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn reset(&self) {
        self.entries.lock().clear();
    }
}
