//! Approximate hot-key tracking over a sliding window.
//!
//! Every keyed access appends a `(instant, key)` sample to a bounded ring;
//! `top(n)` aggregates the samples still inside the window. Recording is
//! O(1) amortized, aggregation O(window). The counts are approximate: once
//! the ring is full, older samples fall out even if still in the window.

use ember_core::Key;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct HotKeys {
    window: Duration,
    capacity: usize,
    samples: Mutex<VecDeque<(Instant, Key)>>,
}

impl HotKeys {
    pub fn new(capacity: usize, window: Duration) -> HotKeys {
        HotKeys {
            window,
            capacity: capacity.max(1),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one access.
    pub fn record(&self, key: &[u8]) {
        let now = Instant::now();
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back((now, key.to_vec()));
        // Trim anything that has aged out while we are here.
        while let Some((t, _)) = samples.front() {
            if now.duration_since(*t) > self.window {
                samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// The `n` most-accessed keys inside the window, hottest first.
    pub fn top(&self, n: usize) -> Vec<(Key, u64)> {
        let now = Instant::now();
        let samples = self.samples.lock();
        let mut counts: FxHashMap<&Key, u64> = FxHashMap::default();
        for (t, key) in samples.iter() {
            if now.duration_since(*t) <= self.window {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(Key, u64)> = counts
            .into_iter()
            .map(|(key, count)| (key.clone(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }
}
