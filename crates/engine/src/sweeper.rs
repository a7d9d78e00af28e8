//! Active TTL expiration.
//!
//! A background thread wakes on a fixed interval and runs a sampling
//! eviction loop in the style of the Redis active-expire cycle: sample a
//! handful of keys from the TTL index under the write lock, delete the
//! expired ones, and repeat while the expired ratio stays high. The
//! critical section is bounded to one sample batch per round, so writers
//! are never stalled for more than a small constant amount of work.

use crate::cdc::{ChangeFeed, ChangeKind};
use crate::stats::Stats;
use ember_core::now_ms;
use ember_store::Keyspace;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

/// Keys inspected per round.
const SAMPLE_LIMIT: usize = 20;
/// Rounds per wake.
const MAX_ROUNDS: usize = 4;
/// Keep sampling while at least this fraction of a round was expired.
const CONTINUE_RATIO: f64 = 0.25;

pub struct Sweeper {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Sweeper {
    /// Start the sweeper thread. `enabled` gates the sampling loop
    /// without stopping the thread (DEBUG SET-ACTIVE-EXPIRE).
    pub fn spawn(
        store: Arc<RwLock<Keyspace>>,
        feed: Arc<ChangeFeed>,
        stats: Arc<Stats>,
        interval: Duration,
        enabled: Arc<AtomicBool>,
    ) -> Sweeper {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("ember-sweeper".into())
            .spawn(move || run(store, feed, stats, interval, flag, enabled));
        match handle {
            Ok(handle) => Sweeper {
                handle: Some(handle),
                shutdown,
            },
            Err(e) => {
                error!(target: "ember::sweeper", error = %e, "failed to spawn sweeper");
                Sweeper {
                    handle: None,
                    shutdown,
                }
            }
        }
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    store: Arc<RwLock<Keyspace>>,
    feed: Arc<ChangeFeed>,
    stats: Arc<Stats>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    enabled: Arc<AtomicBool>,
) {
    let mut rng = rand::thread_rng();
    while !shutdown.load(Ordering::Acquire) {
        std::thread::sleep(interval);
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        if !enabled.load(Ordering::Acquire) {
            continue;
        }

        for _ in 0..MAX_ROUNDS {
            let now = now_ms();
            let (sampled, expired) = {
                let mut ks = store.write();
                ks.sweep_round(SAMPLE_LIMIT, now, &mut rng)
            };
            if !expired.is_empty() {
                stats.record_expired(expired.len() as u64);
                for key in &expired {
                    feed.publish(ChangeKind::Expire, key, None);
                }
                debug!(target: "ember::sweeper", sampled, expired = expired.len(), "sweep round");
            }
            if sampled == 0 || (expired.len() as f64) / (sampled as f64) < CONTINUE_RATIO {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweeper_reclaims_expired_keys() {
        let store = Arc::new(RwLock::new(Keyspace::new()));
        let feed = Arc::new(ChangeFeed::new(1024));
        let stats = Arc::new(Stats::new());

        {
            let mut ks = store.write();
            let now = now_ms();
            for i in 0..50 {
                let key = format!("doomed{}", i);
                ks.set(key.as_bytes(), b"v".to_vec(), now);
                ks.expire_at(key.as_bytes(), now + 30, now);
            }
            ks.set(b"survivor", b"v".to_vec(), now);
        }

        let mut sweeper = Sweeper::spawn(
            Arc::clone(&store),
            Arc::clone(&feed),
            Arc::clone(&stats),
            Duration::from_millis(10),
            Arc::new(AtomicBool::new(true)),
        );

        // Everything past-due should be gone within a few sweep cycles.
        std::thread::sleep(Duration::from_millis(400));
        sweeper.stop();

        let ks = store.read();
        let now = now_ms();
        assert_eq!(ks.dbsize(now), 1);
        assert!(ks.is_live(b"survivor", now));
        assert!(stats.snapshot().expired_keys >= 50);
        assert!(feed.recent(100).iter().any(|e| e.kind == ChangeKind::Expire));
    }

    #[test]
    fn test_stop_is_idempotent_and_prompt() {
        let store = Arc::new(RwLock::new(Keyspace::new()));
        let feed = Arc::new(ChangeFeed::new(16));
        let stats = Arc::new(Stats::new());
        let mut sweeper = Sweeper::spawn(
            store,
            feed,
            stats,
            Duration::from_millis(10),
            Arc::new(AtomicBool::new(true)),
        );
        sweeper.stop();
        sweeper.stop();
    }
}
