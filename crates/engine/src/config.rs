//! Engine configuration.

use ember_wal::{SyncPolicy, WalConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for [`crate::Engine`].
///
/// Defaults favour durability: fsync on every append, a 100 ms sweep
/// cadence, and a 50k-event change feed.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// WAL file path and sync policy.
    pub wal: WalConfig,
    /// Directory for snapshots; defaults to `snapshots/` beside the WAL.
    pub snapshot_dir: PathBuf,
    /// Sweeper wake interval.
    pub sweep_interval: Duration,
    /// Change-feed ring capacity.
    pub cdc_capacity: usize,
    /// Hot-key tracker: retained access samples.
    pub hotkey_capacity: usize,
    /// Hot-key tracker: sliding window length.
    pub hotkey_window: Duration,
}

impl EngineConfig {
    /// Config rooted at `wal_path`, everything else at defaults.
    pub fn new(wal_path: impl AsRef<Path>) -> EngineConfig {
        let wal_path = wal_path.as_ref().to_path_buf();
        let snapshot_dir = wal_path
            .parent()
            .map(|parent| parent.join("snapshots"))
            .unwrap_or_else(|| PathBuf::from("snapshots"));
        EngineConfig {
            wal: WalConfig::new(wal_path),
            snapshot_dir,
            sweep_interval: Duration::from_millis(100),
            cdc_capacity: 50_000,
            hotkey_capacity: 10_000,
            hotkey_window: Duration::from_secs(60),
        }
    }

    pub fn with_sync(mut self, sync: SyncPolicy) -> Self {
        self.wal.sync = sync;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_cdc_capacity(mut self, capacity: usize) -> Self {
        self.cdc_capacity = capacity;
        self
    }
}
