//! Engine facade: construction, recovery, shared write/read plumbing,
//! transactions, FLUSHDB, and the snapshot surface.

use crate::cdc::{ChangeEvent, ChangeFeed, ChangeKind};
use crate::config::EngineConfig;
use crate::hotkeys::HotKeys;
use crate::replay;
use crate::snapshot::{SnapshotEntry, SnapshotManager, SnapshotMeta};
use crate::stats::{Stats, StatsSnapshot};
use crate::sweeper::Sweeper;
use ember_core::{now_ms, Key, Result};
use ember_store::Keyspace;
use ember_wal::{Opcode, Record, Wal};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{error, info};

/// Guard serializing MULTI/EXEC bodies. Held by a connection from EXEC
/// start to finish; individual commands inside still take the store lock
/// per operation.
pub type TxnGuard<'a> = MutexGuard<'a, ()>;

pub struct Engine {
    pub(crate) store: Arc<RwLock<Keyspace>>,
    pub(crate) wal: Mutex<Wal>,
    txn: Mutex<()>,
    pub(crate) feed: Arc<ChangeFeed>,
    pub(crate) hotkeys: Arc<HotKeys>,
    pub(crate) stats: Arc<Stats>,
    snapshots: SnapshotManager,
    sweeper: Mutex<Option<Sweeper>>,
    active_expire: Arc<AtomicBool>,
}

impl Engine {
    /// Open the WAL at the configured path, replay it, and start the
    /// sweeper. The returned engine is ready to serve.
    pub fn open(config: EngineConfig) -> Result<Engine> {
        let mut wal = Wal::open(config.wal.clone())?;
        let records = wal.read_all()?;

        let mut ks = Keyspace::new();
        let replayed = replay::replay(&mut ks, &records, now_ms());
        info!(
            target: "ember::engine",
            applied = replayed.applied,
            skipped = replayed.skipped,
            wal_bytes = wal.size(),
            "recovery complete"
        );

        let store = Arc::new(RwLock::new(ks));
        let feed = Arc::new(ChangeFeed::new(config.cdc_capacity));
        let stats = Arc::new(Stats::new());
        let hotkeys = Arc::new(HotKeys::new(config.hotkey_capacity, config.hotkey_window));
        let active_expire = Arc::new(AtomicBool::new(true));

        let sweeper = Sweeper::spawn(
            Arc::clone(&store),
            Arc::clone(&feed),
            Arc::clone(&stats),
            config.sweep_interval,
            Arc::clone(&active_expire),
        );

        Ok(Engine {
            store,
            wal: Mutex::new(wal),
            txn: Mutex::new(()),
            feed,
            hotkeys,
            stats,
            snapshots: SnapshotManager::new(config.snapshot_dir),
            sweeper: Mutex::new(Some(sweeper)),
            active_expire,
        })
    }

    /// Stop the sweeper and sync the WAL. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        if let Err(e) = self.wal.lock().flush() {
            error!(target: "ember::engine", error = %e, "wal flush at shutdown failed");
        }
        info!(target: "ember::engine", "engine shut down");
    }

    // ------------------------------------------------------------------
    // Shared plumbing used by the operation modules
    // ------------------------------------------------------------------

    /// Append records durably; the caller already holds the store's write
    /// lock so WAL order matches visibility order.
    pub(crate) fn append_wal(&self, records: &[Record]) -> Result<()> {
        let mut wal = self.wal.lock();
        match records {
            [] => Ok(()),
            [one] => wal.append(one),
            many => wal.append_batch(many),
        }
    }

    /// Post-apply bookkeeping for one mutated key.
    pub(crate) fn note_write(&self, kind: ChangeKind, key: &[u8], value: Option<&[u8]>) {
        self.feed.publish(kind, key, value);
        self.hotkeys.record(key);
        self.stats.record_write();
    }

    /// Bookkeeping for a keyed read.
    pub(crate) fn note_read(&self, key: &[u8]) {
        self.hotkeys.record(key);
        self.stats.record_read();
    }

    /// Bookkeeping for a keyspace-wide read (KEYS, DBSIZE, SCAN).
    pub(crate) fn note_scan(&self) {
        self.stats.record_read();
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Enter the transaction critical section. Queued commands executed
    /// under the returned guard cannot interleave with another EXEC body.
    pub fn exec_begin(&self) -> TxnGuard<'_> {
        self.txn.lock()
    }

    // ------------------------------------------------------------------
    // FLUSHDB / FLUSHALL
    // ------------------------------------------------------------------

    /// Empty every map and truncate the WAL. Idempotent; leaves the WAL at
    /// size zero.
    pub fn flushdb(&self) -> Result<()> {
        let mut ks = self.store.write();
        self.wal.lock().truncate()?;
        ks.flush();
        self.feed.publish(ChangeKind::FlushDb, b"", None);
        self.stats.record_write();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Dump the live string keyspace to a new snapshot.
    pub fn snapshot_create(&self, id: Option<String>) -> Result<SnapshotMeta> {
        let entries = {
            let ks = self.store.read();
            ks.string_entries(now_ms())
                .into_iter()
                .map(|(key, value, deadline)| SnapshotEntry {
                    key,
                    value,
                    expire_ms: deadline.unwrap_or(0),
                })
                .collect::<Vec<_>>()
        };
        self.snapshots.create(id, &entries)
    }

    pub fn snapshot_list(&self) -> Result<Vec<SnapshotMeta>> {
        self.snapshots.list()
    }

    pub fn snapshot_delete(&self, id: &str) -> Result<bool> {
        self.snapshots.delete(id)
    }

    /// Replace the whole keyspace with a snapshot's string entries and
    /// re-seed the WAL so a later crash replays the restored state.
    pub fn snapshot_restore(&self, id: &str) -> Result<usize> {
        let entries = self.snapshots.load(id)?;
        let now = now_ms();

        let mut ks = self.store.write();
        let mut wal = self.wal.lock();
        wal.truncate()?;
        ks.flush();

        let mut records = Vec::with_capacity(entries.len());
        let mut restored = 0usize;
        for entry in &entries {
            if entry.expire_ms != 0 && entry.expire_ms <= now {
                continue; // expired while on disk
            }
            if entry.expire_ms != 0 {
                ks.set_with_expiry(&entry.key, entry.value.clone(), entry.expire_ms, now);
                records.push(Record::with_expiry(
                    Opcode::SetTtl,
                    entry.key.clone(),
                    entry.value.clone(),
                    entry.expire_ms,
                ));
            } else {
                ks.set(&entry.key, entry.value.clone(), now);
                records.push(Record::with_value(
                    Opcode::Set,
                    entry.key.clone(),
                    entry.value.clone(),
                ));
            }
            restored += 1;
        }
        wal.append_batch(&records)?;

        self.feed.publish(ChangeKind::Restore, id.as_bytes(), None);
        self.stats.record_write();
        info!(target: "ember::engine", id, restored, "snapshot restored");
        Ok(restored)
    }

    // ------------------------------------------------------------------
    // Observability surface
    // ------------------------------------------------------------------

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn wal_size(&self) -> u64 {
        self.wal.lock().size()
    }

    pub fn changes_recent(&self, n: usize) -> Vec<ChangeEvent> {
        self.feed.recent(n)
    }

    pub fn changes_since(&self, id: u64) -> Vec<ChangeEvent> {
        self.feed.since(id)
    }

    pub fn changes_subscribe(&self, buffer: usize) -> (u64, Receiver<ChangeEvent>) {
        self.feed.subscribe(buffer)
    }

    pub fn changes_unsubscribe(&self, sub_id: u64) -> bool {
        self.feed.unsubscribe(sub_id)
    }

    pub fn hot_keys(&self, n: usize) -> Vec<(Key, u64)> {
        self.hotkeys.top(n)
    }

    /// Toggle the active sweeper (DEBUG SET-ACTIVE-EXPIRE). Lazy expiry on
    /// read is unaffected.
    pub fn set_active_expire(&self, enabled: bool) {
        self.active_expire.store(enabled, Ordering::Release);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
