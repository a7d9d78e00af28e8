//! The typed keyspace and its generic key operations.

use crate::zset::SortedSet;
use ember_core::glob::glob_match;
use ember_core::{Error, Key, Result};
use rand::seq::IteratorRandom;
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// The five live value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    String,
    Hash,
    List,
    Set,
    ZSet,
}

impl EntryType {
    /// Wire name as reported by `TYPE`.
    pub fn name(&self) -> &'static str {
        match self {
            EntryType::String => "string",
            EntryType::Hash => "hash",
            EntryType::List => "list",
            EntryType::Set => "set",
            EntryType::ZSet => "zset",
        }
    }
}

/// One page of a `SCAN` traversal.
#[derive(Debug, Clone)]
pub struct ScanPage {
    /// Cursor to pass to the next call; 0 means the traversal is complete.
    pub cursor: u64,
    pub keys: Vec<Key>,
}

/// The keyspace: five typed maps plus the TTL index.
///
/// A key lives in at most one typed map at a time. The TTL index maps keys
/// to absolute epoch-ms deadlines and is the single source of truth for
/// expiration across all types.
#[derive(Debug, Default)]
pub struct Keyspace {
    pub(crate) strings: FxHashMap<Key, Vec<u8>>,
    pub(crate) hashes: FxHashMap<Key, FxHashMap<Vec<u8>, Vec<u8>>>,
    pub(crate) lists: FxHashMap<Key, VecDeque<Vec<u8>>>,
    pub(crate) sets: FxHashMap<Key, FxHashSet<Vec<u8>>>,
    pub(crate) zsets: FxHashMap<Key, SortedSet>,
    pub(crate) expires: FxHashMap<Key, i64>,
}

impl Keyspace {
    pub fn new() -> Keyspace {
        Keyspace::default()
    }

    // ------------------------------------------------------------------
    // Expiry plumbing shared by every operation
    // ------------------------------------------------------------------

    /// Whether `key` carries a deadline that has passed.
    pub(crate) fn is_expired(&self, key: &[u8], now_ms: i64) -> bool {
        matches!(self.expires.get(key), Some(&deadline) if deadline <= now_ms)
    }

    /// Whether `key` holds a live (non-expired) entry of any type.
    pub fn is_live(&self, key: &[u8], now_ms: i64) -> bool {
        self.holds_key(key) && !self.is_expired(key, now_ms)
    }

    fn holds_key(&self, key: &[u8]) -> bool {
        self.strings.contains_key(key)
            || self.hashes.contains_key(key)
            || self.lists.contains_key(key)
            || self.sets.contains_key(key)
            || self.zsets.contains_key(key)
    }

    /// Drop an expired key before a write touches it. Write paths hold the
    /// exclusive lock, so mutation is safe here; read paths never call this.
    pub(crate) fn purge_if_expired(&mut self, key: &[u8], now_ms: i64) {
        if self.is_expired(key, now_ms) {
            self.remove_key(key);
        }
    }

    /// Remove `key` from whichever typed map holds it and from the TTL
    /// index. Returns true when anything was removed.
    pub fn remove_key(&mut self, key: &[u8]) -> bool {
        let held = self.strings.remove(key).is_some()
            || self.hashes.remove(key).is_some()
            || self.lists.remove(key).is_some()
            || self.sets.remove(key).is_some()
            || self.zsets.remove(key).is_some();
        self.expires.remove(key);
        held
    }

    /// Guard for type-specific operations: the key must be absent or hold
    /// `expected`, otherwise the operation fails with `WrongType`. Expired
    /// entries count as absent.
    pub fn check_type(&self, key: &[u8], expected: EntryType, now_ms: i64) -> Result<()> {
        if self.is_expired(key, now_ms) {
            return Ok(());
        }
        match self.type_of_raw(key) {
            None => Ok(()),
            Some(t) if t == expected => Ok(()),
            Some(_) => Err(Error::WrongType),
        }
    }

    fn type_of_raw(&self, key: &[u8]) -> Option<EntryType> {
        if self.strings.contains_key(key) {
            Some(EntryType::String)
        } else if self.hashes.contains_key(key) {
            Some(EntryType::Hash)
        } else if self.lists.contains_key(key) {
            Some(EntryType::List)
        } else if self.sets.contains_key(key) {
            Some(EntryType::Set)
        } else if self.zsets.contains_key(key) {
            Some(EntryType::ZSet)
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Generic key operations
    // ------------------------------------------------------------------

    /// Delete keys; returns how many existed.
    pub fn del(&mut self, keys: &[Key], now_ms: i64) -> usize {
        keys.iter()
            .filter(|key| {
                let live = self.is_live(key, now_ms);
                self.remove_key(key);
                live
            })
            .count()
    }

    /// Count how many of `keys` exist (counting duplicates per Redis).
    pub fn exists(&self, keys: &[Key], now_ms: i64) -> usize {
        keys.iter().filter(|key| self.is_live(key, now_ms)).count()
    }

    /// Set an absolute expiration deadline. Returns false when the key
    /// does not exist.
    pub fn expire_at(&mut self, key: &[u8], deadline_ms: i64, now_ms: i64) -> bool {
        self.purge_if_expired(key, now_ms);
        if !self.holds_key(key) {
            return false;
        }
        if deadline_ms <= now_ms {
            // Already past due: expiring with a past deadline deletes.
            self.remove_key(key);
        } else {
            self.expires.insert(key.to_vec(), deadline_ms);
        }
        true
    }

    /// Clear a key's deadline. Returns true when a deadline was removed.
    pub fn persist(&mut self, key: &[u8], now_ms: i64) -> bool {
        if !self.is_live(key, now_ms) {
            return false;
        }
        self.expires.remove(key).is_some()
    }

    /// Remaining lifetime in milliseconds: `None` when the key is absent,
    /// `Some(None)` when it has no deadline.
    #[allow(clippy::option_option)]
    pub fn ttl_ms(&self, key: &[u8], now_ms: i64) -> Option<Option<i64>> {
        if !self.is_live(key, now_ms) {
            return None;
        }
        Some(self.expires.get(key).map(|deadline| deadline - now_ms))
    }

    /// The key's current deadline, if any (snapshot support).
    pub fn deadline_ms(&self, key: &[u8]) -> Option<i64> {
        self.expires.get(key).copied()
    }

    /// Live type of a key.
    pub fn type_of(&self, key: &[u8], now_ms: i64) -> Option<EntryType> {
        if self.is_expired(key, now_ms) {
            return None;
        }
        self.type_of_raw(key)
    }

    /// All live keys matching `pattern`.
    pub fn keys(&self, pattern: &[u8], now_ms: i64) -> Vec<Key> {
        self.iter_live_keys(now_ms)
            .filter(|key| glob_match(pattern, key))
            .map(|key| key.to_vec())
            .collect()
    }

    /// Cursor-based traversal. The cursor is an offset into the sorted
    /// list of live keys: stable enough that every key present for the
    /// whole traversal is returned at least once.
    pub fn scan(&self, cursor: u64, pattern: Option<&[u8]>, count: usize, now_ms: i64) -> ScanPage {
        let mut all: Vec<&Key> = self.iter_live_keys(now_ms).collect();
        all.sort_unstable();

        let start = cursor as usize;
        if start >= all.len() {
            return ScanPage {
                cursor: 0,
                keys: Vec::new(),
            };
        }
        let end = (start + count.max(1)).min(all.len());
        let keys = all[start..end]
            .iter()
            .filter(|key| pattern.map_or(true, |p| glob_match(p, key)))
            .map(|key| key.to_vec())
            .collect();
        let next = if end >= all.len() { 0 } else { end as u64 };
        ScanPage { cursor: next, keys }
    }

    fn iter_live_keys<'a>(&'a self, now_ms: i64) -> impl Iterator<Item = &'a Key> {
        self.strings
            .keys()
            .chain(self.hashes.keys())
            .chain(self.lists.keys())
            .chain(self.sets.keys())
            .chain(self.zsets.keys())
            .filter(move |key| !self.is_expired(key, now_ms))
    }

    /// Move `src` to `dst`, overwriting `dst`. Fails with `NoSuchKey` when
    /// `src` is absent. The deadline moves with the value.
    pub fn rename(&mut self, src: &[u8], dst: &[u8], now_ms: i64) -> Result<()> {
        if !self.is_live(src, now_ms) {
            return Err(Error::NoSuchKey);
        }
        let deadline = self.expires.get(src).copied();
        self.remove_key(dst);
        if let Some(value) = self.strings.remove(src) {
            self.strings.insert(dst.to_vec(), value);
        } else if let Some(value) = self.hashes.remove(src) {
            self.hashes.insert(dst.to_vec(), value);
        } else if let Some(value) = self.lists.remove(src) {
            self.lists.insert(dst.to_vec(), value);
        } else if let Some(value) = self.sets.remove(src) {
            self.sets.insert(dst.to_vec(), value);
        } else if let Some(value) = self.zsets.remove(src) {
            self.zsets.insert(dst.to_vec(), value);
        }
        self.expires.remove(src);
        if let Some(deadline) = deadline {
            self.expires.insert(dst.to_vec(), deadline);
        }
        Ok(())
    }

    /// Rename only when `dst` does not exist. Returns false when it does.
    pub fn renamenx(&mut self, src: &[u8], dst: &[u8], now_ms: i64) -> Result<bool> {
        if !self.is_live(src, now_ms) {
            return Err(Error::NoSuchKey);
        }
        if self.is_live(dst, now_ms) {
            return Ok(false);
        }
        self.rename(src, dst, now_ms)?;
        Ok(true)
    }

    /// Copy `src` to `dst`. Returns false when `src` is absent or `dst`
    /// exists and `replace` is off. The deadline is copied too.
    pub fn copy(&mut self, src: &[u8], dst: &[u8], replace: bool, now_ms: i64) -> bool {
        if !self.is_live(src, now_ms) {
            return false;
        }
        if self.is_live(dst, now_ms) && !replace {
            return false;
        }
        let deadline = self.expires.get(src).copied();
        self.remove_key(dst);
        if let Some(value) = self.strings.get(src).cloned() {
            self.strings.insert(dst.to_vec(), value);
        } else if let Some(value) = self.hashes.get(src).cloned() {
            self.hashes.insert(dst.to_vec(), value);
        } else if let Some(value) = self.lists.get(src).cloned() {
            self.lists.insert(dst.to_vec(), value);
        } else if let Some(value) = self.sets.get(src).cloned() {
            self.sets.insert(dst.to_vec(), value);
        } else if let Some(value) = self.zsets.get(src).cloned() {
            self.zsets.insert(dst.to_vec(), value);
        }
        if let Some(deadline) = deadline {
            self.expires.insert(dst.to_vec(), deadline);
        }
        true
    }

    /// A uniformly random live key.
    pub fn random_key<R: Rng>(&self, rng: &mut R, now_ms: i64) -> Option<Key> {
        self.iter_live_keys(now_ms).choose(rng).map(|key| key.to_vec())
    }

    /// Count of live keys.
    pub fn dbsize(&self, now_ms: i64) -> usize {
        self.iter_live_keys(now_ms).count()
    }

    /// Empty every map and the TTL index.
    pub fn flush(&mut self) {
        self.strings.clear();
        self.hashes.clear();
        self.lists.clear();
        self.sets.clear();
        self.zsets.clear();
        self.expires.clear();
    }

    // ------------------------------------------------------------------
    // Sweeper support
    // ------------------------------------------------------------------

    /// One sampling round: inspect up to `limit` randomly-chosen keys from
    /// the TTL index, delete the expired ones. Returns
    /// `(sampled, expired_keys)`.
    pub fn sweep_round<R: Rng>(
        &mut self,
        limit: usize,
        now_ms: i64,
        rng: &mut R,
    ) -> (usize, Vec<Key>) {
        if self.expires.is_empty() || limit == 0 {
            return (0, Vec::new());
        }
        let sample: Vec<Key> = self
            .expires
            .keys()
            .cloned()
            .choose_multiple(rng, limit);
        let mut expired = Vec::new();
        for key in &sample {
            if self.is_expired(key, now_ms) {
                self.remove_key(key);
                expired.push(key.clone());
            }
        }
        (sample.len(), expired)
    }

    /// Live string entries with their deadlines (snapshot support).
    pub fn string_entries(&self, now_ms: i64) -> Vec<(Key, Vec<u8>, Option<i64>)> {
        self.strings
            .iter()
            .filter(|(key, _)| !self.is_expired(key, now_ms))
            .map(|(key, value)| (key.clone(), value.clone(), self.expires.get(key).copied()))
            .collect()
    }

    /// Approximate memory footprint of one key's live value, for
    /// `MEMORY USAGE`. Counts payload bytes plus small per-entry overhead.
    pub fn memory_usage(&self, key: &[u8], now_ms: i64) -> Option<usize> {
        if self.is_expired(key, now_ms) {
            return None;
        }
        const ENTRY_OVERHEAD: usize = 48;
        if let Some(value) = self.strings.get(key) {
            return Some(ENTRY_OVERHEAD + key.len() + value.len());
        }
        if let Some(fields) = self.hashes.get(key) {
            let body: usize = fields.iter().map(|(f, v)| f.len() + v.len() + ENTRY_OVERHEAD).sum();
            return Some(ENTRY_OVERHEAD + key.len() + body);
        }
        if let Some(items) = self.lists.get(key) {
            let body: usize = items.iter().map(|v| v.len() + 16).sum();
            return Some(ENTRY_OVERHEAD + key.len() + body);
        }
        if let Some(members) = self.sets.get(key) {
            let body: usize = members.iter().map(|m| m.len() + ENTRY_OVERHEAD).sum();
            return Some(ENTRY_OVERHEAD + key.len() + body);
        }
        if let Some(zset) = self.zsets.get(key) {
            let body: usize = zset
                .range_by_rank(0, -1)
                .iter()
                .map(|(m, _)| m.len() + 8 + ENTRY_OVERHEAD)
                .sum();
            return Some(ENTRY_OVERHEAD + key.len() + body);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const NOW: i64 = 1_700_000_000_000;

    fn ks_with_string(key: &[u8], value: &[u8]) -> Keyspace {
        let mut ks = Keyspace::new();
        ks.set(key, value.to_vec(), NOW);
        ks
    }

    #[test]
    fn test_del_counts_only_live_keys() {
        let mut ks = ks_with_string(b"a", b"1");
        ks.set(b"b", b"2".to_vec(), NOW);
        ks.expire_at(b"b", NOW + 10, NOW);
        let removed = ks.del(&[b"a".to_vec(), b"b".to_vec(), b"ghost".to_vec()], NOW + 20);
        assert_eq!(removed, 1); // b expired, ghost absent
        assert_eq!(ks.dbsize(NOW + 20), 0);
    }

    #[test]
    fn test_expire_in_past_deletes() {
        let mut ks = ks_with_string(b"k", b"v");
        assert!(ks.expire_at(b"k", NOW - 1, NOW));
        assert_eq!(ks.exists(&[b"k".to_vec()], NOW), 0);
    }

    #[test]
    fn test_ttl_states() {
        let mut ks = ks_with_string(b"k", b"v");
        assert_eq!(ks.ttl_ms(b"k", NOW), Some(None)); // no deadline
        ks.expire_at(b"k", NOW + 5_000, NOW);
        assert_eq!(ks.ttl_ms(b"k", NOW), Some(Some(5_000)));
        assert_eq!(ks.ttl_ms(b"missing", NOW), None);
        // Past deadline reads as absent even before sweeping.
        assert_eq!(ks.ttl_ms(b"k", NOW + 6_000), None);
    }

    #[test]
    fn test_persist_clears_deadline() {
        let mut ks = ks_with_string(b"k", b"v");
        ks.expire_at(b"k", NOW + 5_000, NOW);
        assert!(ks.persist(b"k", NOW));
        assert!(!ks.persist(b"k", NOW)); // nothing left to clear
        assert_eq!(ks.ttl_ms(b"k", NOW), Some(None));
    }

    #[test]
    fn test_type_of_probes_each_map() {
        let mut ks = Keyspace::new();
        ks.set(b"s", b"v".to_vec(), NOW);
        ks.hset(b"h", vec![(b"f".to_vec(), b"v".to_vec())], NOW).unwrap();
        ks.rpush(b"l", vec![b"v".to_vec()], NOW).unwrap();
        ks.sadd(b"t", vec![b"m".to_vec()], NOW).unwrap();
        ks.zadd(b"z", vec![(1.0, b"m".to_vec())], NOW).unwrap();
        assert_eq!(ks.type_of(b"s", NOW), Some(EntryType::String));
        assert_eq!(ks.type_of(b"h", NOW), Some(EntryType::Hash));
        assert_eq!(ks.type_of(b"l", NOW), Some(EntryType::List));
        assert_eq!(ks.type_of(b"t", NOW), Some(EntryType::Set));
        assert_eq!(ks.type_of(b"z", NOW), Some(EntryType::ZSet));
        assert_eq!(ks.type_of(b"none", NOW), None);
    }

    #[test]
    fn test_wrong_type_guard() {
        let mut ks = Keyspace::new();
        ks.rpush(b"l", vec![b"v".to_vec()], NOW).unwrap();
        assert!(matches!(ks.get(b"l", NOW), Err(Error::WrongType)));
        assert!(matches!(
            ks.sadd(b"l", vec![b"m".to_vec()], NOW),
            Err(Error::WrongType)
        ));
    }

    #[test]
    fn test_keys_filters_pattern_and_expired() {
        let mut ks = Keyspace::new();
        ks.set(b"user:1", b"a".to_vec(), NOW);
        ks.set(b"user:2", b"b".to_vec(), NOW);
        ks.set(b"other", b"c".to_vec(), NOW);
        ks.expire_at(b"user:2", NOW + 1, NOW);

        let mut found = ks.keys(b"user:*", NOW + 10);
        found.sort();
        assert_eq!(found, vec![b"user:1".to_vec()]);
    }

    #[test]
    fn test_scan_visits_every_key_exactly_once() {
        let mut ks = Keyspace::new();
        for i in 0..25 {
            ks.set(format!("k{:02}", i).as_bytes(), b"v".to_vec(), NOW);
        }
        let mut seen = Vec::new();
        let mut cursor = 0;
        loop {
            let page = ks.scan(cursor, None, 7, NOW);
            seen.extend(page.keys);
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn test_rename_moves_value_and_deadline() {
        let mut ks = ks_with_string(b"src", b"v");
        ks.expire_at(b"src", NOW + 9_000, NOW);
        ks.rename(b"src", b"dst", NOW).unwrap();
        assert_eq!(ks.get(b"dst", NOW).unwrap(), Some(b"v".to_vec()));
        assert_eq!(ks.ttl_ms(b"dst", NOW), Some(Some(9_000)));
        assert!(matches!(ks.rename(b"src", b"x", NOW), Err(Error::NoSuchKey)));
    }

    #[test]
    fn test_renamenx_refuses_existing_destination() {
        let mut ks = ks_with_string(b"src", b"v");
        ks.set(b"dst", b"w".to_vec(), NOW);
        assert!(!ks.renamenx(b"src", b"dst", NOW).unwrap());
        assert_eq!(ks.get(b"src", NOW).unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_copy_preserves_source() {
        let mut ks = ks_with_string(b"src", b"v");
        assert!(ks.copy(b"src", b"dst", false, NOW));
        assert!(!ks.copy(b"src", b"dst", false, NOW)); // dst exists
        assert!(ks.copy(b"src", b"dst", true, NOW));
        assert_eq!(ks.get(b"src", NOW).unwrap(), Some(b"v".to_vec()));
        assert_eq!(ks.get(b"dst", NOW).unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_flush_empties_everything() {
        let mut ks = ks_with_string(b"a", b"1");
        ks.rpush(b"l", vec![b"v".to_vec()], NOW).unwrap();
        ks.expire_at(b"a", NOW + 1_000, NOW);
        ks.flush();
        assert_eq!(ks.dbsize(NOW), 0);
        assert_eq!(ks.ttl_ms(b"a", NOW), None);
    }

    #[test]
    fn test_sweep_round_removes_expired_only() {
        let mut ks = Keyspace::new();
        for i in 0..10 {
            let key = format!("dead{}", i);
            ks.set(key.as_bytes(), b"v".to_vec(), NOW);
            ks.expire_at(key.as_bytes(), NOW + 1, NOW);
        }
        ks.set(b"alive", b"v".to_vec(), NOW);
        ks.expire_at(b"alive", NOW + 1_000_000, NOW);

        let mut rng = StdRng::seed_from_u64(7);
        let (sampled, expired) = ks.sweep_round(20, NOW + 10, &mut rng);
        assert_eq!(sampled, 11);
        assert_eq!(expired.len(), 10);
        assert!(ks.is_live(b"alive", NOW + 10));
    }

    #[test]
    fn test_random_key_skips_expired() {
        let mut ks = ks_with_string(b"gone", b"v");
        ks.expire_at(b"gone", NOW + 1, NOW);
        ks.set(b"here", b"v".to_vec(), NOW);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            assert_eq!(ks.random_key(&mut rng, NOW + 10), Some(b"here".to_vec()));
        }
    }
}
