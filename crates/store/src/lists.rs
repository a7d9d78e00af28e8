//! List operations over `VecDeque` payloads.
//!
//! `LPUSH` prepends its arguments as a block in the order given, so the
//! last argument lands furthest from the head; `RPUSH` appends in order.
//! Negative indices count from the tail (`-1` is the last element). A list
//! drained to empty takes its key with it.

use crate::keyspace::{EntryType, Keyspace};
use crate::zset::clamp_range;
use ember_core::{Error, Result};
use std::collections::VecDeque;

impl Keyspace {
    /// Block-prepend; returns the new length.
    pub fn lpush(&mut self, key: &[u8], values: Vec<Vec<u8>>, now_ms: i64) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::List, now_ms)?;
        let list = self.lists.entry(key.to_vec()).or_default();
        for value in values.into_iter().rev() {
            list.push_front(value);
        }
        Ok(list.len())
    }

    /// Append; returns the new length.
    pub fn rpush(&mut self, key: &[u8], values: Vec<Vec<u8>>, now_ms: i64) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::List, now_ms)?;
        let list = self.lists.entry(key.to_vec()).or_default();
        for value in values {
            list.push_back(value);
        }
        Ok(list.len())
    }

    /// Pop up to `n` elements from the head.
    pub fn lpop(&mut self, key: &[u8], n: usize, now_ms: i64) -> Result<Vec<Vec<u8>>> {
        self.pop_end(key, n, true, now_ms)
    }

    /// Pop up to `n` elements from the tail.
    pub fn rpop(&mut self, key: &[u8], n: usize, now_ms: i64) -> Result<Vec<Vec<u8>>> {
        self.pop_end(key, n, false, now_ms)
    }

    fn pop_end(&mut self, key: &[u8], n: usize, head: bool, now_ms: i64) -> Result<Vec<Vec<u8>>> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::List, now_ms)?;
        let Some(list) = self.lists.get_mut(key) else {
            return Ok(Vec::new());
        };
        let mut popped = Vec::with_capacity(n.min(list.len()));
        for _ in 0..n {
            let Some(value) = (if head { list.pop_front() } else { list.pop_back() }) else {
                break;
            };
            popped.push(value);
        }
        if list.is_empty() {
            self.remove_key(key);
        }
        Ok(popped)
    }

    pub fn llen(&self, key: &[u8], now_ms: i64) -> Result<usize> {
        if self.is_expired(key, now_ms) {
            return Ok(0);
        }
        self.check_type(key, EntryType::List, now_ms)?;
        Ok(self.lists.get(key).map_or(0, |list| list.len()))
    }

    pub fn lindex(&self, key: &[u8], index: i64, now_ms: i64) -> Result<Option<Vec<u8>>> {
        if self.is_expired(key, now_ms) {
            return Ok(None);
        }
        self.check_type(key, EntryType::List, now_ms)?;
        let Some(list) = self.lists.get(key) else {
            return Ok(None);
        };
        Ok(resolve_index(index, list.len()).map(|i| list[i].clone()))
    }

    /// Overwrite one position; `NoSuchKey` when the key is absent,
    /// `IndexOutOfRange` when the index misses.
    pub fn lset(&mut self, key: &[u8], index: i64, value: Vec<u8>, now_ms: i64) -> Result<()> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::List, now_ms)?;
        let Some(list) = self.lists.get_mut(key) else {
            return Err(Error::NoSuchKey);
        };
        let Some(i) = resolve_index(index, list.len()) else {
            return Err(Error::IndexOutOfRange);
        };
        list[i] = value;
        Ok(())
    }

    pub fn lrange(&self, key: &[u8], start: i64, stop: i64, now_ms: i64) -> Result<Vec<Vec<u8>>> {
        if self.is_expired(key, now_ms) {
            return Ok(Vec::new());
        }
        self.check_type(key, EntryType::List, now_ms)?;
        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        let (start, stop) = clamp_range(start, stop, list.len() as i64);
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    /// Insert `value` before/after the first byte-exact occurrence of
    /// `pivot`. Returns the new length, `-1` when the pivot is absent, `0`
    /// when the key is absent.
    pub fn linsert(
        &mut self,
        key: &[u8],
        before: bool,
        pivot: &[u8],
        value: Vec<u8>,
        now_ms: i64,
    ) -> Result<i64> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::List, now_ms)?;
        let Some(list) = self.lists.get_mut(key) else {
            return Ok(0);
        };
        let current: Vec<Vec<u8>> = list.iter().cloned().collect();
        let Some(next) = linsert_plan(&current, before, pivot, value) else {
            return Ok(-1);
        };
        let len = next.len() as i64;
        *list = next.into();
        Ok(len)
    }

    /// Remove occurrences of `value`: `count > 0` head-to-tail up to
    /// count, `count < 0` tail-to-head up to |count|, `count == 0` all.
    /// Returns the number removed.
    pub fn lrem(&mut self, key: &[u8], count: i64, value: &[u8], now_ms: i64) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::List, now_ms)?;
        let Some(list) = self.lists.get_mut(key) else {
            return Ok(0);
        };
        let current: Vec<Vec<u8>> = list.iter().cloned().collect();
        let (kept, removed) = lrem_plan(&current, count, value);
        *list = kept.into();
        if list.is_empty() {
            self.remove_key(key);
        }
        Ok(removed)
    }

    /// Keep only the window `[start, stop]`; bounds clamp, an inverted
    /// window empties the list (and removes the key).
    pub fn ltrim(&mut self, key: &[u8], start: i64, stop: i64, now_ms: i64) -> Result<()> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::List, now_ms)?;
        let Some(list) = self.lists.get_mut(key) else {
            return Ok(());
        };
        let (start, stop) = clamp_range(start, stop, list.len() as i64);
        if start > stop {
            self.remove_key(key);
            return Ok(());
        }
        list.truncate(stop as usize + 1);
        list.drain(..start as usize);
        if list.is_empty() {
            self.remove_key(key);
        }
        Ok(())
    }

    /// Current list contents, head first (LIST_REWRITE support).
    pub fn list_snapshot(&self, key: &[u8], now_ms: i64) -> Vec<Vec<u8>> {
        if self.is_expired(key, now_ms) {
            return Vec::new();
        }
        self.lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Replace a list wholesale (LIST_REWRITE replay). An empty
    /// replacement removes the key.
    pub fn list_replace(&mut self, key: &[u8], elems: Vec<Vec<u8>>) {
        if elems.is_empty() {
            self.remove_key(key);
        } else {
            self.lists.insert(key.to_vec(), elems.into());
        }
    }
}

/// Compute the post-`LINSERT` list, or `None` when the pivot is absent.
/// Pure so that callers needing the outcome before applying it (journal
/// planning) share one implementation with [`Keyspace::linsert`].
pub fn linsert_plan(
    list: &[Vec<u8>],
    before: bool,
    pivot: &[u8],
    value: Vec<u8>,
) -> Option<Vec<Vec<u8>>> {
    let pos = list.iter().position(|elem| elem == pivot)?;
    let at = if before { pos } else { pos + 1 };
    let mut next = Vec::with_capacity(list.len() + 1);
    next.extend_from_slice(&list[..at]);
    next.push(value);
    next.extend_from_slice(&list[at..]);
    Some(next)
}

/// Compute the post-`LREM` list and the number of elements removed.
pub fn lrem_plan(list: &[Vec<u8>], count: i64, value: &[u8]) -> (Vec<Vec<u8>>, usize) {
    let limit = if count == 0 {
        usize::MAX
    } else {
        count.unsigned_abs() as usize
    };
    let mut removed = 0;
    if count >= 0 {
        let mut kept = Vec::with_capacity(list.len());
        for elem in list {
            if removed < limit && elem.as_slice() == value {
                removed += 1;
            } else {
                kept.push(elem.clone());
            }
        }
        (kept, removed)
    } else {
        let mut kept = VecDeque::with_capacity(list.len());
        for elem in list.iter().rev() {
            if removed < limit && elem.as_slice() == value {
                removed += 1;
            } else {
                kept.push_front(elem.clone());
            }
        }
        (kept.into_iter().collect(), removed)
    }
}

/// Map a possibly-negative index onto `[0, len)`.
pub(crate) fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { len + index } else { index };
    if i < 0 || i >= len {
        None
    } else {
        Some(i as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn vals(items: &[&str]) -> Vec<Vec<u8>> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_lpush_block_prepend_order() {
        let mut ks = Keyspace::new();
        ks.lpush(b"l", vals(&["a", "b", "c"]), NOW).unwrap();
        // Last argument ends up furthest from the head.
        assert_eq!(ks.lrange(b"l", 0, -1, NOW).unwrap(), vals(&["a", "b", "c"]));
        ks.lpush(b"l", vals(&["x"]), NOW).unwrap();
        assert_eq!(ks.lrange(b"l", 0, -1, NOW).unwrap(), vals(&["x", "a", "b", "c"]));
    }

    #[test]
    fn test_rpush_appends_in_order() {
        let mut ks = Keyspace::new();
        ks.rpush(b"l", vals(&["a", "b"]), NOW).unwrap();
        ks.rpush(b"l", vals(&["c"]), NOW).unwrap();
        assert_eq!(ks.lrange(b"l", 0, -1, NOW).unwrap(), vals(&["a", "b", "c"]));
    }

    #[test]
    fn test_pop_both_ends_and_key_removal() {
        let mut ks = Keyspace::new();
        ks.rpush(b"l", vals(&["a", "b", "c"]), NOW).unwrap();
        assert_eq!(ks.lpop(b"l", 1, NOW).unwrap(), vals(&["a"]));
        assert_eq!(ks.rpop(b"l", 5, NOW).unwrap(), vals(&["c", "b"]));
        assert_eq!(ks.exists(&[b"l".to_vec()], NOW), 0);
        assert!(ks.lpop(b"l", 1, NOW).unwrap().is_empty());
    }

    #[test]
    fn test_lindex_negative() {
        let mut ks = Keyspace::new();
        ks.rpush(b"l", vals(&["a", "b", "c"]), NOW).unwrap();
        assert_eq!(ks.lindex(b"l", 0, NOW).unwrap(), Some(b"a".to_vec()));
        assert_eq!(ks.lindex(b"l", -1, NOW).unwrap(), Some(b"c".to_vec()));
        assert_eq!(ks.lindex(b"l", 3, NOW).unwrap(), None);
        assert_eq!(ks.lindex(b"l", -4, NOW).unwrap(), None);
    }

    #[test]
    fn test_lset_errors() {
        let mut ks = Keyspace::new();
        assert!(matches!(
            ks.lset(b"none", 0, b"v".to_vec(), NOW),
            Err(Error::NoSuchKey)
        ));
        ks.rpush(b"l", vals(&["a"]), NOW).unwrap();
        assert!(matches!(
            ks.lset(b"l", 1, b"v".to_vec(), NOW),
            Err(Error::IndexOutOfRange)
        ));
        ks.lset(b"l", -1, b"z".to_vec(), NOW).unwrap();
        assert_eq!(ks.lindex(b"l", 0, NOW).unwrap(), Some(b"z".to_vec()));
    }

    #[test]
    fn test_lrange_clamps() {
        let mut ks = Keyspace::new();
        ks.rpush(b"l", vals(&["a", "b", "c"]), NOW).unwrap();
        assert_eq!(ks.lrange(b"l", -100, 100, NOW).unwrap(), vals(&["a", "b", "c"]));
        assert!(ks.lrange(b"l", 2, 1, NOW).unwrap().is_empty());
        assert!(ks.lrange(b"missing", 0, -1, NOW).unwrap().is_empty());
    }

    #[test]
    fn test_linsert() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.linsert(b"l", true, b"p", b"v".to_vec(), NOW).unwrap(), 0);
        ks.rpush(b"l", vals(&["a", "b", "b"]), NOW).unwrap();
        assert_eq!(ks.linsert(b"l", true, b"b", b"x".to_vec(), NOW).unwrap(), 4);
        assert_eq!(ks.lrange(b"l", 0, -1, NOW).unwrap(), vals(&["a", "x", "b", "b"]));
        assert_eq!(ks.linsert(b"l", false, b"a", b"y".to_vec(), NOW).unwrap(), 5);
        assert_eq!(ks.lrange(b"l", 0, -1, NOW).unwrap(), vals(&["a", "y", "x", "b", "b"]));
        assert_eq!(ks.linsert(b"l", true, b"ghost", b"v".to_vec(), NOW).unwrap(), -1);
    }

    #[test]
    fn test_lrem_directions() {
        let mut ks = Keyspace::new();
        ks.rpush(b"l", vals(&["x", "a", "x", "b", "x"]), NOW).unwrap();
        assert_eq!(ks.lrem(b"l", 2, b"x", NOW).unwrap(), 2);
        assert_eq!(ks.lrange(b"l", 0, -1, NOW).unwrap(), vals(&["a", "b", "x"]));

        let mut ks = Keyspace::new();
        ks.rpush(b"l", vals(&["x", "a", "x", "b", "x"]), NOW).unwrap();
        assert_eq!(ks.lrem(b"l", -2, b"x", NOW).unwrap(), 2);
        assert_eq!(ks.lrange(b"l", 0, -1, NOW).unwrap(), vals(&["x", "a", "b"]));

        let mut ks = Keyspace::new();
        ks.rpush(b"l", vals(&["x", "a", "x"]), NOW).unwrap();
        assert_eq!(ks.lrem(b"l", 0, b"x", NOW).unwrap(), 2);
        assert_eq!(ks.lrange(b"l", 0, -1, NOW).unwrap(), vals(&["a"]));
    }

    #[test]
    fn test_lrem_draining_removes_key() {
        let mut ks = Keyspace::new();
        ks.rpush(b"l", vals(&["x", "x"]), NOW).unwrap();
        assert_eq!(ks.lrem(b"l", 0, b"x", NOW).unwrap(), 2);
        assert_eq!(ks.exists(&[b"l".to_vec()], NOW), 0);
    }

    #[test]
    fn test_ltrim() {
        let mut ks = Keyspace::new();
        ks.rpush(b"l", vals(&["a", "b", "c", "d"]), NOW).unwrap();
        ks.ltrim(b"l", 1, 2, NOW).unwrap();
        assert_eq!(ks.lrange(b"l", 0, -1, NOW).unwrap(), vals(&["b", "c"]));
        ks.ltrim(b"l", 5, 10, NOW).unwrap();
        assert_eq!(ks.exists(&[b"l".to_vec()], NOW), 0);
    }

    #[test]
    fn test_list_replace_round_trip() {
        let mut ks = Keyspace::new();
        ks.rpush(b"l", vals(&["a", "b"]), NOW).unwrap();
        let snapshot = ks.list_snapshot(b"l", NOW);
        ks.list_replace(b"l", vals(&["z"]));
        assert_eq!(ks.lrange(b"l", 0, -1, NOW).unwrap(), vals(&["z"]));
        ks.list_replace(b"l", snapshot);
        assert_eq!(ks.lrange(b"l", 0, -1, NOW).unwrap(), vals(&["a", "b"]));
        ks.list_replace(b"l", Vec::new());
        assert_eq!(ks.exists(&[b"l".to_vec()], NOW), 0);
    }
}
