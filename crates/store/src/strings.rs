//! String operations.
//!
//! Values are raw byte strings. The numeric commands (`INCR*`) parse the
//! stored bytes as decimal on every call; anything unparsable fails with
//! `NotInteger`/`NotFloat` and leaves the value untouched.

use crate::keyspace::{EntryType, Keyspace};
use ember_core::{Error, Key, Result};

impl Keyspace {
    /// Unconditional set, clearing any existing deadline (`SET` without
    /// KEEPTTL).
    pub fn set(&mut self, key: &[u8], value: Vec<u8>, now_ms: i64) {
        self.purge_if_expired(key, now_ms);
        self.remove_key(key);
        self.strings.insert(key.to_vec(), value);
    }

    /// Set with an absolute deadline (`SET ... EX/PX`, `SETEX`).
    pub fn set_with_expiry(&mut self, key: &[u8], value: Vec<u8>, deadline_ms: i64, now_ms: i64) {
        self.set(key, value, now_ms);
        if deadline_ms > now_ms {
            self.expires.insert(key.to_vec(), deadline_ms);
        } else {
            self.strings.remove(key);
        }
    }

    /// Set preserving the current deadline (`SET ... KEEPTTL`, `SETRANGE`
    /// internals).
    pub fn set_keep_ttl(&mut self, key: &[u8], value: Vec<u8>, now_ms: i64) -> Result<()> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::String, now_ms)?;
        self.strings.insert(key.to_vec(), value);
        Ok(())
    }

    pub fn get(&self, key: &[u8], now_ms: i64) -> Result<Option<Vec<u8>>> {
        if self.is_expired(key, now_ms) {
            return Ok(None);
        }
        self.check_type(key, EntryType::String, now_ms)?;
        Ok(self.strings.get(key).cloned())
    }

    /// Set only when absent. Returns true when the write happened.
    pub fn setnx(&mut self, key: &[u8], value: Vec<u8>, now_ms: i64) -> bool {
        self.purge_if_expired(key, now_ms);
        if self.is_live(key, now_ms) {
            return false;
        }
        self.strings.insert(key.to_vec(), value);
        true
    }

    /// Swap in a new value, returning the old one (`GETSET`).
    pub fn getset(&mut self, key: &[u8], value: Vec<u8>, now_ms: i64) -> Result<Option<Vec<u8>>> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::String, now_ms)?;
        let old = self.strings.insert(key.to_vec(), value);
        self.expires.remove(key);
        Ok(old)
    }

    /// Read and delete (`GETDEL`).
    pub fn getdel(&mut self, key: &[u8], now_ms: i64) -> Result<Option<Vec<u8>>> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::String, now_ms)?;
        let old = self.strings.remove(key);
        self.expires.remove(key);
        Ok(old)
    }

    /// Append bytes; returns the new length.
    pub fn append(&mut self, key: &[u8], suffix: &[u8], now_ms: i64) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::String, now_ms)?;
        let value = self.strings.entry(key.to_vec()).or_default();
        value.extend_from_slice(suffix);
        Ok(value.len())
    }

    pub fn strlen(&self, key: &[u8], now_ms: i64) -> Result<usize> {
        Ok(self.get(key, now_ms)?.map_or(0, |v| v.len()))
    }

    /// Substring with negative-from-tail indices (`GETRANGE`).
    pub fn getrange(&self, key: &[u8], start: i64, stop: i64, now_ms: i64) -> Result<Vec<u8>> {
        let Some(value) = self.get(key, now_ms)? else {
            return Ok(Vec::new());
        };
        let (start, stop) = crate::zset::clamp_range(start, stop, value.len() as i64);
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(value[start as usize..=stop as usize].to_vec())
    }

    /// Overwrite bytes at `offset`, zero-padding any gap; returns the new
    /// length.
    pub fn setrange(&mut self, key: &[u8], offset: usize, patch: &[u8], now_ms: i64) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::String, now_ms)?;
        let value = self.strings.entry(key.to_vec()).or_default();
        let needed = offset + patch.len();
        if value.len() < needed {
            value.resize(needed, 0);
        }
        value[offset..needed].copy_from_slice(patch);
        Ok(value.len())
    }

    /// Signed-integer add; creates the key at `delta` when absent.
    pub fn incr_by(&mut self, key: &[u8], delta: i64, now_ms: i64) -> Result<i64> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::String, now_ms)?;
        let current = match self.strings.get(key) {
            Some(raw) => parse_i64(raw)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(Error::NotInteger)?;
        self.strings
            .insert(key.to_vec(), next.to_string().into_bytes());
        Ok(next)
    }

    /// Float add; rejects NaN/infinite results.
    pub fn incr_by_float(&mut self, key: &[u8], delta: f64, now_ms: i64) -> Result<f64> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::String, now_ms)?;
        let current = match self.strings.get(key) {
            Some(raw) => parse_f64(raw)?,
            None => 0.0,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(Error::NotFloat);
        }
        self.strings
            .insert(key.to_vec(), format_f64(next).into_bytes());
        Ok(next)
    }

    /// Batched unconditional set.
    pub fn mset(&mut self, pairs: Vec<(Key, Vec<u8>)>, now_ms: i64) {
        for (key, value) in pairs {
            self.set(&key, value, now_ms);
        }
    }

    /// Batched get; absent or wrong-typed keys yield `None`.
    pub fn mget(&self, keys: &[Key], now_ms: i64) -> Vec<Option<Vec<u8>>> {
        keys.iter()
            .map(|key| self.get(key, now_ms).unwrap_or(None))
            .collect()
    }

    /// All-or-nothing multi-set: writes only when no key exists.
    pub fn msetnx(&mut self, pairs: Vec<(Key, Vec<u8>)>, now_ms: i64) -> bool {
        if pairs.iter().any(|(key, _)| self.is_live(key, now_ms)) {
            return false;
        }
        self.mset(pairs, now_ms);
        true
    }
}

pub fn parse_i64(raw: &[u8]) -> Result<i64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(Error::NotInteger)
}

pub fn parse_f64(raw: &[u8]) -> Result<f64> {
    let parsed = std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or(Error::NotFloat)?;
    if parsed.is_nan() {
        return Err(Error::NotFloat);
    }
    Ok(parsed)
}

/// Redis-style float formatting: no trailing zeros, `17` significant
/// digits max, integral values without a decimal point.
pub fn format_f64(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e17 {
        format!("{}", value as i64)
    } else {
        let mut s = format!("{:.17}", value);
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_set_get_round_trip() {
        let mut ks = Keyspace::new();
        ks.set(b"k", b"v".to_vec(), NOW);
        assert_eq!(ks.get(b"k", NOW).unwrap(), Some(b"v".to_vec()));
        assert_eq!(ks.get(b"missing", NOW).unwrap(), None);
    }

    #[test]
    fn test_set_clears_old_type_and_ttl() {
        let mut ks = Keyspace::new();
        ks.rpush(b"k", vec![b"v".to_vec()], NOW).unwrap();
        ks.set(b"k", b"s".to_vec(), NOW);
        assert_eq!(ks.get(b"k", NOW).unwrap(), Some(b"s".to_vec()));

        ks.set_with_expiry(b"t", b"v".to_vec(), NOW + 1_000, NOW);
        ks.set(b"t", b"w".to_vec(), NOW);
        assert_eq!(ks.ttl_ms(b"t", NOW), Some(None));
    }

    #[test]
    fn test_expired_reads_as_absent() {
        let mut ks = Keyspace::new();
        ks.set_with_expiry(b"k", b"v".to_vec(), NOW + 100, NOW);
        assert_eq!(ks.get(b"k", NOW).unwrap(), Some(b"v".to_vec()));
        assert_eq!(ks.get(b"k", NOW + 101).unwrap(), None);
    }

    #[test]
    fn test_setnx() {
        let mut ks = Keyspace::new();
        assert!(ks.setnx(b"k", b"a".to_vec(), NOW));
        assert!(!ks.setnx(b"k", b"b".to_vec(), NOW));
        assert_eq!(ks.get(b"k", NOW).unwrap(), Some(b"a".to_vec()));
        // Expired key counts as absent.
        ks.set_with_expiry(b"e", b"v".to_vec(), NOW + 10, NOW);
        assert!(ks.setnx(b"e", b"new".to_vec(), NOW + 20));
    }

    #[test]
    fn test_getset_getdel() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.getset(b"k", b"1".to_vec(), NOW).unwrap(), None);
        assert_eq!(ks.getset(b"k", b"2".to_vec(), NOW).unwrap(), Some(b"1".to_vec()));
        assert_eq!(ks.getdel(b"k", NOW).unwrap(), Some(b"2".to_vec()));
        assert_eq!(ks.get(b"k", NOW).unwrap(), None);
    }

    #[test]
    fn test_append_and_strlen() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.append(b"k", b"Hello", NOW).unwrap(), 5);
        assert_eq!(ks.append(b"k", b" World", NOW).unwrap(), 11);
        assert_eq!(ks.strlen(b"k", NOW).unwrap(), 11);
        assert_eq!(ks.strlen(b"missing", NOW).unwrap(), 0);
    }

    #[test]
    fn test_getrange() {
        let mut ks = Keyspace::new();
        ks.set(b"k", b"This is a string".to_vec(), NOW);
        assert_eq!(ks.getrange(b"k", 0, 3, NOW).unwrap(), b"This".to_vec());
        assert_eq!(ks.getrange(b"k", -3, -1, NOW).unwrap(), b"ing".to_vec());
        assert_eq!(ks.getrange(b"k", 10, 100, NOW).unwrap(), b"string".to_vec());
        assert!(ks.getrange(b"k", 5, 3, NOW).unwrap().is_empty());
    }

    #[test]
    fn test_setrange_pads_with_zeroes() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.setrange(b"k", 5, b"Redis", NOW).unwrap(), 10);
        assert_eq!(
            ks.get(b"k", NOW).unwrap(),
            Some(b"\x00\x00\x00\x00\x00Redis".to_vec())
        );
    }

    #[test]
    fn test_incr_by() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.incr_by(b"n", 1, NOW).unwrap(), 1);
        assert_eq!(ks.incr_by(b"n", 41, NOW).unwrap(), 42);
        assert_eq!(ks.incr_by(b"n", -43, NOW).unwrap(), -1);

        ks.set(b"s", b"not a number".to_vec(), NOW);
        assert!(matches!(ks.incr_by(b"s", 1, NOW), Err(Error::NotInteger)));

        ks.set(b"big", i64::MAX.to_string().into_bytes(), NOW);
        assert!(matches!(ks.incr_by(b"big", 1, NOW), Err(Error::NotInteger)));
    }

    #[test]
    fn test_incr_by_float() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.incr_by_float(b"f", 0.1, NOW).unwrap(), 0.1);
        let v = ks.incr_by_float(b"f", 0.2, NOW).unwrap();
        assert!((v - 0.3).abs() < 1e-9);
        ks.set(b"s", b"abc".to_vec(), NOW);
        assert!(matches!(
            ks.incr_by_float(b"s", 1.0, NOW),
            Err(Error::NotFloat)
        ));
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_f64(3.0), "3");
        assert_eq!(format_f64(3.5), "3.5");
        assert_eq!(format_f64(-2.0), "-2");
    }

    #[test]
    fn test_mset_mget_msetnx() {
        let mut ks = Keyspace::new();
        ks.mset(vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())], NOW);
        assert_eq!(
            ks.mget(&[b"a".to_vec(), b"nope".to_vec(), b"b".to_vec()], NOW),
            vec![Some(b"1".to_vec()), None, Some(b"2".to_vec())]
        );
        assert!(!ks.msetnx(vec![(b"a".to_vec(), b"x".to_vec()), (b"c".to_vec(), b"3".to_vec())], NOW));
        assert_eq!(ks.get(b"c", NOW).unwrap(), None); // all-or-nothing
        assert!(ks.msetnx(vec![(b"c".to_vec(), b"3".to_vec())], NOW));
    }
}
