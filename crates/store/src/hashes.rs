//! Hash operations. Field identity is byte-exact; a hash that loses its
//! last field disappears along with its key.

use crate::keyspace::{EntryType, Keyspace};
use crate::strings::{format_f64, parse_f64, parse_i64};
use ember_core::{Error, Result};

impl Keyspace {
    /// Set fields; returns how many were newly created.
    pub fn hset(
        &mut self,
        key: &[u8],
        pairs: Vec<(Vec<u8>, Vec<u8>)>,
        now_ms: i64,
    ) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::Hash, now_ms)?;
        let hash = self.hashes.entry(key.to_vec()).or_default();
        let mut created = 0;
        for (field, value) in pairs {
            if hash.insert(field, value).is_none() {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Set one field only when absent.
    pub fn hsetnx(&mut self, key: &[u8], field: &[u8], value: Vec<u8>, now_ms: i64) -> Result<bool> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::Hash, now_ms)?;
        let hash = self.hashes.entry(key.to_vec()).or_default();
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_vec(), value);
        Ok(true)
    }

    pub fn hget(&self, key: &[u8], field: &[u8], now_ms: i64) -> Result<Option<Vec<u8>>> {
        if self.is_expired(key, now_ms) {
            return Ok(None);
        }
        self.check_type(key, EntryType::Hash, now_ms)?;
        Ok(self
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field))
            .cloned())
    }

    /// Delete fields; returns how many existed. Draining the hash removes
    /// the key.
    pub fn hdel(&mut self, key: &[u8], fields: &[Vec<u8>], now_ms: i64) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::Hash, now_ms)?;
        let Some(hash) = self.hashes.get_mut(key) else {
            return Ok(0);
        };
        let removed = fields
            .iter()
            .filter(|field| hash.remove(*field).is_some())
            .count();
        if hash.is_empty() {
            self.remove_key(key);
        }
        Ok(removed)
    }

    pub fn hexists(&self, key: &[u8], field: &[u8], now_ms: i64) -> Result<bool> {
        Ok(self.hget(key, field, now_ms)?.is_some())
    }

    pub fn hlen(&self, key: &[u8], now_ms: i64) -> Result<usize> {
        if self.is_expired(key, now_ms) {
            return Ok(0);
        }
        self.check_type(key, EntryType::Hash, now_ms)?;
        Ok(self.hashes.get(key).map_or(0, |hash| hash.len()))
    }

    pub fn hgetall(&self, key: &[u8], now_ms: i64) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if self.is_expired(key, now_ms) {
            return Ok(Vec::new());
        }
        self.check_type(key, EntryType::Hash, now_ms)?;
        Ok(self
            .hashes
            .get(key)
            .map(|hash| {
                hash.iter()
                    .map(|(f, v)| (f.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn hkeys(&self, key: &[u8], now_ms: i64) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .hgetall(key, now_ms)?
            .into_iter()
            .map(|(field, _)| field)
            .collect())
    }

    pub fn hvals(&self, key: &[u8], now_ms: i64) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .hgetall(key, now_ms)?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    pub fn hmget(
        &self,
        key: &[u8],
        fields: &[Vec<u8>],
        now_ms: i64,
    ) -> Result<Vec<Option<Vec<u8>>>> {
        if self.is_expired(key, now_ms) {
            return Ok(vec![None; fields.len()]);
        }
        self.check_type(key, EntryType::Hash, now_ms)?;
        let hash = self.hashes.get(key);
        Ok(fields
            .iter()
            .map(|field| hash.and_then(|h| h.get(field)).cloned())
            .collect())
    }

    /// Integer add on one field; fails with `NotInteger` when the stored
    /// value is present but not a decimal integer.
    pub fn hincr_by(&mut self, key: &[u8], field: &[u8], delta: i64, now_ms: i64) -> Result<i64> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::Hash, now_ms)?;
        let hash = self.hashes.entry(key.to_vec()).or_default();
        let current = match hash.get(field) {
            Some(raw) => parse_i64(raw)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(Error::NotInteger)?;
        hash.insert(field.to_vec(), next.to_string().into_bytes());
        Ok(next)
    }

    /// Float add on one field.
    pub fn hincr_by_float(
        &mut self,
        key: &[u8],
        field: &[u8],
        delta: f64,
        now_ms: i64,
    ) -> Result<f64> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::Hash, now_ms)?;
        let hash = self.hashes.entry(key.to_vec()).or_default();
        let current = match hash.get(field) {
            Some(raw) => parse_f64(raw)?,
            None => 0.0,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(Error::NotFloat);
        }
        hash.insert(field.to_vec(), format_f64(next).into_bytes());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn pair(f: &[u8], v: &[u8]) -> (Vec<u8>, Vec<u8>) {
        (f.to_vec(), v.to_vec())
    }

    #[test]
    fn test_hset_counts_new_fields_only() {
        let mut ks = Keyspace::new();
        assert_eq!(
            ks.hset(b"h", vec![pair(b"a", b"1"), pair(b"b", b"2")], NOW).unwrap(),
            2
        );
        assert_eq!(
            ks.hset(b"h", vec![pair(b"a", b"9"), pair(b"c", b"3")], NOW).unwrap(),
            1
        );
        assert_eq!(ks.hget(b"h", b"a", NOW).unwrap(), Some(b"9".to_vec()));
    }

    #[test]
    fn test_hsetnx() {
        let mut ks = Keyspace::new();
        assert!(ks.hsetnx(b"h", b"f", b"1".to_vec(), NOW).unwrap());
        assert!(!ks.hsetnx(b"h", b"f", b"2".to_vec(), NOW).unwrap());
        assert_eq!(ks.hget(b"h", b"f", NOW).unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_empty_hash_removes_key() {
        let mut ks = Keyspace::new();
        ks.hset(b"h", vec![pair(b"a", b"1")], NOW).unwrap();
        assert_eq!(ks.hdel(b"h", &[b"a".to_vec(), b"ghost".to_vec()], NOW).unwrap(), 1);
        assert_eq!(ks.exists(&[b"h".to_vec()], NOW), 0);
        assert_eq!(ks.hlen(b"h", NOW).unwrap(), 0);
    }

    #[test]
    fn test_hmget_preserves_order_and_gaps() {
        let mut ks = Keyspace::new();
        ks.hset(b"h", vec![pair(b"a", b"1"), pair(b"c", b"3")], NOW).unwrap();
        assert_eq!(
            ks.hmget(b"h", &[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()], NOW).unwrap(),
            vec![Some(b"1".to_vec()), None, Some(b"3".to_vec())]
        );
    }

    #[test]
    fn test_hgetall_hkeys_hvals_agree() {
        let mut ks = Keyspace::new();
        ks.hset(b"h", vec![pair(b"a", b"1"), pair(b"b", b"2")], NOW).unwrap();
        let mut all = ks.hgetall(b"h", NOW).unwrap();
        all.sort();
        assert_eq!(all, vec![pair(b"a", b"1"), pair(b"b", b"2")]);
        assert_eq!(ks.hkeys(b"h", NOW).unwrap().len(), 2);
        assert_eq!(ks.hvals(b"h", NOW).unwrap().len(), 2);
    }

    #[test]
    fn test_hincr_by() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.hincr_by(b"h", b"n", 5, NOW).unwrap(), 5);
        assert_eq!(ks.hincr_by(b"h", b"n", -11, NOW).unwrap(), -6);
        ks.hset(b"h", vec![pair(b"s", b"text")], NOW).unwrap();
        assert!(matches!(
            ks.hincr_by(b"h", b"s", 1, NOW),
            Err(Error::NotInteger)
        ));
    }

    #[test]
    fn test_hincr_by_float() {
        let mut ks = Keyspace::new();
        ks.hset(b"h", vec![pair(b"f", b"10.5")], NOW).unwrap();
        assert_eq!(ks.hincr_by_float(b"h", b"f", 0.1, NOW).unwrap(), 10.6);
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut ks = Keyspace::new();
        ks.set(b"s", b"v".to_vec(), NOW);
        assert!(matches!(
            ks.hset(b"s", vec![pair(b"f", b"v")], NOW),
            Err(Error::WrongType)
        ));
        assert!(matches!(ks.hget(b"s", b"f", NOW), Err(Error::WrongType)));
    }
}
