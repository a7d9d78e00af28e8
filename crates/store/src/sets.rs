//! Set operations: unordered unique byte strings.

use crate::keyspace::{EntryType, Keyspace};
use ember_core::{Key, Result};
use rand::seq::IteratorRandom;
use rand::Rng;
use rustc_hash::FxHashSet;

impl Keyspace {
    /// Add members; returns how many were new.
    pub fn sadd(&mut self, key: &[u8], members: Vec<Vec<u8>>, now_ms: i64) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::Set, now_ms)?;
        let set = self.sets.entry(key.to_vec()).or_default();
        Ok(members
            .into_iter()
            .filter(|member| set.insert(member.clone()))
            .count())
    }

    /// Remove members; returns how many existed. Draining removes the key.
    pub fn srem(&mut self, key: &[u8], members: &[Vec<u8>], now_ms: i64) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::Set, now_ms)?;
        let Some(set) = self.sets.get_mut(key) else {
            return Ok(0);
        };
        let removed = members.iter().filter(|member| set.remove(*member)).count();
        if set.is_empty() {
            self.remove_key(key);
        }
        Ok(removed)
    }

    pub fn sismember(&self, key: &[u8], member: &[u8], now_ms: i64) -> Result<bool> {
        if self.is_expired(key, now_ms) {
            return Ok(false);
        }
        self.check_type(key, EntryType::Set, now_ms)?;
        Ok(self.sets.get(key).map_or(false, |set| set.contains(member)))
    }

    pub fn scard(&self, key: &[u8], now_ms: i64) -> Result<usize> {
        if self.is_expired(key, now_ms) {
            return Ok(0);
        }
        self.check_type(key, EntryType::Set, now_ms)?;
        Ok(self.sets.get(key).map_or(0, |set| set.len()))
    }

    pub fn smembers(&self, key: &[u8], now_ms: i64) -> Result<Vec<Vec<u8>>> {
        if self.is_expired(key, now_ms) {
            return Ok(Vec::new());
        }
        self.check_type(key, EntryType::Set, now_ms)?;
        Ok(self
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Random members: `n > 0` yields up to `n` distinct members, `n < 0`
    /// yields exactly `|n|` draws with replacement.
    pub fn srand_member<R: Rng>(
        &self,
        key: &[u8],
        n: i64,
        rng: &mut R,
        now_ms: i64,
    ) -> Result<Vec<Vec<u8>>> {
        if self.is_expired(key, now_ms) {
            return Ok(Vec::new());
        }
        self.check_type(key, EntryType::Set, now_ms)?;
        let Some(set) = self.sets.get(key) else {
            return Ok(Vec::new());
        };
        if set.is_empty() {
            return Ok(Vec::new());
        }
        if n >= 0 {
            Ok(set
                .iter()
                .cloned()
                .choose_multiple(rng, n as usize))
        } else {
            let draws = n.unsigned_abs() as usize;
            let mut out = Vec::with_capacity(draws);
            for _ in 0..draws {
                if let Some(member) = set.iter().choose(rng) {
                    out.push(member.clone());
                }
            }
            Ok(out)
        }
    }

    /// Destructively pop up to `n` random members.
    pub fn spop<R: Rng>(
        &mut self,
        key: &[u8],
        n: usize,
        rng: &mut R,
        now_ms: i64,
    ) -> Result<Vec<Vec<u8>>> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::Set, now_ms)?;
        let Some(set) = self.sets.get_mut(key) else {
            return Ok(Vec::new());
        };
        let victims: Vec<Vec<u8>> = set.iter().cloned().choose_multiple(rng, n);
        for member in &victims {
            set.remove(member);
        }
        if set.is_empty() {
            self.remove_key(key);
        }
        Ok(victims)
    }

    /// Intersection of the named sets, empty when any is absent.
    pub fn sinter(&self, keys: &[Key], now_ms: i64) -> Result<Vec<Vec<u8>>> {
        let sets = self.resolve_sets(keys, now_ms)?;
        let Some((first, rest)) = sets.split_first() else {
            return Ok(Vec::new());
        };
        let Some(first) = first else {
            return Ok(Vec::new());
        };
        Ok(first
            .iter()
            .filter(|member| {
                rest.iter()
                    .all(|set| set.map_or(false, |s| s.contains(*member)))
            })
            .cloned()
            .collect())
    }

    /// Union of the named sets.
    pub fn sunion(&self, keys: &[Key], now_ms: i64) -> Result<Vec<Vec<u8>>> {
        let sets = self.resolve_sets(keys, now_ms)?;
        let mut out = FxHashSet::default();
        for set in sets.into_iter().flatten() {
            out.extend(set.iter().cloned());
        }
        Ok(out.into_iter().collect())
    }

    /// Members of the first set absent from every following set.
    pub fn sdiff(&self, keys: &[Key], now_ms: i64) -> Result<Vec<Vec<u8>>> {
        let sets = self.resolve_sets(keys, now_ms)?;
        let Some((first, rest)) = sets.split_first() else {
            return Ok(Vec::new());
        };
        let Some(first) = first else {
            return Ok(Vec::new());
        };
        Ok(first
            .iter()
            .filter(|member| {
                rest.iter()
                    .all(|set| set.map_or(true, |s| !s.contains(*member)))
            })
            .cloned()
            .collect())
    }

    fn resolve_sets<'a>(
        &'a self,
        keys: &[Key],
        now_ms: i64,
    ) -> Result<Vec<Option<&'a FxHashSet<Vec<u8>>>>> {
        keys.iter()
            .map(|key| {
                if self.is_expired(key, now_ms) {
                    return Ok(None);
                }
                self.check_type(key, EntryType::Set, now_ms)?;
                Ok(self.sets.get(key.as_slice()))
            })
            .collect()
    }
}
