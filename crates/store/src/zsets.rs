//! Keyspace wrappers for sorted-set operations: type guards, expiry
//! filtering, and removal of keys whose cardinality drops to zero.

use crate::keyspace::{EntryType, Keyspace};
use crate::zset::ScoreBound;
use ember_core::Result;

impl Keyspace {
    /// Add or rescore members; returns how many were newly inserted.
    pub fn zadd(&mut self, key: &[u8], members: Vec<(f64, Vec<u8>)>, now_ms: i64) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::ZSet, now_ms)?;
        // Reject NaN up front so a multi-member ZADD is all-or-nothing.
        for (score, _) in &members {
            crate::zset::SortedSet::check_score(*score)?;
        }
        let zset = self.zsets.entry(key.to_vec()).or_default();
        let mut created = 0;
        for (score, member) in members {
            if zset.insert(member, score)? {
                created += 1;
            }
        }
        Ok(created)
    }

    pub fn zscore(&self, key: &[u8], member: &[u8], now_ms: i64) -> Result<Option<f64>> {
        if self.is_expired(key, now_ms) {
            return Ok(None);
        }
        self.check_type(key, EntryType::ZSet, now_ms)?;
        Ok(self.zsets.get(key).and_then(|zset| zset.score(member)))
    }

    /// Remove members; returns how many existed.
    pub fn zrem(&mut self, key: &[u8], members: &[Vec<u8>], now_ms: i64) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::ZSet, now_ms)?;
        let Some(zset) = self.zsets.get_mut(key) else {
            return Ok(0);
        };
        let removed = members.iter().filter(|member| zset.remove(member)).count();
        if zset.is_empty() {
            self.remove_key(key);
        }
        Ok(removed)
    }

    pub fn zcard(&self, key: &[u8], now_ms: i64) -> Result<usize> {
        if self.is_expired(key, now_ms) {
            return Ok(0);
        }
        self.check_type(key, EntryType::ZSet, now_ms)?;
        Ok(self.zsets.get(key).map_or(0, |zset| zset.len()))
    }

    pub fn zrank(&self, key: &[u8], member: &[u8], now_ms: i64) -> Result<Option<usize>> {
        if self.is_expired(key, now_ms) {
            return Ok(None);
        }
        self.check_type(key, EntryType::ZSet, now_ms)?;
        Ok(self.zsets.get(key).and_then(|zset| zset.rank(member)))
    }

    pub fn zrev_rank(&self, key: &[u8], member: &[u8], now_ms: i64) -> Result<Option<usize>> {
        if self.is_expired(key, now_ms) {
            return Ok(None);
        }
        self.check_type(key, EntryType::ZSet, now_ms)?;
        Ok(self.zsets.get(key).and_then(|zset| zset.rev_rank(member)))
    }

    pub fn zrange_by_rank(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
        now_ms: i64,
    ) -> Result<Vec<(Vec<u8>, f64)>> {
        if self.is_expired(key, now_ms) {
            return Ok(Vec::new());
        }
        self.check_type(key, EntryType::ZSet, now_ms)?;
        Ok(self
            .zsets
            .get(key)
            .map(|zset| zset.range_by_rank(start, stop))
            .unwrap_or_default())
    }

    pub fn zrange_by_score(
        &self,
        key: &[u8],
        min: ScoreBound,
        max: ScoreBound,
        offset: usize,
        count: i64,
        now_ms: i64,
    ) -> Result<Vec<(Vec<u8>, f64)>> {
        if self.is_expired(key, now_ms) {
            return Ok(Vec::new());
        }
        self.check_type(key, EntryType::ZSet, now_ms)?;
        Ok(self
            .zsets
            .get(key)
            .map(|zset| zset.range_by_score(min, max, offset, count))
            .unwrap_or_default())
    }

    pub fn zcount(
        &self,
        key: &[u8],
        min: ScoreBound,
        max: ScoreBound,
        now_ms: i64,
    ) -> Result<usize> {
        if self.is_expired(key, now_ms) {
            return Ok(0);
        }
        self.check_type(key, EntryType::ZSet, now_ms)?;
        Ok(self
            .zsets
            .get(key)
            .map_or(0, |zset| zset.count_in_range(min, max)))
    }

    /// Add `delta` to a member's score, creating it when absent; returns
    /// the new score.
    pub fn zincr_by(&mut self, key: &[u8], member: &[u8], delta: f64, now_ms: i64) -> Result<f64> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::ZSet, now_ms)?;
        let zset = self.zsets.entry(key.to_vec()).or_default();
        let result = zset.incr_by(member, delta);
        if zset.is_empty() {
            // A NaN rejection on a fresh key leaves an empty shell behind.
            self.remove_key(key);
        }
        result
    }

    pub fn zpop_min(&mut self, key: &[u8], n: usize, now_ms: i64) -> Result<Vec<(Vec<u8>, f64)>> {
        self.zpop(key, n, true, now_ms)
    }

    pub fn zpop_max(&mut self, key: &[u8], n: usize, now_ms: i64) -> Result<Vec<(Vec<u8>, f64)>> {
        self.zpop(key, n, false, now_ms)
    }

    fn zpop(&mut self, key: &[u8], n: usize, min: bool, now_ms: i64) -> Result<Vec<(Vec<u8>, f64)>> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::ZSet, now_ms)?;
        let Some(zset) = self.zsets.get_mut(key) else {
            return Ok(Vec::new());
        };
        let popped = if min { zset.pop_min(n) } else { zset.pop_max(n) };
        if zset.is_empty() {
            self.remove_key(key);
        }
        Ok(popped)
    }

    pub fn zrem_range_by_rank(
        &mut self,
        key: &[u8],
        start: i64,
        stop: i64,
        now_ms: i64,
    ) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::ZSet, now_ms)?;
        let Some(zset) = self.zsets.get_mut(key) else {
            return Ok(0);
        };
        let removed = zset.remove_range_by_rank(start, stop);
        if zset.is_empty() {
            self.remove_key(key);
        }
        Ok(removed)
    }

    pub fn zrem_range_by_score(
        &mut self,
        key: &[u8],
        min: ScoreBound,
        max: ScoreBound,
        now_ms: i64,
    ) -> Result<usize> {
        self.purge_if_expired(key, now_ms);
        self.check_type(key, EntryType::ZSet, now_ms)?;
        let Some(zset) = self.zsets.get_mut(key) else {
            return Ok(0);
        };
        let removed = zset.remove_range_by_score(min, max);
        if zset.is_empty() {
            self.remove_key(key);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::Error;

    const NOW: i64 = 1_700_000_000_000;

    fn leaderboard(ks: &mut Keyspace) {
        ks.zadd(
            b"lb",
            vec![
                (100.0, b"alice".to_vec()),
                (85.0, b"bob".to_vec()),
                (120.0, b"carol".to_vec()),
            ],
            NOW,
        )
        .unwrap();
    }

    #[test]
    fn test_zadd_counts_new_members() {
        let mut ks = Keyspace::new();
        leaderboard(&mut ks);
        assert_eq!(
            ks.zadd(b"lb", vec![(90.0, b"bob".to_vec()), (70.0, b"dan".to_vec())], NOW)
                .unwrap(),
            1
        );
        assert_eq!(ks.zscore(b"lb", b"bob", NOW).unwrap(), Some(90.0));
        assert_eq!(ks.zcard(b"lb", NOW).unwrap(), 4);
    }

    #[test]
    fn test_zadd_nan_is_all_or_nothing() {
        let mut ks = Keyspace::new();
        let err = ks.zadd(
            b"z",
            vec![(1.0, b"ok".to_vec()), (f64::NAN, b"bad".to_vec())],
            NOW,
        );
        assert!(matches!(err, Err(Error::NotFloat)));
        assert_eq!(ks.zcard(b"z", NOW).unwrap(), 0);
        assert_eq!(ks.exists(&[b"z".to_vec()], NOW), 0);
    }

    #[test]
    fn test_zrem_drains_key() {
        let mut ks = Keyspace::new();
        leaderboard(&mut ks);
        let all = vec![b"alice".to_vec(), b"bob".to_vec(), b"carol".to_vec()];
        assert_eq!(ks.zrem(b"lb", &all, NOW).unwrap(), 3);
        assert_eq!(ks.exists(&[b"lb".to_vec()], NOW), 0);
    }

    #[test]
    fn test_zrange_order() {
        let mut ks = Keyspace::new();
        leaderboard(&mut ks);
        let members: Vec<Vec<u8>> = ks
            .zrange_by_rank(b"lb", 0, -1, NOW)
            .unwrap()
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        assert_eq!(members, vec![b"bob".to_vec(), b"alice".to_vec(), b"carol".to_vec()]);
    }

    #[test]
    fn test_zcount_and_range_by_score() {
        let mut ks = Keyspace::new();
        leaderboard(&mut ks);
        assert_eq!(
            ks.zcount(b"lb", ScoreBound::inclusive(85.0), ScoreBound::inclusive(100.0), NOW)
                .unwrap(),
            2
        );
        let page = ks
            .zrange_by_score(
                b"lb",
                ScoreBound::exclusive(85.0),
                ScoreBound::inclusive(f64::INFINITY),
                0,
                -1,
                NOW,
            )
            .unwrap();
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn test_zpop_drains_key() {
        let mut ks = Keyspace::new();
        leaderboard(&mut ks);
        let popped = ks.zpop_min(b"lb", 2, NOW).unwrap();
        assert_eq!(popped[0].0, b"bob".to_vec());
        let popped = ks.zpop_max(b"lb", 2, NOW).unwrap();
        assert_eq!(popped.len(), 1);
        assert_eq!(ks.exists(&[b"lb".to_vec()], NOW), 0);
    }

    #[test]
    fn test_zincr_by_creates() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.zincr_by(b"z", b"m", 3.5, NOW).unwrap(), 3.5);
        assert_eq!(ks.zincr_by(b"z", b"m", -1.5, NOW).unwrap(), 2.0);
    }

    #[test]
    fn test_zrem_ranges() {
        let mut ks = Keyspace::new();
        leaderboard(&mut ks);
        assert_eq!(ks.zrem_range_by_rank(b"lb", 0, 0, NOW).unwrap(), 1);
        assert!(ks.zscore(b"lb", b"bob", NOW).unwrap().is_none());
        assert_eq!(
            ks.zrem_range_by_score(
                b"lb",
                ScoreBound::inclusive(f64::NEG_INFINITY),
                ScoreBound::inclusive(f64::INFINITY),
                NOW
            )
            .unwrap(),
            2
        );
        assert_eq!(ks.exists(&[b"lb".to_vec()], NOW), 0);
    }

    #[test]
    fn test_wrong_type() {
        let mut ks = Keyspace::new();
        ks.set(b"s", b"v".to_vec(), NOW);
        assert!(matches!(
            ks.zadd(b"s", vec![(1.0, b"m".to_vec())], NOW),
            Err(Error::WrongType)
        ));
    }
}
