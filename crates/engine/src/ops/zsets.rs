//! Sorted-set operations on the engine. NaN scores are rejected before
//! anything reaches the journal; range removals are journaled as single
//! range records with inclusive endpoints.

use crate::cdc::ChangeKind;
use crate::engine::Engine;
use ember_core::{now_ms, Error, Result};
use ember_store::{EntryType, ScoreBound, SortedSet};
use ember_wal::{payload, Opcode, Record};

impl Engine {
    /// Add or rescore members; returns how many were newly inserted.
    pub fn zadd(&self, key: &[u8], members: Vec<(f64, Vec<u8>)>) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::ZSet, now)?;
        for (score, _) in &members {
            SortedSet::check_score(*score)?;
        }
        let records: Vec<Record> = members
            .iter()
            .map(|(score, member)| {
                Record::with_value(
                    Opcode::ZAdd,
                    key.to_vec(),
                    payload::encode_score_member(*score, member),
                )
            })
            .collect();
        self.append_wal(&records)?;
        let created = ks.zadd(key, members, now)?;
        self.note_write(ChangeKind::ZAdd, key, None);
        Ok(created)
    }

    pub fn zscore(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>> {
        let ks = self.store.read();
        let score = ks.zscore(key, member, now_ms())?;
        self.note_read(key);
        Ok(score)
    }

    /// Remove members; returns how many existed.
    pub fn zrem(&self, key: &[u8], members: &[Vec<u8>]) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::ZSet, now)?;
        let present: Vec<&Vec<u8>> = members
            .iter()
            .filter(|member| matches!(ks.zscore(key, member, now), Ok(Some(_))))
            .collect();
        if present.is_empty() {
            return Ok(0);
        }
        let records: Vec<Record> = present
            .iter()
            .map(|member| Record::with_value(Opcode::ZRem, key.to_vec(), member.to_vec()))
            .collect();
        self.append_wal(&records)?;
        let removed = ks.zrem(key, members, now)?;
        self.note_write(ChangeKind::ZRem, key, None);
        Ok(removed)
    }

    pub fn zcard(&self, key: &[u8]) -> Result<usize> {
        let ks = self.store.read();
        let card = ks.zcard(key, now_ms())?;
        self.note_read(key);
        Ok(card)
    }

    pub fn zrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>> {
        let ks = self.store.read();
        let rank = ks.zrank(key, member, now_ms())?;
        self.note_read(key);
        Ok(rank)
    }

    pub fn zrev_rank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>> {
        let ks = self.store.read();
        let rank = ks.zrev_rank(key, member, now_ms())?;
        self.note_read(key);
        Ok(rank)
    }

    /// Ascending rank window.
    pub fn zrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<(Vec<u8>, f64)>> {
        let ks = self.store.read();
        let page = ks.zrange_by_rank(key, start, stop, now_ms())?;
        self.note_read(key);
        Ok(page)
    }

    /// Descending rank window: rank 0 is the highest-scored member.
    pub fn zrevrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<(Vec<u8>, f64)>> {
        let now = now_ms();
        let ks = self.store.read();
        let mut all = ks.zrange_by_rank(key, 0, -1, now)?;
        all.reverse();
        self.note_read(key);
        let len = all.len() as i64;
        let (start, stop) = ember_store::clamp_range(start, stop, len);
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(all
            .into_iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .collect())
    }

    pub fn zrange_by_score(
        &self,
        key: &[u8],
        min: ScoreBound,
        max: ScoreBound,
        offset: usize,
        count: i64,
    ) -> Result<Vec<(Vec<u8>, f64)>> {
        let ks = self.store.read();
        let page = ks.zrange_by_score(key, min, max, offset, count, now_ms())?;
        self.note_read(key);
        Ok(page)
    }

    /// Score window traversed high-to-low, with offset/count applied after
    /// the reversal.
    pub fn zrevrange_by_score(
        &self,
        key: &[u8],
        max: ScoreBound,
        min: ScoreBound,
        offset: usize,
        count: i64,
    ) -> Result<Vec<(Vec<u8>, f64)>> {
        let ks = self.store.read();
        let mut all = ks.zrange_by_score(key, min, max, 0, -1, now_ms())?;
        all.reverse();
        self.note_read(key);
        let iter = all.into_iter().skip(offset);
        Ok(if count < 0 {
            iter.collect()
        } else {
            iter.take(count as usize).collect()
        })
    }

    pub fn zcount(&self, key: &[u8], min: ScoreBound, max: ScoreBound) -> Result<usize> {
        let ks = self.store.read();
        let count = ks.zcount(key, min, max, now_ms())?;
        self.note_read(key);
        Ok(count)
    }

    /// Add `delta` to a member's score; creates the member when absent.
    pub fn zincr_by(&self, key: &[u8], member: &[u8], delta: f64) -> Result<f64> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::ZSet, now)?;
        SortedSet::check_score(delta)?;
        let next = ks.zscore(key, member, now)?.unwrap_or(0.0) + delta;
        if next.is_nan() {
            return Err(Error::NotFloat);
        }
        self.append_wal(&[Record::with_value(
            Opcode::ZIncrBy,
            key.to_vec(),
            payload::encode_score_member(delta, member),
        )])?;
        let applied = ks.zincr_by(key, member, delta, now)?;
        self.note_write(ChangeKind::ZIncrBy, key, None);
        Ok(applied)
    }

    /// Remove and return up to `n` lowest-scored members.
    pub fn zpop_min(&self, key: &[u8], n: usize) -> Result<Vec<(Vec<u8>, f64)>> {
        self.zpop(key, n, true)
    }

    /// Remove and return up to `n` highest-scored members, highest first.
    pub fn zpop_max(&self, key: &[u8], n: usize) -> Result<Vec<(Vec<u8>, f64)>> {
        self.zpop(key, n, false)
    }

    fn zpop(&self, key: &[u8], n: usize, min: bool) -> Result<Vec<(Vec<u8>, f64)>> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::ZSet, now)?;
        if n == 0 {
            return Ok(Vec::new());
        }
        let victims = if min {
            ks.zrange_by_rank(key, 0, n.saturating_sub(1) as i64, now)?
        } else {
            let mut page = ks.zrange_by_rank(key, -(n as i64), -1, now)?;
            page.reverse();
            page
        };
        if victims.is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<Record> = victims
            .iter()
            .map(|(member, _)| Record::with_value(Opcode::ZRem, key.to_vec(), member.clone()))
            .collect();
        self.append_wal(&records)?;
        let members: Vec<Vec<u8>> = victims.iter().map(|(member, _)| member.clone()).collect();
        ks.zrem(key, &members, now)?;
        self.note_write(ChangeKind::ZRem, key, None);
        Ok(victims)
    }

    /// Remove a rank window; returns the count.
    pub fn zrem_range_by_rank(&self, key: &[u8], start: i64, stop: i64) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::ZSet, now)?;
        if ks.zcard(key, now)? == 0 {
            return Ok(0);
        }
        self.append_wal(&[Record::with_value(
            Opcode::ZRemRangeRank,
            key.to_vec(),
            payload::encode_rank_range(clamp_i32(start), clamp_i32(stop)),
        )])?;
        let removed = ks.zrem_range_by_rank(key, start, stop, now)?;
        self.note_write(ChangeKind::ZRemRange, key, None);
        Ok(removed)
    }

    /// Remove a score window; returns the count.
    pub fn zrem_range_by_score(
        &self,
        key: &[u8],
        min: ScoreBound,
        max: ScoreBound,
    ) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::ZSet, now)?;
        if ks.zcard(key, now)? == 0 {
            return Ok(0);
        }
        self.append_wal(&[Record::with_value(
            Opcode::ZRemRangeScore,
            key.to_vec(),
            payload::encode_score_range(min.as_inclusive_min(), max.as_inclusive_max()),
        )])?;
        let removed = ks.zrem_range_by_score(key, min, max, now)?;
        self.note_write(ChangeKind::ZRemRange, key, None);
        Ok(removed)
    }
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
