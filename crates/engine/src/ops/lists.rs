//! List operations on the engine.
//!
//! Multi-value pushes journal one record per element; `LPUSH` journals in
//! reverse argument order so that replaying single-element prepends
//! rebuilds the same block order. `LINSERT` and `LREM` journal the full
//! post-mutation list as a `LIST_REWRITE` record, keeping replay exact for
//! interior edits.

use crate::cdc::ChangeKind;
use crate::engine::Engine;
use ember_core::{now_ms, Error, Result};
use ember_store::{linsert_plan, lrem_plan, EntryType};
use ember_wal::{payload, Opcode, Record};

impl Engine {
    pub fn lpush(&self, key: &[u8], values: Vec<Vec<u8>>) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::List, now)?;
        let records: Vec<Record> = values
            .iter()
            .rev()
            .map(|value| Record::with_value(Opcode::LPush, key.to_vec(), value.clone()))
            .collect();
        self.append_wal(&records)?;
        let len = ks.lpush(key, values, now)?;
        self.note_write(ChangeKind::LPush, key, None);
        Ok(len)
    }

    pub fn rpush(&self, key: &[u8], values: Vec<Vec<u8>>) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::List, now)?;
        let records: Vec<Record> = values
            .iter()
            .map(|value| Record::with_value(Opcode::RPush, key.to_vec(), value.clone()))
            .collect();
        self.append_wal(&records)?;
        let len = ks.rpush(key, values, now)?;
        self.note_write(ChangeKind::RPush, key, None);
        Ok(len)
    }

    pub fn lpop(&self, key: &[u8], n: usize) -> Result<Vec<Vec<u8>>> {
        self.pop_end(key, n, true)
    }

    pub fn rpop(&self, key: &[u8], n: usize) -> Result<Vec<Vec<u8>>> {
        self.pop_end(key, n, false)
    }

    fn pop_end(&self, key: &[u8], n: usize, head: bool) -> Result<Vec<Vec<u8>>> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::List, now)?;
        let take = n.min(ks.llen(key, now)?);
        if take == 0 {
            return Ok(Vec::new());
        }
        let opcode = if head { Opcode::LPop } else { Opcode::RPop };
        let records: Vec<Record> = (0..take).map(|_| Record::bare(opcode, key.to_vec())).collect();
        self.append_wal(&records)?;
        let popped = if head {
            ks.lpop(key, n, now)?
        } else {
            ks.rpop(key, n, now)?
        };
        self.note_write(
            if head { ChangeKind::LPop } else { ChangeKind::RPop },
            key,
            None,
        );
        Ok(popped)
    }

    pub fn llen(&self, key: &[u8]) -> Result<usize> {
        let ks = self.store.read();
        let len = ks.llen(key, now_ms())?;
        self.note_read(key);
        Ok(len)
    }

    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Option<Vec<u8>>> {
        let ks = self.store.read();
        let value = ks.lindex(key, index, now_ms())?;
        self.note_read(key);
        Ok(value)
    }

    pub fn lset(&self, key: &[u8], index: i64, value: Vec<u8>) -> Result<()> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::List, now)?;
        let len = ks.llen(key, now)?;
        if len == 0 {
            return Err(Error::NoSuchKey);
        }
        let resolved = if index < 0 { len as i64 + index } else { index };
        if resolved < 0 || resolved >= len as i64 {
            return Err(Error::IndexOutOfRange);
        }
        self.append_wal(&[Record::with_value(
            Opcode::LSet,
            key.to_vec(),
            payload::encode_index_value(clamp_i32(index), &value.clone()),
        )])?;
        ks.lset(key, index, value, now)?;
        self.note_write(ChangeKind::LSet, key, None);
        Ok(())
    }

    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let ks = self.store.read();
        let slice = ks.lrange(key, start, stop, now_ms())?;
        self.note_read(key);
        Ok(slice)
    }

    /// Returns the new length, `-1` pivot absent, `0` key absent.
    pub fn linsert(&self, key: &[u8], before: bool, pivot: &[u8], value: Vec<u8>) -> Result<i64> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::List, now)?;
        let current = ks.list_snapshot(key, now);
        if current.is_empty() {
            return Ok(0);
        }
        let Some(next) = linsert_plan(&current, before, pivot, value) else {
            return Ok(-1);
        };
        self.append_wal(&[Record::with_value(
            Opcode::ListRewrite,
            key.to_vec(),
            payload::encode_list(&next),
        )])?;
        let len = next.len() as i64;
        ks.list_replace(key, next);
        self.note_write(ChangeKind::ListRewrite, key, None);
        Ok(len)
    }

    /// Returns the number of removed occurrences.
    pub fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::List, now)?;
        let current = ks.list_snapshot(key, now);
        if current.is_empty() {
            return Ok(0);
        }
        let (next, removed) = lrem_plan(&current, count, value);
        if removed == 0 {
            return Ok(0);
        }
        self.append_wal(&[Record::with_value(
            Opcode::ListRewrite,
            key.to_vec(),
            payload::encode_list(&next),
        )])?;
        ks.list_replace(key, next);
        self.note_write(ChangeKind::ListRewrite, key, None);
        Ok(removed)
    }

    pub fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> Result<()> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::List, now)?;
        if ks.llen(key, now)? == 0 {
            return Ok(());
        }
        self.append_wal(&[Record::with_value(
            Opcode::LTrim,
            key.to_vec(),
            payload::encode_rank_range(clamp_i32(start), clamp_i32(stop)),
        )])?;
        ks.ltrim(key, start, stop, now)?;
        self.note_write(ChangeKind::LTrim, key, None);
        Ok(())
    }
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
