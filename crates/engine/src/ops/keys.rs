//! Generic key operations: deletion, expiry, introspection, rename/copy.

use crate::cdc::ChangeKind;
use crate::engine::Engine;
use ember_core::{now_ms, Error, Key, Result};
use ember_store::{EntryType, Keyspace, ScanPage};
use ember_wal::{payload, Opcode, Record};

impl Engine {
    /// Delete keys; returns how many existed.
    pub fn del(&self, keys: &[Key]) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        let live: Vec<&Key> = keys.iter().filter(|key| ks.is_live(key, now)).collect();
        let records: Vec<Record> = live
            .iter()
            .map(|key| Record::bare(Opcode::Del, key.to_vec()))
            .collect();
        self.append_wal(&records)?;
        let removed = ks.del(keys, now);
        for key in &live {
            self.note_write(ChangeKind::Del, key, None);
        }
        Ok(removed)
    }

    pub fn exists(&self, keys: &[Key]) -> usize {
        let now = now_ms();
        let ks = self.store.read();
        let count = ks.exists(keys, now);
        for key in keys {
            self.note_read(key);
        }
        count
    }

    /// Set an absolute deadline; returns false when the key is absent. A
    /// past deadline deletes immediately and is journaled as a delete.
    pub fn expire_at(&self, key: &[u8], deadline_ms: i64) -> Result<bool> {
        let now = now_ms();
        let mut ks = self.store.write();
        if !ks.is_live(key, now) {
            return Ok(false);
        }
        if deadline_ms <= now {
            self.append_wal(&[Record::bare(Opcode::Del, key.to_vec())])?;
            ks.remove_key(key);
            self.note_write(ChangeKind::Del, key, None);
        } else {
            self.append_wal(&[Record::with_expiry(
                Opcode::Expire,
                key.to_vec(),
                Vec::new(),
                deadline_ms,
            )])?;
            ks.expire_at(key, deadline_ms, now);
            self.note_write(ChangeKind::Expire, key, None);
        }
        Ok(true)
    }

    /// Clear a deadline; returns true when one was cleared.
    pub fn persist(&self, key: &[u8]) -> Result<bool> {
        let now = now_ms();
        let mut ks = self.store.write();
        if !ks.is_live(key, now) || ks.deadline_ms(key).is_none() {
            return Ok(false);
        }
        self.append_wal(&[Record::bare(Opcode::Persist, key.to_vec())])?;
        ks.persist(key, now);
        self.note_write(ChangeKind::Persist, key, None);
        Ok(true)
    }

    /// Remaining TTL in ms: `None` absent key, `Some(None)` no deadline.
    #[allow(clippy::option_option)]
    pub fn ttl_ms(&self, key: &[u8]) -> Option<Option<i64>> {
        let ks = self.store.read();
        let ttl = ks.ttl_ms(key, now_ms());
        self.note_read(key);
        ttl
    }

    pub fn type_of(&self, key: &[u8]) -> Option<EntryType> {
        let ks = self.store.read();
        let t = ks.type_of(key, now_ms());
        self.note_read(key);
        t
    }

    pub fn keys(&self, pattern: &[u8]) -> Vec<Key> {
        let ks = self.store.read();
        let keys = ks.keys(pattern, now_ms());
        self.note_scan();
        keys
    }

    pub fn scan(&self, cursor: u64, pattern: Option<&[u8]>, count: usize) -> ScanPage {
        let ks = self.store.read();
        let page = ks.scan(cursor, pattern, count, now_ms());
        self.note_scan();
        page
    }

    pub fn rename(&self, src: &[u8], dst: &[u8]) -> Result<()> {
        let now = now_ms();
        let mut ks = self.store.write();
        if !ks.is_live(src, now) {
            return Err(Error::NoSuchKey);
        }
        let mut records = recreate_records(&ks, src, dst, now);
        records.push(Record::bare(Opcode::Del, src.to_vec()));
        self.append_wal(&records)?;
        ks.rename(src, dst, now)?;
        self.note_write(ChangeKind::Rename, dst, None);
        Ok(())
    }

    pub fn renamenx(&self, src: &[u8], dst: &[u8]) -> Result<bool> {
        let now = now_ms();
        let mut ks = self.store.write();
        if !ks.is_live(src, now) {
            return Err(Error::NoSuchKey);
        }
        if ks.is_live(dst, now) {
            return Ok(false);
        }
        let mut records = recreate_records(&ks, src, dst, now);
        records.push(Record::bare(Opcode::Del, src.to_vec()));
        self.append_wal(&records)?;
        ks.rename(src, dst, now)?;
        self.note_write(ChangeKind::Rename, dst, None);
        Ok(true)
    }

    pub fn copy(&self, src: &[u8], dst: &[u8], replace: bool) -> Result<bool> {
        let now = now_ms();
        let mut ks = self.store.write();
        if !ks.is_live(src, now) {
            return Ok(false);
        }
        if ks.is_live(dst, now) && !replace {
            return Ok(false);
        }
        let records = recreate_records(&ks, src, dst, now);
        self.append_wal(&records)?;
        ks.copy(src, dst, replace, now);
        self.note_write(ChangeKind::Copy, dst, None);
        Ok(true)
    }

    pub fn random_key(&self) -> Option<Key> {
        let ks = self.store.read();
        let key = ks.random_key(&mut rand::thread_rng(), now_ms());
        self.note_scan();
        key
    }

    /// Count existing keys, recording an access for each (`TOUCH`).
    pub fn touch(&self, keys: &[Key]) -> usize {
        self.exists(keys)
    }

    pub fn dbsize(&self) -> usize {
        let ks = self.store.read();
        let size = ks.dbsize(now_ms());
        self.note_scan();
        size
    }

    pub fn memory_usage(&self, key: &[u8]) -> Option<usize> {
        let ks = self.store.read();
        let usage = ks.memory_usage(key, now_ms());
        self.note_read(key);
        usage
    }
}

/// Records that rebuild `src`'s value under the name `dst`: a delete of
/// the destination, the primitive mutations that recreate the value, and
/// the deadline if one is set. Used by RENAME and COPY, which have no
/// dedicated opcode.
fn recreate_records(ks: &Keyspace, src: &[u8], dst: &[u8], now: i64) -> Vec<Record> {
    let mut records = vec![Record::bare(Opcode::Del, dst.to_vec())];
    match ks.type_of(src, now) {
        Some(EntryType::String) => {
            if let Ok(Some(value)) = ks.get(src, now) {
                match ks.deadline_ms(src) {
                    Some(deadline) => records.push(Record::with_expiry(
                        Opcode::SetTtl,
                        dst.to_vec(),
                        value,
                        deadline,
                    )),
                    None => records.push(Record::with_value(Opcode::Set, dst.to_vec(), value)),
                }
                return records;
            }
        }
        Some(EntryType::Hash) => {
            if let Ok(fields) = ks.hgetall(src, now) {
                for (field, value) in fields {
                    records.push(Record::with_value(
                        Opcode::HSet,
                        dst.to_vec(),
                        payload::encode_field_value(&field, &value),
                    ));
                }
            }
        }
        Some(EntryType::List) => {
            for elem in ks.list_snapshot(src, now) {
                records.push(Record::with_value(Opcode::RPush, dst.to_vec(), elem));
            }
        }
        Some(EntryType::Set) => {
            if let Ok(members) = ks.smembers(src, now) {
                for member in members {
                    records.push(Record::with_value(Opcode::SAdd, dst.to_vec(), member));
                }
            }
        }
        Some(EntryType::ZSet) => {
            if let Ok(members) = ks.zrange_by_rank(src, 0, -1, now) {
                for (member, score) in members {
                    records.push(Record::with_value(
                        Opcode::ZAdd,
                        dst.to_vec(),
                        payload::encode_score_member(score, &member),
                    ));
                }
            }
        }
        None => {}
    }
    if let Some(deadline) = ks.deadline_ms(src) {
        records.push(Record::with_expiry(
            Opcode::Expire,
            dst.to_vec(),
            Vec::new(),
            deadline,
        ));
    }
    records
}
