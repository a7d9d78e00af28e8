//! Set operations on the engine. `SPOP` chooses its victims first and is
//! journaled as one `SREM` per popped member, so replay is deterministic
//! despite the randomness.

use crate::cdc::ChangeKind;
use crate::engine::Engine;
use ember_core::{now_ms, Key, Result};
use ember_store::EntryType;
use ember_wal::{Opcode, Record};

impl Engine {
    /// Add members; returns how many were new.
    pub fn sadd(&self, key: &[u8], members: Vec<Vec<u8>>) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::Set, now)?;
        let records: Vec<Record> = members
            .iter()
            .map(|member| Record::with_value(Opcode::SAdd, key.to_vec(), member.clone()))
            .collect();
        self.append_wal(&records)?;
        let added = ks.sadd(key, members, now)?;
        self.note_write(ChangeKind::SAdd, key, None);
        Ok(added)
    }

    /// Remove members; returns how many existed.
    pub fn srem(&self, key: &[u8], members: &[Vec<u8>]) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::Set, now)?;
        let present: Vec<&Vec<u8>> = members
            .iter()
            .filter(|member| matches!(ks.sismember(key, member, now), Ok(true)))
            .collect();
        if present.is_empty() {
            return Ok(0);
        }
        let records: Vec<Record> = present
            .iter()
            .map(|member| Record::with_value(Opcode::SRem, key.to_vec(), member.to_vec()))
            .collect();
        self.append_wal(&records)?;
        let removed = ks.srem(key, members, now)?;
        self.note_write(ChangeKind::SRem, key, None);
        Ok(removed)
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let ks = self.store.read();
        let found = ks.sismember(key, member, now_ms())?;
        self.note_read(key);
        Ok(found)
    }

    pub fn scard(&self, key: &[u8]) -> Result<usize> {
        let ks = self.store.read();
        let card = ks.scard(key, now_ms())?;
        self.note_read(key);
        Ok(card)
    }

    pub fn smembers(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let ks = self.store.read();
        let members = ks.smembers(key, now_ms())?;
        self.note_read(key);
        Ok(members)
    }

    /// Non-destructive random members; see `Keyspace::srand_member` for
    /// the sign convention.
    pub fn srand_member(&self, key: &[u8], n: i64) -> Result<Vec<Vec<u8>>> {
        let ks = self.store.read();
        let members = ks.srand_member(key, n, &mut rand::thread_rng(), now_ms())?;
        self.note_read(key);
        Ok(members)
    }

    /// Destructively pop up to `n` random members.
    pub fn spop(&self, key: &[u8], n: usize) -> Result<Vec<Vec<u8>>> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::Set, now)?;
        // Choose the victims first so the journal records exactly what
        // the in-memory apply will remove.
        let victims = ks.srand_member(key, n as i64, &mut rand::thread_rng(), now)?;
        if victims.is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<Record> = victims
            .iter()
            .map(|member| Record::with_value(Opcode::SRem, key.to_vec(), member.clone()))
            .collect();
        self.append_wal(&records)?;
        ks.srem(key, &victims, now)?;
        self.note_write(ChangeKind::SPop, key, None);
        Ok(victims)
    }

    pub fn sinter(&self, keys: &[Key]) -> Result<Vec<Vec<u8>>> {
        let ks = self.store.read();
        let members = ks.sinter(keys, now_ms())?;
        self.note_scan();
        Ok(members)
    }

    pub fn sunion(&self, keys: &[Key]) -> Result<Vec<Vec<u8>>> {
        let ks = self.store.read();
        let members = ks.sunion(keys, now_ms())?;
        self.note_scan();
        Ok(members)
    }

    pub fn sdiff(&self, keys: &[Key]) -> Result<Vec<Vec<u8>>> {
        let ks = self.store.read();
        let members = ks.sdiff(keys, now_ms())?;
        self.note_scan();
        Ok(members)
    }
}
