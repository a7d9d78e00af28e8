//! String operations on the engine.
//!
//! Commands without a dedicated opcode (`APPEND`, `SETRANGE`, `INCR*`)
//! journal the resulting value as a plain `SET`/`SET_TTL` of the key, so
//! replay needs no arithmetic.

use crate::cdc::ChangeKind;
use crate::engine::Engine;
use ember_core::{now_ms, Error, Key, Result};
use ember_store::{format_f64, parse_f64, parse_i64, EntryType, Keyspace};
use ember_wal::{Opcode, Record};

/// Conditions and modifiers of `SET`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Absolute deadline to attach.
    pub deadline_ms: Option<i64>,
    /// Keep the key's current deadline instead of clearing it.
    pub keep_ttl: bool,
    /// Only set when the key does not exist.
    pub nx: bool,
    /// Only set when the key already exists.
    pub xx: bool,
    /// Return the previous value (fails on wrong type).
    pub want_old: bool,
}

/// Result of a conditional `SET`.
#[derive(Debug, Clone, Default)]
pub struct SetOutcome {
    /// Whether the write happened (NX/XX may veto it).
    pub applied: bool,
    /// Previous value, when requested.
    pub old: Option<Vec<u8>>,
}

/// Deadline adjustment of `GETEX`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TtlChange {
    /// Leave the deadline untouched.
    Keep,
    /// Drop the deadline.
    Persist,
    /// Set an absolute deadline.
    Deadline(i64),
}

impl Engine {
    /// `SET` with the full option set.
    pub fn set_value(&self, key: &[u8], value: Vec<u8>, opts: SetOptions) -> Result<SetOutcome> {
        let now = now_ms();
        let mut ks = self.store.write();

        let old = if opts.want_old {
            ks.get(key, now)?
        } else {
            None
        };
        let exists = ks.is_live(key, now);
        if (opts.nx && exists) || (opts.xx && !exists) {
            return Ok(SetOutcome {
                applied: false,
                old,
            });
        }

        let deadline = opts.deadline_ms.or(if opts.keep_ttl {
            ks.deadline_ms(key).filter(|_| exists)
        } else {
            None
        });
        let record = match deadline {
            Some(deadline) => {
                Record::with_expiry(Opcode::SetTtl, key.to_vec(), value.clone(), deadline)
            }
            None => Record::with_value(Opcode::Set, key.to_vec(), value.clone()),
        };
        self.append_wal(&[record])?;

        match deadline {
            Some(deadline) => ks.set_with_expiry(key, value.clone(), deadline, now),
            None => ks.set(key, value.clone(), now),
        }
        self.note_write(ChangeKind::Set, key, Some(&value));
        Ok(SetOutcome { applied: true, old })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let ks = self.store.read();
        let value = ks.get(key, now_ms())?;
        self.note_read(key);
        Ok(value)
    }

    pub fn setnx(&self, key: &[u8], value: Vec<u8>) -> Result<bool> {
        let outcome = self.set_value(
            key,
            value,
            SetOptions {
                nx: true,
                ..SetOptions::default()
            },
        )?;
        Ok(outcome.applied)
    }

    pub fn getset(&self, key: &[u8], value: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let outcome = self.set_value(
            key,
            value,
            SetOptions {
                want_old: true,
                ..SetOptions::default()
            },
        )?;
        Ok(outcome.old)
    }

    pub fn getdel(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let now = now_ms();
        let mut ks = self.store.write();
        let old = ks.get(key, now)?;
        if old.is_some() {
            self.append_wal(&[Record::bare(Opcode::Del, key.to_vec())])?;
            ks.getdel(key, now)?;
            self.note_write(ChangeKind::Del, key, None);
        }
        Ok(old)
    }

    /// `GETEX`: read, optionally adjusting the deadline.
    pub fn getex(&self, key: &[u8], change: TtlChange) -> Result<Option<Vec<u8>>> {
        let now = now_ms();
        let mut ks = self.store.write();
        let Some(value) = ks.get(key, now)? else {
            return Ok(None);
        };
        match change {
            TtlChange::Keep => {}
            TtlChange::Persist => {
                if ks.deadline_ms(key).is_some() {
                    self.append_wal(&[Record::bare(Opcode::Persist, key.to_vec())])?;
                    ks.persist(key, now);
                    self.note_write(ChangeKind::Persist, key, None);
                }
            }
            TtlChange::Deadline(deadline) => {
                if deadline <= now {
                    self.append_wal(&[Record::bare(Opcode::Del, key.to_vec())])?;
                    ks.remove_key(key);
                    self.note_write(ChangeKind::Del, key, None);
                } else {
                    self.append_wal(&[Record::with_expiry(
                        Opcode::Expire,
                        key.to_vec(),
                        Vec::new(),
                        deadline,
                    )])?;
                    ks.expire_at(key, deadline, now);
                    self.note_write(ChangeKind::Expire, key, None);
                }
            }
        }
        self.note_read(key);
        Ok(Some(value))
    }

    pub fn append(&self, key: &[u8], suffix: &[u8]) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        let mut next = ks.get(key, now)?.unwrap_or_default();
        next.extend_from_slice(suffix);
        self.append_wal(&[value_record(&ks, key, next, now)])?;
        let len = ks.append(key, suffix, now)?;
        self.note_write(ChangeKind::Set, key, None);
        Ok(len)
    }

    pub fn strlen(&self, key: &[u8]) -> Result<usize> {
        let ks = self.store.read();
        let len = ks.strlen(key, now_ms())?;
        self.note_read(key);
        Ok(len)
    }

    pub fn getrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<u8>> {
        let ks = self.store.read();
        let slice = ks.getrange(key, start, stop, now_ms())?;
        self.note_read(key);
        Ok(slice)
    }

    pub fn setrange(&self, key: &[u8], offset: usize, patch: &[u8]) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::String, now)?;
        let mut next = ks.get(key, now)?.unwrap_or_default();
        if next.len() < offset + patch.len() {
            next.resize(offset + patch.len(), 0);
        }
        next[offset..offset + patch.len()].copy_from_slice(patch);
        self.append_wal(&[value_record(&ks, key, next, now)])?;
        let len = ks.setrange(key, offset, patch, now)?;
        self.note_write(ChangeKind::Set, key, None);
        Ok(len)
    }

    pub fn incr_by(&self, key: &[u8], delta: i64) -> Result<i64> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::String, now)?;
        let current = match ks.get(key, now)? {
            Some(raw) => parse_i64(&raw)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(Error::NotInteger)?;
        self.append_wal(&[value_record(&ks, key, next.to_string().into_bytes(), now)])?;
        let applied = ks.incr_by(key, delta, now)?;
        self.note_write(ChangeKind::Set, key, None);
        Ok(applied)
    }

    pub fn incr_by_float(&self, key: &[u8], delta: f64) -> Result<f64> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::String, now)?;
        let current = match ks.get(key, now)? {
            Some(raw) => parse_f64(&raw)?,
            None => 0.0,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(Error::NotFloat);
        }
        self.append_wal(&[value_record(&ks, key, format_f64(next).into_bytes(), now)])?;
        let applied = ks.incr_by_float(key, delta, now)?;
        self.note_write(ChangeKind::Set, key, None);
        Ok(applied)
    }

    pub fn mset(&self, pairs: Vec<(Key, Vec<u8>)>) -> Result<()> {
        let now = now_ms();
        let mut ks = self.store.write();
        let records: Vec<Record> = pairs
            .iter()
            .map(|(key, value)| Record::with_value(Opcode::Set, key.clone(), value.clone()))
            .collect();
        self.append_wal(&records)?;
        for (key, value) in pairs {
            ks.set(&key, value.clone(), now);
            self.note_write(ChangeKind::Set, &key, Some(&value));
        }
        Ok(())
    }

    pub fn mget(&self, keys: &[Key]) -> Vec<Option<Vec<u8>>> {
        let ks = self.store.read();
        let values = ks.mget(keys, now_ms());
        for key in keys {
            self.note_read(key);
        }
        values
    }

    pub fn msetnx(&self, pairs: Vec<(Key, Vec<u8>)>) -> Result<bool> {
        let now = now_ms();
        let mut ks = self.store.write();
        if pairs.iter().any(|(key, _)| ks.is_live(key, now)) {
            return Ok(false);
        }
        let records: Vec<Record> = pairs
            .iter()
            .map(|(key, value)| Record::with_value(Opcode::Set, key.clone(), value.clone()))
            .collect();
        self.append_wal(&records)?;
        for (key, value) in pairs {
            ks.set(&key, value.clone(), now);
            self.note_write(ChangeKind::Set, &key, Some(&value));
        }
        Ok(true)
    }
}

/// `SET` or `SET_TTL` record carrying `value`, preserving the key's
/// current deadline.
fn value_record(ks: &Keyspace, key: &[u8], value: Vec<u8>, now: i64) -> Record {
    match ks.deadline_ms(key).filter(|_| ks.is_live(key, now)) {
        Some(deadline) => Record::with_expiry(Opcode::SetTtl, key.to_vec(), value, deadline),
        None => Record::with_value(Opcode::Set, key.to_vec(), value),
    }
}
