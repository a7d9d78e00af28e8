//! Hash operations on the engine. Each field write is journaled as its
//! own `HSET` record; `HINCRBY*` journals the resulting field value.

use crate::cdc::ChangeKind;
use crate::engine::Engine;
use ember_core::{now_ms, Error, Result};
use ember_store::{format_f64, parse_f64, parse_i64, EntryType};
use ember_wal::{payload, Opcode, Record};

impl Engine {
    /// Set fields; returns how many were newly created.
    pub fn hset(&self, key: &[u8], pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::Hash, now)?;
        let records: Vec<Record> = pairs
            .iter()
            .map(|(field, value)| {
                Record::with_value(
                    Opcode::HSet,
                    key.to_vec(),
                    payload::encode_field_value(field, value),
                )
            })
            .collect();
        self.append_wal(&records)?;
        let created = ks.hset(key, pairs, now)?;
        self.note_write(ChangeKind::HSet, key, None);
        Ok(created)
    }

    pub fn hsetnx(&self, key: &[u8], field: &[u8], value: Vec<u8>) -> Result<bool> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::Hash, now)?;
        if ks.hget(key, field, now)?.is_some() {
            return Ok(false);
        }
        self.append_wal(&[Record::with_value(
            Opcode::HSet,
            key.to_vec(),
            payload::encode_field_value(field, &value),
        )])?;
        ks.hsetnx(key, field, value, now)?;
        self.note_write(ChangeKind::HSet, key, None);
        Ok(true)
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> Result<Option<Vec<u8>>> {
        let ks = self.store.read();
        let value = ks.hget(key, field, now_ms())?;
        self.note_read(key);
        Ok(value)
    }

    /// Delete fields; returns how many existed.
    pub fn hdel(&self, key: &[u8], fields: &[Vec<u8>]) -> Result<usize> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::Hash, now)?;
        let present: Vec<&Vec<u8>> = fields
            .iter()
            .filter(|field| matches!(ks.hget(key, field, now), Ok(Some(_))))
            .collect();
        if present.is_empty() {
            return Ok(0);
        }
        let records: Vec<Record> = present
            .iter()
            .map(|field| Record::with_value(Opcode::HDel, key.to_vec(), field.to_vec()))
            .collect();
        self.append_wal(&records)?;
        let removed = ks.hdel(key, fields, now)?;
        self.note_write(ChangeKind::HDel, key, None);
        Ok(removed)
    }

    pub fn hexists(&self, key: &[u8], field: &[u8]) -> Result<bool> {
        Ok(self.hget(key, field)?.is_some())
    }

    pub fn hlen(&self, key: &[u8]) -> Result<usize> {
        let ks = self.store.read();
        let len = ks.hlen(key, now_ms())?;
        self.note_read(key);
        Ok(len)
    }

    pub fn hgetall(&self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let ks = self.store.read();
        let fields = ks.hgetall(key, now_ms())?;
        self.note_read(key);
        Ok(fields)
    }

    pub fn hkeys(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let ks = self.store.read();
        let fields = ks.hkeys(key, now_ms())?;
        self.note_read(key);
        Ok(fields)
    }

    pub fn hvals(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let ks = self.store.read();
        let values = ks.hvals(key, now_ms())?;
        self.note_read(key);
        Ok(values)
    }

    pub fn hmget(&self, key: &[u8], fields: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        let ks = self.store.read();
        let values = ks.hmget(key, fields, now_ms())?;
        self.note_read(key);
        Ok(values)
    }

    pub fn hincr_by(&self, key: &[u8], field: &[u8], delta: i64) -> Result<i64> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::Hash, now)?;
        let current = match ks.hget(key, field, now)? {
            Some(raw) => parse_i64(&raw)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(Error::NotInteger)?;
        self.append_wal(&[Record::with_value(
            Opcode::HSet,
            key.to_vec(),
            payload::encode_field_value(field, next.to_string().as_bytes()),
        )])?;
        let applied = ks.hincr_by(key, field, delta, now)?;
        self.note_write(ChangeKind::HSet, key, None);
        Ok(applied)
    }

    pub fn hincr_by_float(&self, key: &[u8], field: &[u8], delta: f64) -> Result<f64> {
        let now = now_ms();
        let mut ks = self.store.write();
        ks.check_type(key, EntryType::Hash, now)?;
        let current = match ks.hget(key, field, now)? {
            Some(raw) => parse_f64(&raw)?,
            None => 0.0,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(Error::NotFloat);
        }
        self.append_wal(&[Record::with_value(
            Opcode::HSet,
            key.to_vec(),
            payload::encode_field_value(field, format_f64(next).as_bytes()),
        )])?;
        let applied = ks.hincr_by_float(key, field, delta, now)?;
        self.note_write(ChangeKind::HSet, key, None);
        Ok(applied)
    }
}
