//! Composite value-field payloads.
//!
//! Operations with more operands than (key, value, expiry) pack the extras
//! into the record's value field. These layouts are part of the on-disk
//! format; all integers and floats are little-endian.
//!
//! | opcode              | value field layout                               |
//! |---------------------|--------------------------------------------------|
//! | `ZADD` / `ZINCRBY`  | `score f64 \|\| member`                          |
//! | `ZREM_RANGE_RANK`   | `start i32 \|\| stop i32`                        |
//! | `ZREM_RANGE_SCORE`  | `min f64 \|\| max f64`                           |
//! | `HSET`              | `field_len u32 \|\| field \|\| value`            |
//! | `LSET`              | `index i32 \|\| value`                           |
//! | `LTRIM`             | `start i32 \|\| stop i32`                        |
//! | `LIST_REWRITE`      | repeated `elem_len u32 \|\| elem`                |
//! | `TSADD`             | `timestamp i64 \|\| value f64` (reserved)        |

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ember_core::{Error, Result};
use std::io::Cursor;

/// `score || member` for ZADD and ZINCRBY.
pub fn encode_score_member(score: f64, member: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + member.len());
    let _ = buf.write_f64::<LittleEndian>(score);
    buf.extend_from_slice(member);
    buf
}

pub fn decode_score_member(value: &[u8]) -> Result<(f64, &[u8])> {
    if value.len() < 8 {
        return Err(Error::Corruption("score/member payload too short".into()));
    }
    let mut cur = Cursor::new(value);
    let score = cur.read_f64::<LittleEndian>().map_err(corrupt)?;
    Ok((score, &value[8..]))
}

/// `start || stop` for rank ranges and LTRIM.
pub fn encode_rank_range(start: i32, stop: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8);
    let _ = buf.write_i32::<LittleEndian>(start);
    let _ = buf.write_i32::<LittleEndian>(stop);
    buf
}

pub fn decode_rank_range(value: &[u8]) -> Result<(i32, i32)> {
    if value.len() < 8 {
        return Err(Error::Corruption("rank range payload too short".into()));
    }
    let mut cur = Cursor::new(value);
    let start = cur.read_i32::<LittleEndian>().map_err(corrupt)?;
    let stop = cur.read_i32::<LittleEndian>().map_err(corrupt)?;
    Ok((start, stop))
}

/// `min || max` for score ranges.
pub fn encode_score_range(min: f64, max: f64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    let _ = buf.write_f64::<LittleEndian>(min);
    let _ = buf.write_f64::<LittleEndian>(max);
    buf
}

pub fn decode_score_range(value: &[u8]) -> Result<(f64, f64)> {
    if value.len() < 16 {
        return Err(Error::Corruption("score range payload too short".into()));
    }
    let mut cur = Cursor::new(value);
    let min = cur.read_f64::<LittleEndian>().map_err(corrupt)?;
    let max = cur.read_f64::<LittleEndian>().map_err(corrupt)?;
    Ok((min, max))
}

/// `field_len || field || value` for HSET.
pub fn encode_field_value(field: &[u8], value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + field.len() + value.len());
    let _ = buf.write_u32::<LittleEndian>(field.len() as u32);
    buf.extend_from_slice(field);
    buf.extend_from_slice(value);
    buf
}

pub fn decode_field_value(value: &[u8]) -> Result<(&[u8], &[u8])> {
    if value.len() < 4 {
        return Err(Error::Corruption("field/value payload too short".into()));
    }
    let mut cur = Cursor::new(value);
    let field_len = cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
    if value.len() < 4 + field_len {
        return Err(Error::Corruption("field length overruns payload".into()));
    }
    Ok((&value[4..4 + field_len], &value[4 + field_len..]))
}

/// `index || value` for LSET.
pub fn encode_index_value(index: i32, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + value.len());
    let _ = buf.write_i32::<LittleEndian>(index);
    buf.extend_from_slice(value);
    buf
}

pub fn decode_index_value(value: &[u8]) -> Result<(i32, &[u8])> {
    if value.len() < 4 {
        return Err(Error::Corruption("index/value payload too short".into()));
    }
    let mut cur = Cursor::new(value);
    let index = cur.read_i32::<LittleEndian>().map_err(corrupt)?;
    Ok((index, &value[4..]))
}

/// Repeated `elem_len || elem` for LIST_REWRITE: the full post-mutation
/// list emitted by LINSERT and LREM, replayed as a wholesale replacement.
pub fn encode_list(elems: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = elems.iter().map(|e| 4 + e.len()).sum();
    let mut buf = Vec::with_capacity(total);
    for elem in elems {
        let _ = buf.write_u32::<LittleEndian>(elem.len() as u32);
        buf.extend_from_slice(elem);
    }
    buf
}

pub fn decode_list(value: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut elems = Vec::new();
    let mut offset = 0usize;
    while offset < value.len() {
        if value.len() - offset < 4 {
            return Err(Error::Corruption("list element header too short".into()));
        }
        let mut cur = Cursor::new(&value[offset..]);
        let len = cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
        offset += 4;
        if value.len() - offset < len {
            return Err(Error::Corruption("list element overruns payload".into()));
        }
        elems.push(value[offset..offset + len].to_vec());
        offset += len;
    }
    Ok(elems)
}

fn corrupt(e: std::io::Error) -> Error {
    Error::Corruption(e.to_string())
}
