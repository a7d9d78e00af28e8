//! WAL record type and its bit-exact binary encoding.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ember_core::{Error, Result};
use std::io::Cursor;

/// Per-record marker. Scanning stops at the first header whose magic
/// does not match; everything after is treated as the crash tail.
pub const RECORD_MAGIC: u16 = 0xFD1B;

/// Fixed header length in bytes (magic through crc32).
pub const HEADER_SIZE: usize = 24;

/// Sanity cap on key/value lengths; a header claiming more than this is
/// corrupt regardless of its CRC field.
const MAX_FIELD_LEN: u32 = 512 * 1024 * 1024;

/// Operation codes. The numeric values are part of the on-disk format and
/// must never be renumbered. `TsAdd`/`TsDel` are reserved by older logs;
/// replay skips them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Set = 1,
    SetTtl = 2,
    Del = 3,
    Expire = 4,
    Persist = 5,
    ZAdd = 10,
    ZRem = 11,
    ZIncrBy = 12,
    ZRemRangeRank = 13,
    ZRemRangeScore = 14,
    HSet = 20,
    HDel = 21,
    LPush = 30,
    RPush = 31,
    LPop = 32,
    RPop = 33,
    LSet = 34,
    LTrim = 35,
    ListRewrite = 36,
    SAdd = 40,
    SRem = 41,
    SPop = 42,
    TsAdd = 50,
    TsDel = 51,
}

impl Opcode {
    /// Decode a wire opcode byte.
    pub fn from_u8(b: u8) -> Option<Opcode> {
        Some(match b {
            1 => Opcode::Set,
            2 => Opcode::SetTtl,
            3 => Opcode::Del,
            4 => Opcode::Expire,
            5 => Opcode::Persist,
            10 => Opcode::ZAdd,
            11 => Opcode::ZRem,
            12 => Opcode::ZIncrBy,
            13 => Opcode::ZRemRangeRank,
            14 => Opcode::ZRemRangeScore,
            20 => Opcode::HSet,
            21 => Opcode::HDel,
            30 => Opcode::LPush,
            31 => Opcode::RPush,
            32 => Opcode::LPop,
            33 => Opcode::RPop,
            34 => Opcode::LSet,
            35 => Opcode::LTrim,
            36 => Opcode::ListRewrite,
            40 => Opcode::SAdd,
            41 => Opcode::SRem,
            42 => Opcode::SPop,
            50 => Opcode::TsAdd,
            51 => Opcode::TsDel,
            _ => return None,
        })
    }
}

/// A single durable mutation record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub opcode: Opcode,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Absolute expiration deadline in epoch-ms; 0 means "unset".
    pub expire_ms: i64,
}

impl Record {
    /// Record with no value payload and no expiry.
    pub fn bare(opcode: Opcode, key: impl Into<Vec<u8>>) -> Record {
        Record {
            opcode,
            key: key.into(),
            value: Vec::new(),
            expire_ms: 0,
        }
    }

    /// Record carrying a value payload.
    pub fn with_value(opcode: Opcode, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Record {
        Record {
            opcode,
            key: key.into(),
            value: value.into(),
            expire_ms: 0,
        }
    }

    /// Record carrying a value payload and an expiration deadline.
    pub fn with_expiry(
        opcode: Opcode,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        expire_ms: i64,
    ) -> Record {
        Record {
            opcode,
            key: key.into(),
            value: value.into(),
            expire_ms,
        }
    }

    /// Total encoded length of this record.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Serialize into `buf`, appending. Infallible: writes to a Vec.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        buf.reserve(self.encoded_len());

        // Header minus CRC; the CRC covers exactly these 20 bytes plus
        // the key and value payloads.
        let _ = buf.write_u16::<LittleEndian>(RECORD_MAGIC);
        let _ = buf.write_u8(self.opcode as u8);
        let _ = buf.write_u8(0); // reserved
        let _ = buf.write_u32::<LittleEndian>(self.key.len() as u32);
        let _ = buf.write_u32::<LittleEndian>(self.value.len() as u32);
        let _ = buf.write_i64::<LittleEndian>(self.expire_ms);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf[start..start + 20]);
        hasher.update(&self.key);
        hasher.update(&self.value);
        let _ = buf.write_u32::<LittleEndian>(hasher.finalize());

        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
    }

    /// Serialize into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decode one record from `bytes` at `offset`.
    ///
    /// Returns the record and the offset just past it. Any mismatch
    /// (short buffer, bad magic, unknown opcode, absurd lengths, CRC
    /// failure) comes back as `Error::Corruption`; the caller treats the
    /// offset as the start of the crash tail.
    pub fn decode_at(bytes: &[u8], offset: usize) -> Result<(Record, usize)> {
        let remaining = &bytes[offset..];
        if remaining.len() < HEADER_SIZE {
            return Err(Error::Corruption("truncated header".into()));
        }

        let mut cur = Cursor::new(remaining);
        let magic = cur.read_u16::<LittleEndian>().map_err(corrupt)?;
        if magic != RECORD_MAGIC {
            return Err(Error::Corruption(format!("bad magic {:#06x}", magic)));
        }
        let opcode_byte = cur.read_u8().map_err(corrupt)?;
        let opcode = Opcode::from_u8(opcode_byte)
            .ok_or_else(|| Error::Corruption(format!("unknown opcode {}", opcode_byte)))?;
        let _reserved = cur.read_u8().map_err(corrupt)?;
        let key_len = cur.read_u32::<LittleEndian>().map_err(corrupt)?;
        let value_len = cur.read_u32::<LittleEndian>().map_err(corrupt)?;
        let expire_ms = cur.read_i64::<LittleEndian>().map_err(corrupt)?;
        let stored_crc = cur.read_u32::<LittleEndian>().map_err(corrupt)?;

        if key_len > MAX_FIELD_LEN || value_len > MAX_FIELD_LEN {
            return Err(Error::Corruption("field length exceeds cap".into()));
        }
        let body_len = key_len as usize + value_len as usize;
        if remaining.len() < HEADER_SIZE + body_len {
            return Err(Error::Corruption("truncated body".into()));
        }

        let key = &remaining[HEADER_SIZE..HEADER_SIZE + key_len as usize];
        let value = &remaining[HEADER_SIZE + key_len as usize..HEADER_SIZE + body_len];

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&remaining[..20]);
        hasher.update(key);
        hasher.update(value);
        if hasher.finalize() != stored_crc {
            return Err(Error::Corruption("crc mismatch".into()));
        }

        Ok((
            Record {
                opcode,
                key: key.to_vec(),
                value: value.to_vec(),
                expire_ms,
            },
            offset + HEADER_SIZE + body_len,
        ))
    }
}

fn corrupt(e: std::io::Error) -> Error {
    Error::Corruption(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_opcode_round_trip() {
        for b in 0..=u8::MAX {
            if let Some(op) = Opcode::from_u8(b) {
                assert_eq!(op as u8, b);
            }
        }
        assert_eq!(Opcode::from_u8(1), Some(Opcode::Set));
        assert_eq!(Opcode::from_u8(36), Some(Opcode::ListRewrite));
        assert_eq!(Opcode::from_u8(51), Some(Opcode::TsDel));
        assert_eq!(Opcode::from_u8(99), None);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let rec = Record::with_expiry(Opcode::SetTtl, b"k".to_vec(), b"v".to_vec(), 1_700_000_000_000);
        let bytes = rec.encode();
        assert_eq!(bytes.len(), rec.encoded_len());
        let (decoded, next) = Record::decode_at(&bytes, 0).unwrap();
        assert_eq!(decoded, rec);
        assert_eq!(next, bytes.len());
    }

    #[test]
    fn test_header_layout_is_stable() {
        let rec = Record::with_value(Opcode::Set, b"ab".to_vec(), b"xyz".to_vec());
        let bytes = rec.encode();
        assert_eq!(&bytes[0..2], &[0x1B, 0xFD]); // magic, little-endian
        assert_eq!(bytes[2], 1); // opcode SET
        assert_eq!(bytes[3], 0); // reserved
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes()); // key_len
        assert_eq!(&bytes[8..12], &3u32.to_le_bytes()); // value_len
        assert_eq!(&bytes[12..20], &0i64.to_le_bytes()); // expire_ms
        assert_eq!(&bytes[24..26], b"ab");
        assert_eq!(&bytes[26..29], b"xyz");
    }

    #[test]
    fn test_flipped_byte_fails_crc() {
        let rec = Record::with_value(Opcode::Set, b"key".to_vec(), b"value".to_vec());
        let mut bytes = rec.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            Record::decode_at(&bytes, 0),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let rec = Record::bare(Opcode::Del, b"key".to_vec());
        let mut bytes = rec.encode();
        bytes[0] = 0x00;
        assert!(matches!(
            Record::decode_at(&bytes, 0),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_truncated_body_rejected() {
        let rec = Record::with_value(Opcode::Set, b"key".to_vec(), b"value".to_vec());
        let bytes = rec.encode();
        assert!(matches!(
            Record::decode_at(&bytes[..bytes.len() - 2], 0),
            Err(Error::Corruption(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            key in proptest::collection::vec(any::<u8>(), 0..128),
            value in proptest::collection::vec(any::<u8>(), 0..256),
            expire in any::<i64>(),
        ) {
            let rec = Record::with_expiry(Opcode::Set, key, value, expire);
            let bytes = rec.encode();
            let (decoded, next) = Record::decode_at(&bytes, 0).unwrap();
            prop_assert_eq!(decoded, rec);
            prop_assert_eq!(next, bytes.len());
        }

        #[test]
        fn prop_any_single_bit_flip_detected(
            key in proptest::collection::vec(any::<u8>(), 1..32),
            value in proptest::collection::vec(any::<u8>(), 1..32),
            bit in 0usize..64,
        ) {
            let rec = Record::with_value(Opcode::HSet, key, value);
            let mut bytes = rec.encode();
            let pos = bit % (bytes.len() * 8);
            bytes[pos / 8] ^= 1 << (pos % 8);
            // Either the frame is rejected outright or it decodes into
            // something other than the original (a magic-preserving flip
            // can never survive the CRC).
            match Record::decode_at(&bytes, 0) {
                Err(_) => {}
                Ok((decoded, _)) => prop_assert_ne!(decoded, rec),
            }
        }
    }
}
