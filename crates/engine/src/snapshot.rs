//! Point-in-time dumps of the string keyspace.
//!
//! Each snapshot is a pair of sibling files in the snapshot directory:
//! `<id>.snap` holds the payload, `<id>.meta` a small JSON document. Both
//! are written to a temporary name, fsynced, then atomically renamed, so a
//! crash never leaves a half-written snapshot under its final name.
//!
//! Payload encoding, little-endian, repeated per entry:
//!
//! ```text
//! key_len: u32 || key || val_len: u32 || value || expire_ms: i64
//! ```
//!
//! `expire_ms` is 0 for entries without a deadline.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{SecondsFormat, Utc};
use ember_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// One string entry inside a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Absolute epoch-ms deadline; 0 means none.
    pub expire_ms: i64,
}

/// Metadata document stored beside each payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMeta {
    pub id: String,
    pub created_at: String,
    pub size_bytes: u64,
    pub key_count: usize,
}

/// Manages the snapshot directory.
pub struct SnapshotManager {
    dir: PathBuf,
}

impl SnapshotManager {
    pub fn new(dir: impl Into<PathBuf>) -> SnapshotManager {
        SnapshotManager { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a snapshot. `id` is caller-supplied or generated as an
    /// ISO-8601 UTC timestamp. Returns the metadata of the new snapshot.
    pub fn create(&self, id: Option<String>, entries: &[SnapshotEntry]) -> Result<SnapshotMeta> {
        fs::create_dir_all(&self.dir)?;
        let id = match id {
            Some(id) => validate_id(id)?,
            None => Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string(),
        };

        let payload = encode_entries(entries);
        let snap_path = self.dir.join(format!("{}.snap", id));
        write_atomically(&snap_path, &payload)?;

        let meta = SnapshotMeta {
            id: id.clone(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            size_bytes: payload.len() as u64,
            key_count: entries.len(),
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| Error::Corruption(format!("snapshot meta encode: {}", e)))?;
        write_atomically(&self.dir.join(format!("{}.meta", id)), &meta_bytes)?;

        info!(
            target: "ember::snapshot",
            id = %meta.id,
            keys = meta.key_count,
            bytes = meta.size_bytes,
            "snapshot created"
        );
        Ok(meta)
    }

    /// All snapshot metadata, sorted by id.
    pub fn list(&self) -> Result<Vec<SnapshotMeta>> {
        let mut metas = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(_id) = name.strip_suffix(".meta") {
                let raw = fs::read(entry.path())?;
                let meta: SnapshotMeta = serde_json::from_slice(&raw)
                    .map_err(|e| Error::Corruption(format!("snapshot meta {}: {}", name, e)))?;
                metas.push(meta);
            }
        }
        metas.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(metas)
    }

    /// Load one snapshot's entries.
    pub fn load(&self, id: &str) -> Result<Vec<SnapshotEntry>> {
        let id = validate_id(id.to_string())?;
        let raw = fs::read(self.dir.join(format!("{}.snap", id)))
            .map_err(|_| Error::NoSuchKey)?;
        decode_entries(&raw)
    }

    /// Remove a snapshot's payload and metadata.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let id = validate_id(id.to_string())?;
        let snap = self.dir.join(format!("{}.snap", id));
        let meta = self.dir.join(format!("{}.meta", id));
        let existed = snap.exists();
        if existed {
            fs::remove_file(&snap)?;
        }
        if meta.exists() {
            fs::remove_file(&meta)?;
        }
        Ok(existed)
    }
}

/// Snapshot ids become file names; refuse anything that could escape the
/// snapshot directory.
fn validate_id(id: String) -> Result<String> {
    if id.is_empty()
        || id.len() > 128
        || !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':' | b'T' | b'Z'))
        || id.contains("..")
    {
        return Err(Error::Syntax(format!("invalid snapshot id '{}'", id)));
    }
    Ok(id)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    // Make the rename itself durable.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

fn encode_entries(entries: &[SnapshotEntry]) -> Vec<u8> {
    let total: usize = entries.iter().map(|e| 16 + e.key.len() + e.value.len()).sum();
    let mut buf = Vec::with_capacity(total);
    for entry in entries {
        let _ = buf.write_u32::<LittleEndian>(entry.key.len() as u32);
        buf.extend_from_slice(&entry.key);
        let _ = buf.write_u32::<LittleEndian>(entry.value.len() as u32);
        buf.extend_from_slice(&entry.value);
        let _ = buf.write_i64::<LittleEndian>(entry.expire_ms);
    }
    buf
}

fn decode_entries(raw: &[u8]) -> Result<Vec<SnapshotEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0usize;
    while offset < raw.len() {
        let mut cur = Cursor::new(&raw[offset..]);
        let key_len = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::Corruption(e.to_string()))? as usize;
        offset += 4;
        let key = take(raw, &mut offset, key_len)?;
        let mut cur = Cursor::new(&raw[offset..]);
        let val_len = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::Corruption(e.to_string()))? as usize;
        offset += 4;
        let value = take(raw, &mut offset, val_len)?;
        let expire = take(raw, &mut offset, 8)?;
        let expire_ms = i64::from_le_bytes(
            expire
                .try_into()
                .map_err(|_| Error::Corruption("short expiry".into()))?,
        );
        entries.push(SnapshotEntry {
            key: key.to_vec(),
            value: value.to_vec(),
            expire_ms,
        });
    }
    Ok(entries)
}

fn take<'a>(raw: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    if raw.len() < *offset + len {
        return Err(Error::Corruption("snapshot payload truncated".into()));
    }
    let slice = &raw[*offset..*offset + len];
    *offset += len;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(key: &str, value: &str, expire_ms: i64) -> SnapshotEntry {
        SnapshotEntry {
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
            expire_ms,
        }
    }

    #[test]
    fn test_create_load_round_trip() {
        let dir = tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path().join("snapshots"));

        let entries = vec![entry("a", "1", 0), entry("b", "2", 1_800_000_000_000)];
        let meta = mgr.create(Some("first".into()), &entries).unwrap();
        assert_eq!(meta.key_count, 2);

        let loaded = mgr.load("first").unwrap();
        assert_eq!(loaded, entries);
    }

    #[test]
    fn test_auto_generated_id_lists() {
        let dir = tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path().join("snapshots"));
        let meta = mgr.create(None, &[entry("k", "v", 0)]).unwrap();
        let listed = mgr.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, meta.id);
    }

    #[test]
    fn test_list_sorted_by_id() {
        let dir = tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path().join("snapshots"));
        mgr.create(Some("b-snap".into()), &[]).unwrap();
        mgr.create(Some("a-snap".into()), &[]).unwrap();
        let ids: Vec<String> = mgr.list().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a-snap", "b-snap"]);
    }

    #[test]
    fn test_delete_removes_both_files() {
        let dir = tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path().join("snapshots"));
        mgr.create(Some("gone".into()), &[entry("k", "v", 0)]).unwrap();
        assert!(mgr.delete("gone").unwrap());
        assert!(!mgr.delete("gone").unwrap());
        assert!(mgr.list().unwrap().is_empty());
        assert!(mgr.load("gone").is_err());
    }

    #[test]
    fn test_hostile_id_rejected() {
        let dir = tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path().join("snapshots"));
        assert!(mgr.create(Some("../escape".into()), &[]).is_err());
        assert!(mgr.create(Some("".into()), &[]).is_err());
        assert!(mgr.load("../../etc/passwd").is_err());
    }

    #[test]
    fn test_empty_keyspace_snapshot() {
        let dir = tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path().join("snapshots"));
        let meta = mgr.create(Some("empty".into()), &[]).unwrap();
        assert_eq!(meta.key_count, 0);
        assert!(mgr.load("empty").unwrap().is_empty());
    }

    #[test]
    fn test_binary_safe_keys_and_values() {
        let dir = tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path().join("snapshots"));
        let entries = vec![SnapshotEntry {
            key: vec![0x00, 0xFF, 0x80],
            value: vec![0x01, 0x00, 0xFE],
            expire_ms: -1,
        }];
        mgr.create(Some("bin".into()), &entries).unwrap();
        assert_eq!(mgr.load("bin").unwrap(), entries);
    }
}
