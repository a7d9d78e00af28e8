//! Engine integration tests: durability across reopen, snapshot
//! round-trips, change-feed ordering, and the transaction lock.

use ember_engine::{ChangeKind, Engine, EngineConfig, SetOptions, TtlChange};
use ember_store::ScoreBound;
use std::time::Duration;
use tempfile::tempdir;

fn open(dir: &std::path::Path) -> Engine {
    Engine::open(EngineConfig::new(dir.join("ember.wal"))).unwrap()
}

fn set(engine: &Engine, key: &[u8], value: &[u8]) {
    engine
        .set_value(key, value.to_vec(), SetOptions::default())
        .unwrap();
}

#[test]
fn test_set_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let engine = open(dir.path());
        set(&engine, b"x", b"1");
        engine.shutdown();
    }
    let engine = open(dir.path());
    assert_eq!(engine.get(b"x").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_recovery_with_garbage_tail() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("ember.wal");
    {
        let engine = open(dir.path());
        set(&engine, b"x", b"1");
        // Drop without shutdown: simulates a crash after the append.
    }
    // Arbitrary garbage appended to the log tail.
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&wal_path)
        .unwrap();
    file.write_all(&[0xBA, 0xD1, 0xDE, 0xA5, 0x00]).unwrap();
    drop(file);

    let engine = open(dir.path());
    assert_eq!(engine.get(b"x").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_every_type_recovers() {
    let dir = tempdir().unwrap();
    {
        let engine = open(dir.path());
        set(&engine, b"s", b"v");
        engine.hset(b"h", vec![(b"f".to_vec(), b"1".to_vec())]).unwrap();
        engine.rpush(b"l", vec![b"a".to_vec(), b"b".to_vec()]).unwrap();
        engine.lpush(b"l", vec![b"x".to_vec(), b"y".to_vec()]).unwrap();
        engine.sadd(b"set", vec![b"m1".to_vec(), b"m2".to_vec()]).unwrap();
        engine
            .zadd(b"z", vec![(2.0, b"two".to_vec()), (1.0, b"one".to_vec())])
            .unwrap();
        engine.zincr_by(b"z", b"one", 0.5).unwrap();
        engine.shutdown();
    }

    let engine = open(dir.path());
    assert_eq!(engine.get(b"s").unwrap(), Some(b"v".to_vec()));
    assert_eq!(engine.hget(b"h", b"f").unwrap(), Some(b"1".to_vec()));
    assert_eq!(
        engine.lrange(b"l", 0, -1).unwrap(),
        vec![b"x".to_vec(), b"y".to_vec(), b"a".to_vec(), b"b".to_vec()]
    );
    assert!(engine.sismember(b"set", b"m1").unwrap());
    assert_eq!(engine.scard(b"set").unwrap(), 2);
    assert_eq!(engine.zscore(b"z", b"one").unwrap(), Some(1.5));
    assert_eq!(engine.zscore(b"z", b"two").unwrap(), Some(2.0));
}

#[test]
fn test_linsert_lrem_recover_exactly() {
    let dir = tempdir().unwrap();
    {
        let engine = open(dir.path());
        engine
            .rpush(b"l", vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec(), b"c".to_vec()])
            .unwrap();
        assert_eq!(engine.linsert(b"l", true, b"b", b"X".to_vec()).unwrap(), 5);
        assert_eq!(engine.lrem(b"l", 0, b"a").unwrap(), 2);
        engine.shutdown();
    }
    let engine = open(dir.path());
    assert_eq!(
        engine.lrange(b"l", 0, -1).unwrap(),
        vec![b"X".to_vec(), b"b".to_vec(), b"c".to_vec()]
    );
}

#[test]
fn test_spop_recovery_matches_live_state() {
    let dir = tempdir().unwrap();
    let remaining;
    {
        let engine = open(dir.path());
        engine
            .sadd(b"s", (0..10u8).map(|i| vec![i]).collect())
            .unwrap();
        let popped = engine.spop(b"s", 4).unwrap();
        assert_eq!(popped.len(), 4);
        let mut rest = engine.smembers(b"s").unwrap();
        rest.sort();
        remaining = rest;
        engine.shutdown();
    }
    let engine = open(dir.path());
    let mut recovered = engine.smembers(b"s").unwrap();
    recovered.sort();
    assert_eq!(recovered, remaining);
}

#[test]
fn test_expired_ttl_not_resurrected() {
    let dir = tempdir().unwrap();
    {
        let engine = open(dir.path());
        set(&engine, b"k", b"v");
        let deadline = ember_core::now_ms() + 50;
        assert!(engine.expire_at(b"k", deadline).unwrap());
        engine.shutdown();
    }
    std::thread::sleep(Duration::from_millis(80));
    let engine = open(dir.path());
    assert_eq!(engine.get(b"k").unwrap(), None);
    assert_eq!(engine.exists(&[b"k".to_vec()]), 0);
}

#[test]
fn test_rename_recovers_with_value_and_ttl() {
    let dir = tempdir().unwrap();
    {
        let engine = open(dir.path());
        set(&engine, b"src", b"payload");
        engine.expire_at(b"src", ember_core::now_ms() + 60_000).unwrap();
        engine.rename(b"src", b"dst").unwrap();
        engine.shutdown();
    }
    let engine = open(dir.path());
    assert_eq!(engine.get(b"dst").unwrap(), Some(b"payload".to_vec()));
    assert_eq!(engine.get(b"src").unwrap(), None);
    let ttl = engine.ttl_ms(b"dst").unwrap().unwrap();
    assert!(ttl > 0 && ttl <= 60_000);
}

#[test]
fn test_flushdb_truncates_wal_and_is_idempotent() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    set(&engine, b"a", b"1");
    engine.rpush(b"l", vec![b"x".to_vec()]).unwrap();
    assert!(engine.wal_size() > 0);

    engine.flushdb().unwrap();
    assert_eq!(engine.dbsize(), 0);
    assert_eq!(engine.wal_size(), 0);

    engine.flushdb().unwrap();
    assert_eq!(engine.wal_size(), 0);
}

#[test]
fn test_getex_persist_and_deadline() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    set(&engine, b"k", b"v");
    let deadline = ember_core::now_ms() + 60_000;
    assert_eq!(
        engine.getex(b"k", TtlChange::Deadline(deadline)).unwrap(),
        Some(b"v".to_vec())
    );
    assert!(engine.ttl_ms(b"k").unwrap().is_some());
    assert_eq!(
        engine.getex(b"k", TtlChange::Persist).unwrap(),
        Some(b"v".to_vec())
    );
    assert_eq!(engine.ttl_ms(b"k").unwrap(), None);
}

#[test]
fn test_change_feed_ids_follow_visibility_order() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    set(&engine, b"a", b"1");
    engine.del(&[b"a".to_vec()]).unwrap();
    set(&engine, b"b", b"2");

    let events = engine.changes_recent(10);
    assert_eq!(events.len(), 3);
    assert!(events.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(events[0].kind, ChangeKind::Set);
    assert_eq!(events[1].kind, ChangeKind::Del);
    assert_eq!(events[2].kind, ChangeKind::Set);
    assert_eq!(events[2].key, b"b".to_vec());
}

#[test]
fn test_subscriber_sees_contiguous_suffix() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    set(&engine, b"before", b"1");

    let (sub_id, rx) = engine.changes_subscribe(64);
    set(&engine, b"after1", b"1");
    set(&engine, b"after2", b"2");

    let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(first.key, b"after1".to_vec());
    assert_eq!(second.key, b"after2".to_vec());
    assert_eq!(second.id, first.id + 1);

    assert!(engine.changes_unsubscribe(sub_id));
    assert!(rx.recv().is_err());
}

#[test]
fn test_snapshot_create_restore_is_noop_on_strings() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    set(&engine, b"a", b"1");
    set(&engine, b"b", b"2");
    engine
        .expire_at(b"b", ember_core::now_ms() + 60_000)
        .unwrap();

    let meta = engine.snapshot_create(Some("t0".into())).unwrap();
    assert_eq!(meta.key_count, 2);

    let restored = engine.snapshot_restore("t0").unwrap();
    assert_eq!(restored, 2);
    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert!(engine.ttl_ms(b"b").unwrap().is_some());
}

#[test]
fn test_snapshot_restore_survives_crash() {
    let dir = tempdir().unwrap();
    {
        let engine = open(dir.path());
        set(&engine, b"keep", b"me");
        engine.snapshot_create(Some("s1".into())).unwrap();
        set(&engine, b"extra", b"gone-after-restore");
        engine.snapshot_restore("s1").unwrap();
        // No shutdown: the WAL batch written by restore must carry it.
    }
    let engine = open(dir.path());
    assert_eq!(engine.get(b"keep").unwrap(), Some(b"me".to_vec()));
    assert_eq!(engine.get(b"extra").unwrap(), None);
}

#[test]
fn test_snapshot_list_and_delete() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    set(&engine, b"k", b"v");
    engine.snapshot_create(Some("one".into())).unwrap();
    engine.snapshot_create(Some("two".into())).unwrap();
    assert_eq!(engine.snapshot_list().unwrap().len(), 2);
    assert!(engine.snapshot_delete("one").unwrap());
    let listed = engine.snapshot_list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "two");
}

#[test]
fn test_sweeper_evicts_under_pressure() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(
        EngineConfig::new(dir.path().join("ember.wal"))
            .with_sweep_interval(Duration::from_millis(10)),
    )
    .unwrap();

    let deadline = ember_core::now_ms() + 40;
    for i in 0..40u32 {
        let key = format!("exp{}", i);
        set(&engine, key.as_bytes(), b"v");
        engine.expire_at(key.as_bytes(), deadline).unwrap();
    }
    set(&engine, b"stay", b"v");

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(engine.dbsize(), 1);
    assert!(engine.stats_snapshot().expired_keys >= 40);
}

#[test]
fn test_exec_lock_serializes() {
    let dir = tempdir().unwrap();
    let engine = std::sync::Arc::new(open(dir.path()));

    let guard = engine.exec_begin();
    let other = std::sync::Arc::clone(&engine);
    let handle = std::thread::spawn(move || {
        let _guard = other.exec_begin();
        // Reached only after the first guard drops.
        set(&other, b"second", b"1");
    });
    // Writes outside transactions proceed while the lock is held.
    set(&engine, b"first", b"1");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.get(b"second").unwrap(), None);
    drop(guard);
    handle.join().unwrap();
    assert_eq!(engine.get(b"second").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_zrem_range_by_score_exclusive_bound_recovers() {
    let dir = tempdir().unwrap();
    {
        let engine = open(dir.path());
        engine
            .zadd(
                b"z",
                vec![
                    (1.0, b"a".to_vec()),
                    (2.0, b"b".to_vec()),
                    (3.0, b"c".to_vec()),
                ],
            )
            .unwrap();
        let removed = engine
            .zrem_range_by_score(b"z", ScoreBound::exclusive(1.0), ScoreBound::inclusive(2.0))
            .unwrap();
        assert_eq!(removed, 1);
        engine.shutdown();
    }
    let engine = open(dir.path());
    assert_eq!(engine.zscore(b"z", b"a").unwrap(), Some(1.0));
    assert_eq!(engine.zscore(b"z", b"b").unwrap(), None);
    assert_eq!(engine.zscore(b"z", b"c").unwrap(), Some(3.0));
}

#[test]
fn test_hot_keys_reflect_access() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    for _ in 0..10 {
        let _ = engine.get(b"hot");
    }
    let _ = engine.get(b"cold");
    let top = engine.hot_keys(1);
    assert_eq!(top[0].0, b"hot".to_vec());
    assert!(top[0].1 >= 10);
}
