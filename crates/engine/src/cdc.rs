//! Change-data-capture: a bounded ring of mutation events with pull and
//! push consumption.
//!
//! Event IDs are assigned under the feed's lock and are strictly
//! monotonic; the engine publishes while holding the store's write lock,
//! so feed order matches the order in which mutations became visible.
//!
//! Subscribers receive events over bounded channels. A full channel never
//! blocks the producer: the event is dropped for that subscriber and its
//! drop counter incremented.

use ember_core::now_ns;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};

/// What kind of mutation an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Del,
    Expire,
    Persist,
    HSet,
    HDel,
    LPush,
    RPush,
    LPop,
    RPop,
    LSet,
    LTrim,
    ListRewrite,
    SAdd,
    SRem,
    SPop,
    ZAdd,
    ZRem,
    ZIncrBy,
    ZRemRange,
    Rename,
    Copy,
    FlushDb,
    Restore,
}

impl ChangeKind {
    /// Wire name used by `DEBUG CHANGELOG` output.
    pub fn name(&self) -> &'static str {
        match self {
            ChangeKind::Set => "SET",
            ChangeKind::Del => "DEL",
            ChangeKind::Expire => "EXPIRE",
            ChangeKind::Persist => "PERSIST",
            ChangeKind::HSet => "HSET",
            ChangeKind::HDel => "HDEL",
            ChangeKind::LPush => "LPUSH",
            ChangeKind::RPush => "RPUSH",
            ChangeKind::LPop => "LPOP",
            ChangeKind::RPop => "RPOP",
            ChangeKind::LSet => "LSET",
            ChangeKind::LTrim => "LTRIM",
            ChangeKind::ListRewrite => "LREWRITE",
            ChangeKind::SAdd => "SADD",
            ChangeKind::SRem => "SREM",
            ChangeKind::SPop => "SPOP",
            ChangeKind::ZAdd => "ZADD",
            ChangeKind::ZRem => "ZREM",
            ChangeKind::ZIncrBy => "ZINCRBY",
            ChangeKind::ZRemRange => "ZREMRANGE",
            ChangeKind::Rename => "RENAME",
            ChangeKind::Copy => "COPY",
            ChangeKind::FlushDb => "FLUSHDB",
            ChangeKind::Restore => "RESTORE",
        }
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Strictly monotonic, 1-based.
    pub id: u64,
    pub kind: ChangeKind,
    pub key: Vec<u8>,
    /// New-value summary where one exists (e.g. the value of a SET).
    pub value: Option<Vec<u8>>,
    /// Publish instant, epoch nanoseconds.
    pub ts_ns: i64,
}

struct Subscriber {
    tx: SyncSender<ChangeEvent>,
    dropped: u64,
}

struct FeedInner {
    ring: VecDeque<ChangeEvent>,
    next_id: u64,
    subscribers: FxHashMap<u64, Subscriber>,
    next_subscriber_id: u64,
}

/// The bounded change feed.
pub struct ChangeFeed {
    capacity: usize,
    inner: Mutex<FeedInner>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> ChangeFeed {
        ChangeFeed {
            capacity: capacity.max(1),
            inner: Mutex::new(FeedInner {
                ring: VecDeque::new(),
                next_id: 1,
                subscribers: FxHashMap::default(),
                next_subscriber_id: 1,
            }),
        }
    }

    /// Record one mutation and fan it out. Returns the assigned event ID.
    pub fn publish(&self, kind: ChangeKind, key: &[u8], value: Option<&[u8]>) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let event = ChangeEvent {
            id,
            kind,
            key: key.to_vec(),
            value: value.map(|v| v.to_vec()),
            ts_ns: now_ns(),
        };

        if inner.ring.len() == self.capacity {
            inner.ring.pop_front();
        }
        inner.ring.push_back(event.clone());

        // Fan out without ever blocking: full channels drop, closed
        // channels are reaped.
        let mut gone = Vec::new();
        for (&sub_id, sub) in inner.subscribers.iter_mut() {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => sub.dropped += 1,
                Err(TrySendError::Disconnected(_)) => gone.push(sub_id),
            }
        }
        for sub_id in gone {
            inner.subscribers.remove(&sub_id);
        }
        id
    }

    /// The trailing `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ChangeEvent> {
        let inner = self.inner.lock();
        let skip = inner.ring.len().saturating_sub(n);
        inner.ring.iter().skip(skip).cloned().collect()
    }

    /// Every retained event with ID strictly greater than `id`.
    pub fn since(&self, id: u64) -> Vec<ChangeEvent> {
        let inner = self.inner.lock();
        inner
            .ring
            .iter()
            .filter(|event| event.id > id)
            .cloned()
            .collect()
    }

    /// ID that will be assigned to the next published event.
    pub fn head_id(&self) -> u64 {
        self.inner.lock().next_id
    }

    /// Register a live subscriber with the given channel depth.
    pub fn subscribe(&self, buffer: usize) -> (u64, Receiver<ChangeEvent>) {
        let (tx, rx) = std::sync::mpsc::sync_channel(buffer.max(1));
        let mut inner = self.inner.lock();
        let sub_id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.insert(sub_id, Subscriber { tx, dropped: 0 });
        (sub_id, rx)
    }

    /// Tear down a subscriber; its receiver sees the channel close.
    pub fn unsubscribe(&self, sub_id: u64) -> bool {
        self.inner.lock().subscribers.remove(&sub_id).is_some()
    }

    /// Events dropped for a subscriber because its channel was full.
    pub fn dropped_for(&self, sub_id: u64) -> Option<u64> {
        self.inner.lock().subscribers.get(&sub_id).map(|s| s.dropped)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let feed = ChangeFeed::new(100);
        let a = feed.publish(ChangeKind::Set, b"k1", Some(b"v"));
        let b = feed.publish(ChangeKind::Del, b"k2", None);
        let c = feed.publish(ChangeKind::Set, b"k3", Some(b"v"));
        assert!(a < b && b < c);
    }

    #[test]
    fn test_ring_drops_oldest_on_overflow() {
        let feed = ChangeFeed::new(3);
        for i in 0..5u8 {
            feed.publish(ChangeKind::Set, &[i], None);
        }
        let events = feed.recent(10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].key, vec![2]);
        assert_eq!(events[2].key, vec![4]);
    }

    #[test]
    fn test_since_filters_by_id() {
        let feed = ChangeFeed::new(10);
        let first = feed.publish(ChangeKind::Set, b"a", None);
        feed.publish(ChangeKind::Set, b"b", None);
        feed.publish(ChangeKind::Set, b"c", None);
        let tail = feed.since(first);
        assert_eq!(tail.len(), 2);
        assert!(tail.iter().all(|e| e.id > first));
    }

    #[test]
    fn test_subscriber_receives_in_order() {
        let feed = ChangeFeed::new(10);
        let (_id, rx) = feed.subscribe(16);
        feed.publish(ChangeKind::Set, b"a", Some(b"1"));
        feed.publish(ChangeKind::Del, b"a", None);
        let first = rx.recv().unwrap();
        let second = rx.recv().unwrap();
        assert_eq!(first.kind, ChangeKind::Set);
        assert_eq!(second.kind, ChangeKind::Del);
        assert!(first.id < second.id);
    }

    #[test]
    fn test_full_subscriber_never_blocks_producer() {
        let feed = ChangeFeed::new(10);
        let (sub_id, rx) = feed.subscribe(2);
        for i in 0..5u8 {
            feed.publish(ChangeKind::Set, &[i], None);
        }
        // Producer ran to completion; two events queued, three dropped.
        assert_eq!(feed.dropped_for(sub_id), Some(3));
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_unsubscribe_closes_channel() {
        let feed = ChangeFeed::new(10);
        let (sub_id, rx) = feed.subscribe(4);
        assert!(feed.unsubscribe(sub_id));
        assert!(!feed.unsubscribe(sub_id));
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_is_reaped_on_publish() {
        let feed = ChangeFeed::new(10);
        let (_id, rx) = feed.subscribe(4);
        drop(rx);
        feed.publish(ChangeKind::Set, b"k", None);
        assert_eq!(feed.subscriber_count(), 0);
    }
}
