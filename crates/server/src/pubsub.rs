//! Pub/sub registry and fanout.
//!
//! Channel subscribers are an O(1) lookup; pattern subscribers are glob-
//! matched against the published channel. Delivery serializes each message
//! frame once and writes it under the receiving client's write mutex, so
//! pushed frames never interleave with that client's command replies. A
//! wedged or closed client is dropped from the registry instead of ever
//! blocking the publisher.

use crate::conn::ClientHandle;
use crate::resp::{encode_frame, Frame};
use ember_core::glob::glob_match;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct Registry {
    /// channel -> subscriber id -> handle
    channels: FxHashMap<Vec<u8>, FxHashMap<u64, Arc<ClientHandle>>>,
    /// pattern -> subscriber id -> handle
    patterns: FxHashMap<Vec<u8>, FxHashMap<u64, Arc<ClientHandle>>>,
}

/// Shared pub/sub state.
#[derive(Default)]
pub struct PubSub {
    inner: Mutex<Registry>,
}

impl PubSub {
    pub fn new() -> PubSub {
        PubSub::default()
    }

    pub fn subscribe(&self, channel: &[u8], client: &Arc<ClientHandle>) {
        self.inner
            .lock()
            .channels
            .entry(channel.to_vec())
            .or_default()
            .insert(client.id, Arc::clone(client));
    }

    pub fn unsubscribe(&self, channel: &[u8], client_id: u64) {
        let mut inner = self.inner.lock();
        if let Some(subs) = inner.channels.get_mut(channel) {
            subs.remove(&client_id);
            if subs.is_empty() {
                inner.channels.remove(channel);
            }
        }
    }

    pub fn psubscribe(&self, pattern: &[u8], client: &Arc<ClientHandle>) {
        self.inner
            .lock()
            .patterns
            .entry(pattern.to_vec())
            .or_default()
            .insert(client.id, Arc::clone(client));
    }

    pub fn punsubscribe(&self, pattern: &[u8], client_id: u64) {
        let mut inner = self.inner.lock();
        if let Some(subs) = inner.patterns.get_mut(pattern) {
            subs.remove(&client_id);
            if subs.is_empty() {
                inner.patterns.remove(pattern);
            }
        }
    }

    /// Remove a client from every channel and pattern (connection close).
    pub fn drop_client(&self, client_id: u64) {
        let mut inner = self.inner.lock();
        inner.channels.retain(|_, subs| {
            subs.remove(&client_id);
            !subs.is_empty()
        });
        inner.patterns.retain(|_, subs| {
            subs.remove(&client_id);
            !subs.is_empty()
        });
    }

    /// Deliver `message` to every direct and pattern subscriber of
    /// `channel`. Returns the number of deliveries attempted.
    pub fn publish(&self, channel: &[u8], message: &[u8]) -> usize {
        // Snapshot receivers under the registry lock, write outside it so
        // one slow client cannot stall the registry.
        let (direct, matched): (Vec<Arc<ClientHandle>>, Vec<(Vec<u8>, Arc<ClientHandle>)>) = {
            let inner = self.inner.lock();
            let direct = inner
                .channels
                .get(channel)
                .map(|subs| subs.values().cloned().collect())
                .unwrap_or_default();
            let matched = inner
                .patterns
                .iter()
                .filter(|(pattern, _)| glob_match(pattern, channel))
                .flat_map(|(pattern, subs)| {
                    subs.values()
                        .cloned()
                        .map(|client| (pattern.clone(), client))
                        .collect::<Vec<_>>()
                })
                .collect();
            (direct, matched)
        };

        let mut delivered = 0;
        let message_frame = encode_frame(&Frame::Array(vec![
            Frame::bulk("message"),
            Frame::bulk(channel.to_vec()),
            Frame::bulk(message.to_vec()),
        ]));
        for client in direct {
            if self.push(&client, &message_frame) {
                delivered += 1;
            }
        }
        for (pattern, client) in matched {
            let frame = encode_frame(&Frame::Array(vec![
                Frame::bulk("pmessage"),
                Frame::bulk(pattern),
                Frame::bulk(channel.to_vec()),
                Frame::bulk(message.to_vec()),
            ]));
            if self.push(&client, &frame) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Write pre-serialized bytes under the client's write mutex. On
    /// failure the client is dropped from the registry; the publisher
    /// never blocks on a dead peer.
    fn push(&self, client: &Arc<ClientHandle>, bytes: &[u8]) -> bool {
        let mut writer = client.writer.lock();
        let result = writer.write_raw(bytes).and_then(|_| writer.flush());
        drop(writer);
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!(target: "ember::pubsub", client = client.id, error = %e, "dropping wedged subscriber");
                self.drop_client(client.id);
                false
            }
        }
    }

    /// Channels with at least one subscriber, optionally filtered.
    pub fn channels(&self, pattern: Option<&[u8]>) -> Vec<Vec<u8>> {
        let inner = self.inner.lock();
        let mut names: Vec<Vec<u8>> = inner
            .channels
            .keys()
            .filter(|name| pattern.map_or(true, |p| glob_match(p, name)))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Subscriber count per named channel.
    pub fn numsub(&self, channels: &[Vec<u8>]) -> Vec<(Vec<u8>, usize)> {
        let inner = self.inner.lock();
        channels
            .iter()
            .map(|name| {
                let count = inner.channels.get(name).map_or(0, |subs| subs.len());
                (name.clone(), count)
            })
            .collect()
    }

    /// Count of distinct subscribed patterns.
    pub fn numpat(&self) -> usize {
        self.inner.lock().patterns.len()
    }
}
