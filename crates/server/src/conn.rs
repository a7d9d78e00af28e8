//! Per-connection state and the shared client registry.
//!
//! Each accepted connection gets a [`ClientHandle`] shared between its own
//! worker thread, the pub/sub fanout (which needs the write mutex), and
//! the `CLIENT LIST` surface. State private to the worker thread (the
//! transaction queue, auth flag, rate bucket) lives in [`SessionState`]
//! and is never shared.

use crate::resp::RespWriter;
use crate::transport::WriteConn;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared per-client handle.
pub struct ClientHandle {
    pub id: u64,
    pub addr: String,
    pub created: Instant,
    /// Client-chosen name (`CLIENT SETNAME`).
    pub name: Mutex<String>,
    /// Instant of the last dispatched command.
    pub last_seen: Mutex<Instant>,
    /// Commands dispatched on this connection.
    pub commands: AtomicU64,
    /// Wire writer; the pub/sub fanout takes this mutex so pushed frames
    /// never interleave with command replies.
    pub writer: Mutex<RespWriter<WriteConn>>,
    /// Raw socket clone, used to force-close a blocked connection at
    /// server shutdown without contending on the writer mutex.
    sock: TcpStream,
}

impl ClientHandle {
    pub fn new(
        id: u64,
        addr: String,
        writer: RespWriter<WriteConn>,
        sock: TcpStream,
    ) -> Arc<ClientHandle> {
        Arc::new(ClientHandle {
            id,
            addr,
            created: Instant::now(),
            name: Mutex::new(String::new()),
            last_seen: Mutex::new(Instant::now()),
            commands: AtomicU64::new(0),
            writer: Mutex::new(writer),
            sock,
        })
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    /// Force both directions of the socket closed. Any blocked read in
    /// the worker returns immediately.
    pub fn close_socket(&self) {
        let _ = self.sock.shutdown(Shutdown::Both);
    }
}

/// State owned exclusively by the connection's worker thread.
pub struct SessionState {
    pub authenticated: bool,
    /// Name of the ACL user bound by AUTH, if any.
    pub acl_user: Option<String>,
    /// MULTI in progress.
    pub in_multi: bool,
    /// Commands queued since MULTI.
    pub queue: Vec<(String, Vec<Vec<u8>>)>,
    /// Set when a queued command failed to parse; EXEC must abort.
    pub multi_error: bool,
    /// Channels this client is subscribed to.
    pub channels: Vec<Vec<u8>>,
    /// Patterns this client is subscribed to.
    pub patterns: Vec<Vec<u8>>,
    /// Rate bucket: remaining tokens and the next replenish instant.
    pub tokens: u64,
    pub bucket_reset: Instant,
    /// Connection close requested (QUIT, SHUTDOWN).
    pub quit: bool,
}

impl SessionState {
    pub fn new(initial_tokens: u64) -> SessionState {
        SessionState {
            authenticated: false,
            acl_user: None,
            in_multi: false,
            queue: Vec::new(),
            multi_error: false,
            channels: Vec::new(),
            patterns: Vec::new(),
            tokens: initial_tokens,
            bucket_reset: Instant::now(),
            quit: false,
        }
    }

    pub fn in_subscribe_mode(&self) -> bool {
        !self.channels.is_empty() || !self.patterns.is_empty()
    }
}

/// All live connections, for `CLIENT LIST` and max-client accounting.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<FxHashMap<u64, Arc<ClientHandle>>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> ClientRegistry {
        ClientRegistry {
            clients: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, client: Arc<ClientHandle>) {
        self.clients.lock().insert(client.id, client);
    }

    pub fn remove(&self, id: u64) {
        self.clients.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    pub fn get(&self, id: u64) -> Option<Arc<ClientHandle>> {
        self.clients.lock().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<ClientHandle>> {
        let mut clients: Vec<Arc<ClientHandle>> = self.clients.lock().values().cloned().collect();
        clients.sort_by_key(|c| c.id);
        clients
    }
}
