//! Connection transports: plain TCP and a TLS wrap.
//!
//! A plain connection splits into independent read/write halves via
//! `TcpStream::try_clone`, so the reader can block while the pub/sub
//! fanout writes. A TLS session cannot be cloned; both halves share the
//! session behind a mutex, and the socket carries a short read timeout so
//! a blocked reader releases the lock periodically for writers.

use ember_core::{Error, Result};
use rustls::{ServerConnection, StreamOwned};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

/// Poll interval for reads on a shared TLS session.
pub const TLS_READ_POLL: Duration = Duration::from_millis(100);

/// TLS session shared by a connection's read and write halves.
#[derive(Clone)]
pub struct SharedTls {
    inner: Arc<parking_lot::Mutex<StreamOwned<ServerConnection, TcpStream>>>,
}

impl SharedTls {
    pub fn new(stream: StreamOwned<ServerConnection, TcpStream>) -> Result<SharedTls> {
        // Bounded lock hold: the reader wakes at least every poll tick.
        stream.sock.set_read_timeout(Some(TLS_READ_POLL))?;
        Ok(SharedTls {
            inner: Arc::new(parking_lot::Mutex::new(stream)),
        })
    }
}

impl Read for SharedTls {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.lock().read(buf)
    }
}

impl Write for SharedTls {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// Read half of a connection.
pub enum ReadConn {
    Plain(TcpStream),
    Tls(SharedTls),
}

impl ReadConn {
    /// Whether reads may return a timeout that just means "poll again"
    /// rather than "the peer is idle past the deadline".
    pub fn polls(&self) -> bool {
        matches!(self, ReadConn::Tls(_))
    }
}

impl Read for ReadConn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ReadConn::Plain(s) => s.read(buf),
            ReadConn::Tls(s) => s.read(buf),
        }
    }
}

/// Write half of a connection.
pub enum WriteConn {
    Plain(TcpStream),
    Tls(SharedTls),
}

impl Write for WriteConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            WriteConn::Plain(s) => s.write(buf),
            WriteConn::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            WriteConn::Plain(s) => s.flush(),
            WriteConn::Tls(s) => s.flush(),
        }
    }
}

/// Split a plain TCP connection into halves.
pub fn split_plain(stream: TcpStream, idle_timeout: Option<Duration>) -> Result<(ReadConn, WriteConn)> {
    stream.set_read_timeout(idle_timeout)?;
    stream.set_nodelay(true)?;
    let write = stream
        .try_clone()
        .map_err(|e| Error::Io(io::Error::new(e.kind(), format!("clone socket: {}", e))))?;
    Ok((ReadConn::Plain(stream), WriteConn::Plain(write)))
}

/// Split a TLS connection into halves sharing one session.
pub fn split_tls(stream: StreamOwned<ServerConnection, TcpStream>) -> Result<(ReadConn, WriteConn)> {
    stream.sock.set_nodelay(true)?;
    let shared = SharedTls::new(stream)?;
    Ok((ReadConn::Tls(shared.clone()), WriteConn::Tls(shared)))
}
