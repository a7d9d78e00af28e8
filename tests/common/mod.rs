//! Shared test harness: spawn a server on an ephemeral port and drive it
//! with a minimal RESP client over a real socket.

use emberdb::{Engine, EngineConfig, Frame, RespReader, Server, ServerConfig, ServerHandle};
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct TestServer {
    pub engine: Arc<Engine>,
    pub handle: Option<ServerHandle>,
}

impl TestServer {
    /// Engine + server on 127.0.0.1:0, WAL under `dir`.
    pub fn start(dir: &Path) -> TestServer {
        TestServer::start_with(dir, ServerConfig::new("127.0.0.1:0"))
    }

    pub fn start_with(dir: &Path, config: ServerConfig) -> TestServer {
        let engine = Arc::new(Engine::open(EngineConfig::new(dir.join("ember.wal"))).unwrap());
        let handle = Server::spawn(config, Arc::clone(&engine)).unwrap();
        TestServer {
            engine,
            handle: Some(handle),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.as_ref().unwrap().addr()
    }

    pub fn connect(&self) -> TestClient {
        TestClient::connect(self.addr())
    }

    pub fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }
}

pub struct TestClient {
    writer: TcpStream,
    reader: RespReader<TcpStream>,
}

impl TestClient {
    pub fn connect(addr: SocketAddr) -> TestClient {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let writer = stream.try_clone().unwrap();
        TestClient {
            writer,
            reader: RespReader::new(stream),
        }
    }

    /// Send one command as a RESP array of bulk strings.
    pub fn send(&mut self, parts: &[&[u8]]) {
        self.send_raw(&encode_command(parts));
    }

    /// Write raw protocol bytes in one syscall (pipelining tests).
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).unwrap();
        self.writer.flush().unwrap();
    }

    /// Read one reply frame.
    pub fn recv(&mut self) -> Frame {
        self.reader
            .read_frame()
            .expect("read reply")
            .expect("connection closed")
    }

    /// Round trip: send then read one reply.
    pub fn cmd(&mut self, parts: &[&[u8]]) -> Frame {
        self.send(parts);
        self.recv()
    }

    /// Convenience for all-ASCII commands.
    pub fn cmd_str(&mut self, parts: &[&str]) -> Frame {
        let raw: Vec<&[u8]> = parts.iter().map(|s| s.as_bytes()).collect();
        self.cmd(&raw)
    }
}

pub fn encode_command(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        out.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        out.extend_from_slice(part);
        out.extend_from_slice(b"\r\n");
    }
    out
}

pub fn simple(s: &str) -> Frame {
    Frame::Simple(s.to_string())
}

pub fn bulk(s: &str) -> Frame {
    Frame::Bulk(s.as_bytes().to_vec())
}
