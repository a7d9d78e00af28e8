//! TCP listener, connection workers, and the pipelined request loop.

use crate::config::ServerConfig;
use crate::conn::{ClientHandle, ClientRegistry, SessionState};
use crate::dispatch::{self, Ctx, Shared};
use crate::pubsub::PubSub;
use crate::resp::{Frame, RespReader, RespWriter};
use crate::slowlog::SlowLog;
use crate::transport::{self, ReadConn};
use crate::tls;
use ember_core::{Error, Result};
use ember_engine::Engine;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The EmberDB protocol server.
pub struct Server {
    shared: Arc<Shared>,
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: Option<Arc<rustls::ServerConfig>>,
}

/// Handle for stopping a running server from another thread.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    registry: Arc<ClientRegistry>,
    join: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown, unblock the accept loop, and wait for it.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Release);
        // Nudge the blocking accept.
        let _ = TcpStream::connect(self.addr);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }
}

impl Server {
    /// Bind the listener and assemble the shared state. The engine is
    /// shared so embedders can hold their own reference.
    pub fn bind(config: ServerConfig, engine: Arc<Engine>) -> Result<Server> {
        let tls = match &config.tls {
            Some(tls_config) => Some(tls::build_acceptor(tls_config)?),
            None => None,
        };
        let listener = TcpListener::bind(&config.addr)?;
        let local_addr = listener.local_addr()?;
        info!(
            target: "ember::server",
            addr = %local_addr,
            tls = tls.is_some(),
            "listening"
        );

        let slowlog = Arc::new(SlowLog::new(config.slowlog_threshold, config.slowlog_max_len));
        let shared = Arc::new(Shared {
            engine,
            config,
            registry: Arc::new(ClientRegistry::new()),
            pubsub: Arc::new(PubSub::new()),
            slowlog,
            shutdown: Arc::new(AtomicBool::new(false)),
            local_addr,
        });

        Ok(Server {
            shared,
            listener,
            local_addr,
            tls,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bind and run on a background thread; returns a stop handle.
    pub fn spawn(config: ServerConfig, engine: Arc<Engine>) -> Result<ServerHandle> {
        let server = Server::bind(config, engine)?;
        let addr = server.local_addr;
        let shutdown = Arc::clone(&server.shared.shutdown);
        let registry = Arc::clone(&server.shared.registry);
        let join = std::thread::Builder::new()
            .name("ember-accept".into())
            .spawn(move || server.run())?;
        Ok(ServerHandle {
            addr,
            shutdown,
            registry,
            join: Some(join),
        })
    }

    /// Accept until shutdown. Each connection gets its own worker thread.
    pub fn run(self) {
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        for stream in self.listener.incoming() {
            if self.shared.shutdown.load(Ordering::Acquire) {
                break;
            }
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(target: "ember::server", error = %e, "accept failed");
                    continue;
                }
            };
            if self.shared.registry.len() >= self.shared.config.max_clients {
                debug!(target: "ember::server", "max clients reached, closing connection");
                let _ = stream.shutdown(Shutdown::Both);
                continue;
            }

            let shared = Arc::clone(&self.shared);
            let tls = self.tls.clone();
            let id = shared.registry.next_id();
            let spawned = std::thread::Builder::new()
                .name(format!("ember-conn-{}", id))
                .spawn(move || serve_connection(shared, tls, id, stream));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => warn!(target: "ember::server", error = %e, "spawn worker failed"),
            }
            workers.retain(|w| !w.is_finished());
        }

        // Drain: force-close remaining sockets, then join the workers.
        for client in self.shared.registry.all() {
            client.close_socket();
        }
        for worker in workers {
            let _ = worker.join();
        }
        info!(target: "ember::server", "accept loop stopped");
    }
}

/// One connection, start to finish.
fn serve_connection(
    shared: Arc<Shared>,
    tls: Option<Arc<rustls::ServerConfig>>,
    id: u64,
    stream: TcpStream,
) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let raw_sock = match stream.try_clone() {
        Ok(sock) => sock,
        Err(e) => {
            warn!(target: "ember::server", error = %e, "socket clone failed");
            return;
        }
    };

    let split = match &tls {
        Some(tls_config) => tls::accept(tls_config, stream).and_then(transport::split_tls),
        None => transport::split_plain(stream, shared.config.idle_timeout),
    };
    let (read_half, write_half) = match split {
        Ok(halves) => halves,
        Err(e) => {
            debug!(target: "ember::server", client = id, error = %e, "connection setup failed");
            return;
        }
    };

    let client = ClientHandle::new(id, peer.clone(), RespWriter::new(write_half), raw_sock);
    shared.registry.insert(Arc::clone(&client));
    shared.engine.stats().connection_opened();
    debug!(target: "ember::server", client = id, peer = %peer, "connected");

    let initial_tokens = shared
        .config
        .rate_limit
        .map(|limit| limit.per_second)
        .unwrap_or(u64::MAX);
    let mut session = SessionState::new(initial_tokens);
    let mut reader = RespReader::new(read_half);

    run_request_loop(&shared, &client, &mut session, &mut reader);

    // Teardown: leave pub/sub, free registry slot, close the socket.
    shared.pubsub.drop_client(id);
    shared.registry.remove(id);
    shared.engine.stats().connection_closed();
    client.close_socket();
    debug!(target: "ember::server", client = id, "disconnected");
}

fn run_request_loop(
    shared: &Arc<Shared>,
    client: &Arc<ClientHandle>,
    session: &mut SessionState,
    reader: &mut RespReader<ReadConn>,
) {
    let polls = reader.get_ref().polls();
    let mut idle_since = Instant::now();

    loop {
        if shared.shutdown.load(Ordering::Acquire) || session.quit {
            break;
        }
        let frame = match reader.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break, // peer closed
            Err(Error::Io(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if polls {
                    // TLS poll tick, not necessarily idle; enforce the limit.
                    match shared.config.idle_timeout {
                        Some(limit) if idle_since.elapsed() >= limit => break,
                        _ => continue,
                    }
                }
                break; // plain socket: the read timeout IS the idle limit
            }
            Err(e) => {
                // Malformed frame: report, then drop the connection.
                if matches!(e, Error::Protocol(_)) {
                    let mut writer = client.writer.lock();
                    let _ = writer.write_frame(&Frame::Error(e.reply_line()));
                    let _ = writer.flush();
                }
                break;
            }
        };
        idle_since = Instant::now();

        // Pipeline detection: more requests already buffered means one
        // flush for the whole burst.
        let pipelined = reader.buffered();
        if pipelined {
            client.writer.lock().set_auto_flush(false);
        }

        if !process_one(shared, client, session, frame) {
            break;
        }
        while !session.quit && reader.buffered() {
            match reader.read_frame() {
                Ok(Some(frame)) => {
                    if !process_one(shared, client, session, frame) {
                        return;
                    }
                }
                Ok(None) => return,
                Err(_) => return,
            }
        }

        if pipelined {
            let mut writer = client.writer.lock();
            let _ = writer.flush();
            writer.set_auto_flush(true);
        }
    }
}

/// Dispatch one request and write its replies. Returns false when the
/// connection must close.
fn process_one(
    shared: &Arc<Shared>,
    client: &Arc<ClientHandle>,
    session: &mut SessionState,
    frame: Frame,
) -> bool {
    let (name, args) = match dispatch::parse_request(frame) {
        Ok(parsed) => parsed,
        Err(e) => {
            let mut writer = client.writer.lock();
            let _ = writer.write_frame(&Frame::Error(e.reply_line()));
            let _ = writer.flush();
            return false;
        }
    };

    let mut ctx = Ctx {
        shared: shared.as_ref(),
        client,
        session,
    };
    match dispatch::handle_request(&mut ctx, name, args) {
        Ok(frames) => {
            let mut writer = client.writer.lock();
            for frame in &frames {
                if writer.write_frame(frame).is_err() {
                    return false;
                }
            }
            true
        }
        Err(e) => {
            debug!(target: "ember::server", client = client.id, error = %e, "closing connection");
            false
        }
    }
}
