//! TLS listener support: PEM loading and per-connection handshakes.
//! Only TLS 1.2 and 1.3 are offered.

use crate::config::TlsConfig;
use ember_core::{Error, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig as RustlsConfig, ServerConnection, StreamOwned};
use std::fs::File;
use std::io::BufReader;
use std::net::TcpStream;
use std::sync::Arc;

/// Build the rustls server config from PEM cert/key files.
pub fn build_acceptor(config: &TlsConfig) -> Result<Arc<RustlsConfig>> {
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(File::open(&config.cert_path)?))
            .collect::<std::io::Result<_>>()
            .map_err(|e| Error::Syntax(format!("bad certificate file: {}", e)))?;
    if certs.is_empty() {
        return Err(Error::Syntax("certificate file holds no certificates".into()));
    }

    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut BufReader::new(File::open(&config.key_path)?))
            .map_err(|e| Error::Syntax(format!("bad key file: {}", e)))?
            .ok_or_else(|| Error::Syntax("key file holds no private key".into()))?;

    let tls = RustlsConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS13,
        &rustls::version::TLS12,
    ])
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| Error::Syntax(format!("tls config: {}", e)))?;

    Ok(Arc::new(tls))
}

/// Run the handshake over an accepted socket.
pub fn accept(
    tls: &Arc<RustlsConfig>,
    stream: TcpStream,
) -> Result<StreamOwned<ServerConnection, TcpStream>> {
    let conn = ServerConnection::new(Arc::clone(tls))
        .map_err(|e| Error::Protocol(format!("tls session: {}", e)))?;
    let mut stream = StreamOwned::new(conn, stream);
    // Drive the handshake to completion before handing the stream over.
    stream
        .conn
        .complete_io(&mut stream.sock)
        .map_err(|e| Error::Protocol(format!("tls handshake: {}", e)))?;
    Ok(stream)
}
