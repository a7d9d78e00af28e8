//! Server binary. Configuration comes from the environment:
//!
//! - `EMBER_ADDR`      listen address (default `127.0.0.1:6379`)
//! - `EMBER_DATA_DIR`  data directory for the WAL and snapshots
//!                     (default `./data`)
//! - `EMBER_PASSWORD`  require AUTH with this password
//! - `EMBER_TLS_CERT` / `EMBER_TLS_KEY`  enable the TLS wrap
//! - `EMBER_LOG` / `RUST_LOG`  tracing filter (default `info`)

use anyhow::Context;
use emberdb::{Engine, EngineConfig, Server, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("EMBER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let data_dir = PathBuf::from(std::env::var("EMBER_DATA_DIR").unwrap_or_else(|_| "data".into()));
    let addr = std::env::var("EMBER_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".into());

    let engine = Arc::new(
        Engine::open(EngineConfig::new(data_dir.join("ember.wal")))
            .context("open engine")?,
    );

    let mut config = ServerConfig::new(addr);
    if let Ok(password) = std::env::var("EMBER_PASSWORD") {
        config = config.with_password(password);
    }
    if let (Ok(cert), Ok(key)) = (std::env::var("EMBER_TLS_CERT"), std::env::var("EMBER_TLS_KEY")) {
        config = config.with_tls(cert, key);
    }

    let server = Server::bind(config, Arc::clone(&engine)).context("bind listener")?;
    info!(target: "ember", addr = %server.local_addr(), "emberdb ready");
    server.run();

    engine.shutdown();
    Ok(())
}
