//! lmd-daemon: serves character and token trigram lookups over a local socket.

mod ipc_server;

use lmd_core::{Config, Result};
use lmd_model::QueryEngine;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

use crate::ipc_server::IpcServer;

fn main() -> Result<()> {
    lmd_core::logging::init();

    if std::env::args().any(|arg| arg == "--version" || arg == "-V") {
        println!("lmd-daemon {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    info!("lmd daemon starting...");

    let config = Config::load_or_default()?;
    config.validate()?;

    let engine = QueryEngine::open(&config.data_dir, config.shard_count);
    info!(
        "Serving {} ({} shards)",
        engine.layout().dir().display(),
        engine.layout().shard_count()
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let socket_path = lmd_core::ipc::socket_path();
    let server = IpcServer::new(&socket_path, engine, Arc::clone(&shutdown))?;

    info!("lmd daemon running.");

    // Blocks until shutdown; dropping the server removes the socket.
    let result = server.run();
    drop(server);
    result
}
