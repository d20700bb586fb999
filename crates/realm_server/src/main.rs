//! Realm World Server
//!
//! Loads configuration, starts the save pipeline and the map scheduler and
//! ticks the world until Ctrl+C.
//!
//! Run with: cargo run -p realm_server -- [path/to/realm.toml]

mod config;
mod server;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use config::ServerConfig;
use server::WorldServer;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = match ServerConfig::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    config.print_summary();

    let mut server = match WorldServer::start(config) {
        Ok(server) => server,
        Err(e) => {
            log::error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        flag.store(true, Ordering::Relaxed);
    }) {
        log::warn!("Failed to set Ctrl+C handler: {}", e);
    }

    server.run(&shutdown);
    server.shutdown();
}
