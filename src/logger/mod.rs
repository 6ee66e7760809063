//! Logger module
//!
//! Provides logging utilities for the HTTP server including:
//! - Subscriber initialisation (`tracing` + `EnvFilter`)
//! - Server lifecycle logging
//! - Access logging in combined format

mod access;

pub use access::AccessLogEntry;

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Initialize the global subscriber
///
/// `RUST_LOG` wins over `logging.level` when set. Should be called once at
/// application startup.
pub fn init(config: &Config) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .map_err(|e| format!("Invalid log level '{}': {e}", config.logging.level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| format!("Logger already initialised: {e}"))
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    tracing::info!(
        listen = %addr,
        root_dir = %config.files.root_dir.display(),
        uploads = %config.uploads.path,
        encrypted = config.server.encrypted,
        workers = ?config.server.workers,
        max_connections = ?config.performance.max_connections,
        "quay started"
    );
}

/// Emit one access log line under the `access` target
pub fn log_access(entry: &AccessLogEntry) {
    tracing::info!(
        target: "access",
        status = entry.status,
        scheme = %entry.scheme,
        host = entry.host.as_deref().unwrap_or("-"),
        elapsed_us = entry.request_time_us,
        "{}",
        entry.format_combined()
    );
}
