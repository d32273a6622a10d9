// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley serve` command implementation.
//!
//! Opens the SQLite store, builds the configured broadcast driver, wires the
//! conversation services into an [`Engine`] and serves the gateway until a
//! shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use parley_broadcast::{ChannelHub, build_driver};
use parley_config::model::ParleyConfig;
use parley_core::{ParleyError, PluginAdapter, StorageAdapter};
use parley_gateway::{AuthConfig, GatewayState, start_server};
use parley_messaging::Engine;
use parley_storage::SqliteStorage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::shutdown;

/// How often idle hub channels are dropped.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the `parley serve` command.
pub async fn run_serve(config: ParleyConfig) -> Result<(), ParleyError> {
    init_tracing(&config.log_level);
    info!("starting parley serve");

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    info!(path = %config.storage.database_path, "storage ready");

    let handle = build_driver(&config.broadcast)?;
    let driver = Arc::clone(&handle.driver);

    let engine = Arc::new(Engine::new(
        storage.clone(),
        Arc::clone(&driver),
        &config,
    ));
    if config.server.bearer_token.is_none() {
        warn!("server.bearer_token is not set; every API request will be refused");
    }
    let state = GatewayState::new(
        engine,
        handle.hub.clone(),
        AuthConfig {
            bearer_token: config.server.bearer_token.clone(),
        },
    );

    let cancel = shutdown::install_signal_handler();
    let housekeeping = tokio::spawn(housekeeping(handle.hub.clone(), cancel.clone()));

    let result = start_server(&config.server, state, cancel.clone()).await;

    cancel.cancel();
    let _ = housekeeping.await;
    if let Err(e) = driver.shutdown().await {
        warn!(error = %e, "broadcast driver shutdown failed");
    }
    if let Err(e) = storage.close().await {
        warn!(error = %e, "storage close failed");
    }
    info!("parley stopped");
    result
}

/// Periodic maintenance while the server runs: prunes hub channels nobody
/// listens to and logs allocator statistics.
async fn housekeeping(hub: Option<Arc<ChannelHub>>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(hub) = &hub {
                    hub.prune();
                }
                log_memory_stats();
            }
            _ = cancel.cancelled() => {
                debug!("housekeeping stopped");
                break;
            }
        }
    }
}

#[cfg(not(target_env = "msvc"))]
fn log_memory_stats() {
    // Stats are cached until the epoch advances.
    let _ = tikv_jemalloc_ctl::epoch::advance();
    let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
    let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
    debug!(
        allocated_mb = allocated / (1024 * 1024),
        resident_mb = resident / (1024 * 1024),
        "memory"
    );
}

#[cfg(target_env = "msvc")]
fn log_memory_stats() {}

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` wins when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
