//! Waypoint Road: the shared session store behind host and player devices.
//!
//! Devices write fields with `POST /session/:code/progress` and poll the merged record
//! with `GET /session/:code`. The store is either Redis or an in-process map, picked
//! once at startup from configuration.

pub mod cli;
pub mod config;
pub mod handlers;
pub mod service;
pub mod storage;
pub mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{BackendChoice, Config};
use crate::handlers::{build_router, AppState};
use crate::service::{SessionService, SyncPolicy};
use crate::storage::{MemoryStore, RedisStore, SharedStore};

/// Builds the single store instance shared by every handler in this process.
pub async fn build_store(config: &Config) -> Result<SharedStore> {
    match config.store_backend() {
        BackendChoice::Redis { url, token } => {
            let store = RedisStore::connect(&url, &token, config.session_ttl())
                .await
                .context("failed to connect to the configured session store")?;
            info!("using redis session store");
            Ok(Arc::new(store))
        }
        BackendChoice::Memory => {
            warn!("WAYPOINT_KV_URL/WAYPOINT_KV_TOKEN not set; using in-memory session store");
            let store = MemoryStore::new(config.session_ttl());
            store.spawn_sweeper(config.sweep_interval());
            Ok(Arc::new(store))
        }
    }
}

/// Serves the API on `listener` until the process is asked to stop.
pub async fn serve(
    listener: TcpListener,
    store: SharedStore,
    config: &Config,
    metrics: Option<PrometheusHandle>,
) -> Result<()> {
    let state = AppState {
        sessions: SessionService::new(store, SyncPolicy::from(config)),
        metrics,
    };
    let app = build_router(state);

    info!(addr = %listener.local_addr()?, "waypoint road listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
