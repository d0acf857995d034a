//! Admin HTTP API.
//!
//! # Routes
//! ```text
//! GET  /admin/status
//! GET  /circuits
//! GET  /circuits/{hash}
//! POST /circuits/close       {"uri": ...}
//! POST /circuits/reopen      {"uri": ...}
//! POST /circuits/close-all
//! ```
//! All routes sit behind the optional bearer-token check.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::breaker::QueueCircuitBreaker;
use crate::lifecycle::shutdown::wait_for;

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub breaker: Arc<QueueCircuitBreaker>,
    pub instance: Arc<str>,
    pub api_key: Option<Arc<str>>,
}

impl AdminState {
    pub fn new(breaker: Arc<QueueCircuitBreaker>, instance: &str, api_key: Option<&str>) -> Self {
        Self {
            breaker,
            instance: Arc::from(instance),
            api_key: api_key.map(Arc::from),
        }
    }
}

#[allow(deprecated)]
pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/circuits", get(list_circuits))
        .route("/circuits/close", post(close_circuit))
        .route("/circuits/reopen", post(reopen_circuit))
        .route("/circuits/close-all", post(close_all_circuits))
        .route("/circuits/{hash}", get(get_circuit))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin API until the shutdown signal fires.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    shutdown_rx: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(wait_for(shutdown_rx))
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
