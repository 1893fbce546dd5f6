//! Liveness and readiness probe endpoints for Kubernetes.
//!
//! - `/healthz` — liveness: is the process alive?
//! - `/readyz` — readiness: has the controller's Kubernetes client connected
//!   and the watch stream been established?

use axum::{http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared readiness flag. The controller flips this on once its watch
/// stream is established, and back off during graceful shutdown so the
/// probe fails fast and traffic stops routing to this pod.
#[derive(Debug, Clone)]
pub struct ReadinessState {
    ready: Arc<std::sync::atomic::AtomicBool>,
}

impl ReadinessState {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_not_ready(&self) {
        self.ready.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self::new()
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(
    axum::extract::State(readiness): axum::extract::State<ReadinessState>,
) -> StatusCode {
    if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn build_router(readiness: ReadinessState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(readiness)
}

/// Runs the health/readiness HTTP server until the listener is dropped or
/// the process is killed. Bound separately from the metrics server so the
/// two can be scraped/probed by different components.
pub async fn run_health_server(addr: SocketAddr, readiness: ReadinessState) -> std::io::Result<()> {
    let app = build_router(readiness);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "health and readiness server listening");

    axum::serve(listener, app).await
}
