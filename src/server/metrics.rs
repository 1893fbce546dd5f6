//! Controller-owned Prometheus metrics, exposed over `/metrics`.
//!
//! Distinct from `controller::telemetry`, which *queries* an external
//! Prometheus to evaluate SLOs — this module *exposes* this process's own
//! operational metrics for an external Prometheus to scrape.

use axum::{http::header::CONTENT_TYPE, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Thread-safe handle to the controller's metric registry. Cheap to clone;
/// every reconcile holds one via `Context`.
#[derive(Clone)]
pub struct SharedMetrics(Arc<Inner>);

struct Inner {
    registry: Registry,
    reconciliations: IntCounterVec,
    reconcile_duration: HistogramVec,
    rollout_weight: prometheus::GaugeVec,
}

/// Builds a fresh metrics registry with the controller's gauges/counters
/// registered. Call once at startup.
pub fn create_metrics() -> SharedMetrics {
    let registry = Registry::new();

    let reconciliations = IntCounterVec::new(
        prometheus::Opts::new(
            "canary_rollout_reconciliations_total",
            "Total reconciliations, partitioned by phase and outcome",
        ),
        &["phase", "outcome"],
    )
    .expect("metric names and labels are valid");

    let reconcile_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "canary_rollout_reconcile_duration_seconds",
            "Reconciliation duration in seconds",
        ),
        &["phase"],
    )
    .expect("metric names and labels are valid");

    let rollout_weight = prometheus::GaugeVec::new(
        prometheus::Opts::new(
            "canary_rollout_weight",
            "Last applied canary weight percentage, per rollout",
        ),
        &["rollout"],
    )
    .expect("metric names and labels are valid");

    registry
        .register(Box::new(reconciliations.clone()))
        .expect("first registration of this metric");
    registry
        .register(Box::new(reconcile_duration.clone()))
        .expect("first registration of this metric");
    registry
        .register(Box::new(rollout_weight.clone()))
        .expect("first registration of this metric");

    SharedMetrics(Arc::new(Inner {
        registry,
        reconciliations,
        reconcile_duration,
        rollout_weight,
    }))
}

impl SharedMetrics {
    pub fn record_reconciliation_success(&self, phase: &str, duration_seconds: f64) {
        self.0
            .reconciliations
            .with_label_values(&[phase, "success"])
            .inc();
        self.0
            .reconcile_duration
            .with_label_values(&[phase])
            .observe(duration_seconds);
    }

    pub fn record_reconciliation_error(&self, phase: &str, duration_seconds: f64) {
        self.0
            .reconciliations
            .with_label_values(&[phase, "error"])
            .inc();
        self.0
            .reconcile_duration
            .with_label_values(&[phase])
            .observe(duration_seconds);
    }

    pub fn set_rollout_weight(&self, rollout: &str, weight: f64) {
        self.0.rollout_weight.with_label_values(&[rollout]).set(weight);
    }

    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let metric_families = self.0.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

/// Runs the `/metrics` HTTP server until the listener is dropped or the
/// process is killed.
pub async fn run_metrics_server(addr: SocketAddr, metrics: SharedMetrics) -> std::io::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "metrics server listening");

    axum::serve(listener, app).await
}
