use std::net::SocketAddr;
use std::sync::Arc;

use canary_rollout_controller::controller::clock::SystemClock;
use canary_rollout_controller::controller::telemetry::HttpTelemetryClient;
use canary_rollout_controller::controller::{error_policy, reconcile, Context};
use canary_rollout_controller::crd::rollout::Rollout;
use canary_rollout_controller::server::{
    create_metrics, run_health_server, run_leader_election, run_metrics_server, shutdown_channel,
    wait_for_signal, LeaderConfig, LeaderState, ReadinessState,
};
use clap::Parser;
use futures::StreamExt;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "canary-rollout-controller", version, about)]
struct Cli {
    /// Address the `/metrics` Prometheus endpoint binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    metrics_bind_address: SocketAddr,

    /// Address the `/healthz` and `/readyz` probes bind to.
    #[arg(long, default_value = "0.0.0.0:8081")]
    health_probe_bind_address: SocketAddr,

    /// Enable Lease-based leader election for multi-replica deployments.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    leader_elect: bool,

    /// Default telemetry endpoint used when a Rollout's `spec.slo.endpoint`
    /// is empty. Falls back to the `PROMETHEUS_URL` environment variable.
    #[arg(long, env = "PROMETHEUS_URL")]
    prometheus_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("starting canary rollout controller");

    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let readiness = ReadinessState::new();
    let metrics = create_metrics();

    let client = match Client::try_default().await {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "failed to create Kubernetes client");
            return Err(err.into());
        }
    };
    info!("connected to Kubernetes cluster");

    let health_readiness = readiness.clone();
    let health_addr = cli.health_probe_bind_address;
    let health_handle = tokio::spawn(async move {
        if let Err(err) = run_health_server(health_addr, health_readiness).await {
            warn!(error = %err, "health server failed");
        }
    });

    let metrics_addr = cli.metrics_bind_address;
    let metrics_for_server = metrics.clone();
    let metrics_handle = tokio::spawn(async move {
        if let Err(err) = run_metrics_server(metrics_addr, metrics_for_server).await {
            warn!(error = %err, "metrics server failed");
        }
    });

    let leader_state = LeaderState::new();
    let leader_handle = if cli.leader_elect {
        let leader_client = client.clone();
        let leader_config = LeaderConfig::from_env();
        let leader_state_clone = leader_state.clone();
        let leader_shutdown = shutdown_signal.clone();

        info!(holder_id = %leader_config.holder_id, "leader election enabled");

        Some(tokio::spawn(async move {
            run_leader_election(leader_client, leader_config, leader_state_clone, leader_shutdown)
                .await;
        }))
    } else {
        info!("leader election disabled, running as single instance");
        leader_state.set_leader(true);
        None
    };

    let rollouts = Api::<Rollout>::all(client.clone());

    let ctx = Arc::new(Context::new(
        client.clone(),
        HttpTelemetryClient::new(),
        Arc::new(SystemClock),
        cli.prometheus_url,
        Some(metrics.clone()),
        cli.leader_elect.then_some(leader_state.clone()),
    ));

    readiness.set_ready();
    info!("controller ready, starting reconciliation loop");

    let controller = Controller::new(rollouts, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Err(err) = res {
                warn!(error = ?err, "reconcile failed");
            }
        });

    tokio::select! {
        _ = controller => {
            info!("controller stream ended");
        }
        signal = wait_for_signal() => {
            info!(signal, "initiating graceful shutdown");
            readiness.set_not_ready();
        }
    }

    shutdown_controller.shutdown();

    if let Some(handle) = leader_handle {
        handle.abort();
    }
    health_handle.abort();
    metrics_handle.abort();

    info!("canary rollout controller shut down gracefully");
    Ok(())
}
