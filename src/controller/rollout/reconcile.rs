use std::sync::Arc;
use std::time::Duration;

use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::{Recorder, Reporter};
use kube::{Resource, ResourceExt};
use thiserror::Error;
use tracing::{info, warn};

use crate::controller::backoff::BackoffTracker;
use crate::controller::clock::Clock;
use crate::controller::events::{publish, RolloutEvent};
use crate::controller::rollout::routing::{apply_weights, RoutingError};
use crate::controller::rollout::state_machine::{decide, defaulted_spec, Decision, Observation};
use crate::controller::rollout::validation::validate_rollout;
use crate::controller::telemetry::TelemetryQuerier;
use crate::crd::rollout::{Phase, Rollout, RolloutSpec, RolloutStatus};
use crate::server::{LeaderState, SharedMetrics};

/// Requeue delay after a rollout is terminated by a fatal routing error —
/// the same long cadence used for a terminal `Abort`/`Finish`, since the
/// rollout is done reconciling aggressively either way.
const ROUTING_FATAL_REQUEUE: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Rollout missing namespace")]
    MissingNamespace,

    #[error("invalid Rollout spec: {0}")]
    ValidationError(String),

    #[error("telemetry query failed: {0}")]
    TelemetryError(#[from] crate::controller::telemetry::TelemetryError),

    #[error("routing handle update failed: {0}")]
    RoutingError(#[from] RoutingError),
}

/// Shared dependencies for every reconcile invocation. One instance is
/// wrapped in `Arc` and handed to `kube::runtime::Controller::run`.
pub struct Context {
    pub client: kube::Client,
    pub telemetry: Arc<dyn TelemetryQuerier>,
    pub clock: Arc<dyn Clock>,
    pub backoff: Arc<BackoffTracker>,
    pub default_prometheus_url: Option<String>,
    pub metrics: Option<SharedMetrics>,
    /// `None` means leader election is disabled; this instance always
    /// reconciles. `Some` gates reconciliation on currently holding the
    /// lease.
    pub leader_state: Option<LeaderState>,
}

impl Context {
    pub fn new(
        client: kube::Client,
        telemetry: impl TelemetryQuerier + 'static,
        clock: Arc<dyn Clock>,
        default_prometheus_url: Option<String>,
        metrics: Option<SharedMetrics>,
        leader_state: Option<LeaderState>,
    ) -> Self {
        Context {
            client,
            telemetry: Arc::new(telemetry),
            clock,
            backoff: Arc::new(BackoffTracker::new()),
            default_prometheus_url,
            metrics,
            leader_state,
        }
    }

    pub fn should_reconcile(&self) -> bool {
        match &self.leader_state {
            None => true,
            Some(state) => state.is_leader(),
        }
    }

    #[cfg(test)]
    pub fn new_mock(telemetry: impl TelemetryQuerier + 'static, clock: Arc<dyn Clock>) -> Self {
        let mut config = kube::Config::new("https://localhost:8443".parse().unwrap());
        config.default_namespace = "default".to_string();
        let client = kube::Client::try_from(config).expect("mock client config is well-formed");

        Context {
            client,
            telemetry: Arc::new(telemetry),
            clock,
            backoff: Arc::new(BackoffTracker::new()),
            default_prometheus_url: None,
            metrics: None,
            leader_state: None,
        }
    }
}

/// Entry point handed to `kube::runtime::Controller::run`.
pub async fn reconcile(rollout: Arc<Rollout>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    if !ctx.should_reconcile() {
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    let start = std::time::Instant::now();
    let namespace = rollout.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let name = rollout.name_any();
    let key = format!("{namespace}/{name}");

    info!(rollout = %name, namespace = %namespace, "reconciling rollout");

    let result = reconcile_inner(&rollout, &ctx, &namespace, &name).await;

    if let Some(ref metrics) = ctx.metrics {
        let phase_label = rollout
            .status
            .as_ref()
            .and_then(|s| s.phase)
            .map(|p| format!("{p:?}"))
            .unwrap_or_else(|| "Unknown".to_string());
        match &result {
            Ok(_) => metrics.record_reconciliation_success(&phase_label, start.elapsed().as_secs_f64()),
            Err(_) => metrics.record_reconciliation_error(&phase_label, start.elapsed().as_secs_f64()),
        }
    }

    match result {
        Ok(requeue) => {
            ctx.backoff.record_success(&key);
            Ok(requeue)
        }
        Err(err) => Err(err),
    }
}

async fn reconcile_inner(
    rollout: &Rollout,
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcileError> {
    validate_rollout(rollout).map_err(ReconcileError::ValidationError)?;

    let spec = defaulted_spec(&rollout.spec);
    let generation = rollout.meta().generation.unwrap_or(0);

    let mut status = rollout.status.clone().unwrap_or_default();

    if status.phase.is_some_and(|p| p.is_terminal()) && status.observed_generation != generation {
        info!(rollout = %name, "spec changed after terminal phase, restarting rollout");
        status = RolloutStatus::default();
    }

    let rollouts: Api<Rollout> = Api::namespaced(ctx.client.clone(), namespace);
    let recorder = Recorder::new(
        ctx.client.clone(),
        Reporter::from("canary-rollout-controller"),
        rollout.object_ref(&()),
    );

    if status.phase.is_none() {
        let now = ctx.clock.now();
        status.phase = Some(Phase::Pending);
        status.last_transition = Some(now.to_rfc3339());
        status.observed_generation = generation;
        persist_status(&rollouts, name, &status).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let endpoint = if !spec.slo.endpoint.is_empty() {
        spec.slo.endpoint.clone()
    } else {
        ctx.default_prometheus_url.clone().unwrap_or_default()
    };

    let p95_ms = match ctx.telemetry.query(&endpoint, &spec.slo.p95_query).await {
        Ok(value) => value,
        Err(err) => {
            warn!(rollout = %name, error = %err, "p95 telemetry query failed");
            publish(&recorder, RolloutEvent::PromQueryError(&err.to_string())).await;
            return Err(ReconcileError::TelemetryError(err));
        }
    };
    let error_rate = match ctx.telemetry.query(&endpoint, &spec.slo.error_rate_query).await {
        Ok(value) => value,
        Err(err) => {
            warn!(rollout = %name, error = %err, "error rate telemetry query failed");
            publish(&recorder, RolloutEvent::PromQueryError(&err.to_string())).await;
            return Err(ReconcileError::TelemetryError(err));
        }
    };

    let obs = Observation { p95_ms, error_rate };
    let now = ctx.clock.now();
    let decision = decide(&spec, &status, obs, now);

    status.p95_ms = p95_ms;
    status.error_rate = error_rate;
    status.error_budget_remaining =
        crate::controller::rollout::state_machine::evaluate(&spec, obs).error_budget_remaining;
    status.observed_generation = generation;

    let requeue_after =
        decision.requeue_after(Duration::from_secs(spec.step_interval_seconds.max(0) as u64));

    match decision {
        Decision::Init { .. } => unreachable!("Init only occurs when phase is empty, handled above"),
        Decision::Hold => {}
        Decision::Abort { reason, now } => {
            if let Some(action) = apply_weights_checked(
                ctx,
                rollout,
                namespace,
                &spec,
                100,
                0,
                &mut status,
                &rollouts,
                &recorder,
                name,
            )
            .await?
            {
                return Ok(action);
            }
            status.phase = Some(Phase::Failed);
            status.current_weight = 0;
            status.message = Some(format!("rollback: {reason}"));
            status.last_transition = Some(now.to_rfc3339());
            publish(&recorder, RolloutEvent::Rollback(&reason)).await;
        }
        Decision::Advance { index, weight, now } => {
            if let Some(action) = apply_weights_checked(
                ctx,
                rollout,
                namespace,
                &spec,
                100 - weight,
                weight,
                &mut status,
                &rollouts,
                &recorder,
                name,
            )
            .await?
            {
                return Ok(action);
            }
            status.phase = Some(Phase::Progressing);
            status.current_weight = weight;
            status.current_step_index = index as i32 + 1;
            let message = format!("advanced to step {index} ({weight}% canary)");
            status.message = Some(message.clone());
            status.last_transition = Some(now.to_rfc3339());
            publish(&recorder, RolloutEvent::Progress(&message)).await;
        }
        Decision::Finish { now } => {
            if let Some(action) = apply_weights_checked(
                ctx,
                rollout,
                namespace,
                &spec,
                0,
                100,
                &mut status,
                &rollouts,
                &recorder,
                name,
            )
            .await?
            {
                return Ok(action);
            }
            status.phase = Some(Phase::Succeeded);
            status.current_weight = 100;
            status.message = Some("reached final weight".to_string());
            status.last_transition = Some(now.to_rfc3339());
            publish(&recorder, RolloutEvent::Progress("reached final weight")).await;
        }
    }

    persist_status(&rollouts, name, &status).await?;

    if let Some(ref metrics) = ctx.metrics {
        metrics.set_rollout_weight(name, status.current_weight as f64);
    }

    Ok(Action::requeue(requeue_after))
}

/// Applies weights to the routing handles, handling the transient/fatal
/// split on `RoutingError`. A transient failure propagates as a
/// `ReconcileError` for the controller's normal backoff retry. A fatal
/// failure (authz/schema) instead terminates the rollout directly: sets
/// `phase=Failed`, persists status, publishes a `Fatal` event, and returns
/// `Some(action)` for the caller to return immediately instead of applying
/// the decision's own status transition.
#[allow(clippy::too_many_arguments)]
async fn apply_weights_checked(
    ctx: &Context,
    rollout: &Rollout,
    namespace: &str,
    spec: &RolloutSpec,
    stable_weight: i32,
    canary_weight: i32,
    status: &mut RolloutStatus,
    rollouts: &Api<Rollout>,
    recorder: &Recorder,
    name: &str,
) -> Result<Option<Action>, ReconcileError> {
    match apply_weights(
        ctx.client.clone(),
        rollout,
        namespace,
        &spec.stable_handle,
        &spec.canary_handle,
        stable_weight,
        canary_weight,
    )
    .await
    {
        Ok(()) => Ok(None),
        Err(err @ RoutingError::Fatal(_)) => {
            let message = format!("routing handle update failed permanently: {err}");
            status.phase = Some(Phase::Failed);
            status.message = Some(message.clone());
            status.last_transition = Some(ctx.clock.now().to_rfc3339());
            persist_status(rollouts, name, status).await?;
            publish(recorder, RolloutEvent::Fatal(&message)).await;
            Ok(Some(Action::requeue(ROUTING_FATAL_REQUEUE)))
        }
        Err(err @ RoutingError::Transient(_)) => Err(ReconcileError::RoutingError(err)),
    }
}

async fn persist_status(
    rollouts: &Api<Rollout>,
    name: &str,
    status: &RolloutStatus,
) -> Result<(), ReconcileError> {
    rollouts
        .patch_status(
            name,
            &PatchParams::default(),
            &Patch::Merge(&serde_json::json!({ "status": status })),
        )
        .await?;
    Ok(())
}

/// `kube::runtime::Controller` error policy: computes the next retry delay
/// from the per-key backoff tracker.
pub fn error_policy(rollout: Arc<Rollout>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    let namespace = rollout.namespace().unwrap_or_default();
    let name = rollout.name_any();
    let key = format!("{namespace}/{name}");

    warn!(rollout = %name, error = %error, "reconcile failed, will retry");

    let delay = ctx.backoff.record_failure(&key);
    Action::requeue(delay)
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
