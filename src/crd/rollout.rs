use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Rollout is a Custom Resource for progressive canary delivery.
///
/// It declares a target workload (informational only — the controller never
/// mutates it directly), two routing handles that receive weighted traffic,
/// a sequence of canary weights to step through, and the SLO thresholds that
/// gate each step.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "canary.example.io",
    version = "v1alpha1",
    kind = "Rollout",
    namespaced,
    status = "RolloutStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Step", "type":"integer", "jsonPath":".status.currentStepIndex"}"#,
    printcolumn = r#"{"name":"Weight", "type":"integer", "jsonPath":".status.currentWeight"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct RolloutSpec {
    /// Opaque name of the workload under rollout. Informational only; the
    /// controller takes no action on it directly.
    #[serde(rename = "targetRef")]
    pub target_ref: String,

    /// Name of the routing handle (a `v1.Service`) that receives stable traffic.
    /// Empty string skips writing to this handle.
    #[serde(rename = "stableHandle", default)]
    pub stable_handle: String,

    /// Name of the routing handle (a `v1.Service`) that receives canary traffic.
    /// Empty string skips writing to this handle.
    #[serde(rename = "canaryHandle", default)]
    pub canary_handle: String,

    /// Ordered, strictly increasing canary weight percentages, ending at 100.
    /// Defaults to `[10, 50, 100]` when empty.
    #[serde(default)]
    pub steps: Vec<i32>,

    /// Seconds between steps while healthy. Defaults to 30 when zero.
    #[serde(rename = "stepIntervalSeconds", default)]
    pub step_interval_seconds: i64,

    /// SLO thresholds consulted on every reconcile.
    #[serde(default)]
    pub slo: SloConfig,

    /// Abort thresholds independent of the per-metric SLO checks.
    #[serde(default)]
    pub abort: AbortConfig,
}

/// SLO telemetry configuration: what to query and what "too slow" / "too
/// error-prone" means.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct SloConfig {
    /// Telemetry base URL. Falls back to the `PROMETHEUS_URL` process
    /// environment variable when empty.
    #[serde(default)]
    pub endpoint: String,

    /// Instant-vector query returning p95 latency in milliseconds. Empty
    /// string disables the latency observation (treated as 0).
    #[serde(rename = "p95Query", default)]
    pub p95_query: String,

    /// Instant-vector query returning the error rate (0..1 or a percentage,
    /// whatever scale `errorRateMax` is expressed in). Empty string disables
    /// the error-rate observation (treated as 0).
    #[serde(rename = "errorRateQuery", default)]
    pub error_rate_query: String,

    /// p95 threshold in milliseconds. Zero disables the check.
    #[serde(rename = "p95MaxMs", default)]
    pub p95_max_ms: f64,

    /// Error-rate threshold. Zero disables the check.
    #[serde(rename = "errorRateMax", default)]
    pub error_rate_max: f64,
}

/// Abort thresholds evaluated alongside the SLO checks.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct AbortConfig {
    /// Minimum acceptable remaining error budget, as a percentage in
    /// [0, 100]. Zero disables the check.
    #[serde(rename = "minErrorBudgetPercent", default)]
    pub min_error_budget_percent: f64,

    /// Maximum allowed increase over a measured baseline p95, in
    /// milliseconds. Declared for forward compatibility; not yet consumed by
    /// the decision rules (no baseline is tracked).
    #[serde(rename = "maxP95IncreaseMs", default)]
    pub max_p95_increase_ms: f64,
}

/// Lifecycle phase of a Rollout.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum Phase {
    /// Freshly created; status not yet initialized.
    #[default]
    Pending,
    /// Actively stepping canary weight upward.
    Progressing,
    /// Reached 100% canary weight.
    Succeeded,
    /// Rolled back to 0% canary weight after an SLO breach.
    Failed,
}

impl Phase {
    /// `Succeeded` and `Failed` are sticky: the state machine never leaves
    /// them except via an explicit spec-generation reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

/// Controller-owned observed state of a Rollout.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct RolloutStatus {
    /// Current lifecycle phase. `None` is treated identically to an
    /// uninitialized rollout (triggers `Init`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// Index into `spec.steps` of the *next* step to apply. Ranges over
    /// `[0, steps.len()]`; equal to `steps.len()` once terminal.
    #[serde(rename = "currentStepIndex", default)]
    pub current_step_index: i32,

    /// Last canary weight applied to the routing handles.
    #[serde(rename = "currentWeight", default)]
    pub current_weight: i32,

    /// RFC3339 timestamp of the most recent phase or weight change.
    #[serde(rename = "lastTransition", skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<String>,

    /// Human-readable reason for the last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Most recently observed p95 latency, milliseconds.
    #[serde(rename = "p95Ms", default)]
    pub p95_ms: f64,

    /// Most recently observed error rate.
    #[serde(rename = "errorRate", default)]
    pub error_rate: f64,

    /// Most recently computed remaining error budget, percentage in
    /// [0, 100].
    #[serde(rename = "errorBudgetRemaining", default)]
    pub error_budget_remaining: f64,

    /// `metadata.generation` as of the last reconcile. Used to detect a
    /// spec edit after a terminal phase and restart the rollout.
    #[serde(rename = "observedGeneration", default)]
    pub observed_generation: i64,
}

#[cfg(test)]
#[path = "rollout_test.rs"]
mod tests;
