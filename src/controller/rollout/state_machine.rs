//! Pure reconciliation decision function.
//!
//! `decide` takes the defaulted spec, the current status, a fresh telemetry
//! observation, and the clock reading, and returns exactly one `Decision`. It
//! performs no I/O and reads no clock other than `now` — this is what makes
//! it exhaustively unit-testable without a Kubernetes API server or a live
//! telemetry backend.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::crd::rollout::{Phase, RolloutSpec, RolloutStatus};

const INIT_REQUEUE: Duration = Duration::from_secs(1);
const TERMINAL_REQUEUE: Duration = Duration::from_secs(120);

/// A fresh telemetry observation fed into `decide`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Observation {
    pub p95_ms: f64,
    pub error_rate: f64,
}

/// The single action the reconciler should take this pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Initialize status to `Pending`.
    Init { now: DateTime<Utc> },
    /// Drive weights to (100, 0) and set `phase=Failed`.
    Abort { reason: String, now: DateTime<Utc> },
    /// Drive weights to `(100 - w, w)`, advance to step `index + 1`.
    Advance {
        index: usize,
        weight: i32,
        now: DateTime<Utc>,
    },
    /// Drive weights to (0, 100) if not already there, set `phase=Succeeded`.
    Finish { now: DateTime<Utc> },
    /// No writes this pass. Only produced once a rollout is already
    /// terminal (`Failed`/`Succeeded`) and the abort condition is still
    /// true; requeues on the same long cadence as `Abort`/`Finish` so a
    /// terminal rollout with a standing SLO breach doesn't keep
    /// re-evaluating every `stepInterval`.
    Hold,
}

impl Decision {
    pub fn requeue_after(&self, step_interval: Duration) -> Duration {
        match self {
            Decision::Init { .. } => INIT_REQUEUE,
            Decision::Abort { .. } => TERMINAL_REQUEUE,
            Decision::Advance { .. } => step_interval,
            Decision::Finish { .. } => TERMINAL_REQUEUE,
            Decision::Hold => TERMINAL_REQUEUE,
        }
    }
}

/// Computed from `Observation` and the spec's abort/SLO thresholds.
pub struct Evaluation {
    pub error_budget_remaining: f64,
    pub abort_reason: Option<String>,
}

/// Evaluates the abort condition and error budget for one observation.
///
/// Separated from `decide` only for readability; it has the same purity
/// guarantees (no I/O, no hidden state).
pub fn evaluate(spec: &RolloutSpec, obs: Observation) -> Evaluation {
    let error_rate_max = spec.slo.error_rate_max;
    let error_budget_remaining = if error_rate_max > 0.0 {
        (1.0 - obs.error_rate / error_rate_max).max(0.0) * 100.0
    } else {
        100.0
    };

    let mut reasons = Vec::new();

    if spec.slo.p95_max_ms > 0.0 && obs.p95_ms > spec.slo.p95_max_ms {
        reasons.push(format!(
            "p95={:.1}ms exceeds threshold {:.1}ms",
            obs.p95_ms, spec.slo.p95_max_ms
        ));
    }
    if error_rate_max > 0.0 && obs.error_rate > error_rate_max {
        reasons.push(format!(
            "error_rate={:.4} exceeds threshold {:.4}",
            obs.error_rate, error_rate_max
        ));
    }
    if spec.abort.min_error_budget_percent > 0.0
        && error_budget_remaining < spec.abort.min_error_budget_percent
    {
        reasons.push(format!(
            "error_budget_remaining={:.1}% below minimum {:.1}%",
            error_budget_remaining, spec.abort.min_error_budget_percent
        ));
    }

    Evaluation {
        error_budget_remaining,
        abort_reason: if reasons.is_empty() {
            None
        } else {
            Some(reasons.join("; "))
        },
    }
}

/// The pure decision function. `spec` must already have defaults applied
/// (empty `steps`, zero `stepIntervalSeconds`).
pub fn decide(
    spec: &RolloutSpec,
    status: &RolloutStatus,
    obs: Observation,
    now: DateTime<Utc>,
) -> Decision {
    let Some(phase) = status.phase else {
        return Decision::Init { now };
    };

    let evaluation = evaluate(spec, obs);

    if let Some(reason) = evaluation.abort_reason {
        if phase != Phase::Failed && phase != Phase::Succeeded {
            return Decision::Abort { reason, now };
        }
        return Decision::Hold;
    }

    let step_index = status.current_step_index as usize;
    if step_index >= spec.steps.len() {
        return Decision::Finish { now };
    }

    let weight = spec.steps[step_index];
    if weight >= 100 {
        return Decision::Finish { now };
    }

    Decision::Advance {
        index: step_index,
        weight,
        now,
    }
}

/// Applies spec defaults without mutating the stored resource: empty
/// `steps` becomes `[10, 50, 100]`, zero `stepIntervalSeconds` becomes 30.
pub fn defaulted_spec(spec: &RolloutSpec) -> RolloutSpec {
    let mut defaulted = spec.clone();
    if defaulted.steps.is_empty() {
        defaulted.steps = vec![10, 50, 100];
    }
    if defaulted.step_interval_seconds <= 0 {
        defaulted.step_interval_seconds = 30;
    }
    defaulted
}

#[cfg(test)]
#[path = "state_machine_test.rs"]
mod tests;
