//! Kubernetes Event emission for rollout lifecycle transitions.
//!
//! Replaces ad-hoc event sinks with the standard `kube::runtime::events`
//! recorder so `kubectl describe rollout` shows the same history an operator
//! would expect from any core controller.

use kube::runtime::events::{Event, EventType, Recorder};

/// Reasons emitted by the reconciler. Kept small and stable since they are
/// part of the observable contract for anyone watching Events.
pub enum RolloutEvent<'a> {
    /// A step advanced or the rollout reached 100%.
    Progress(&'a str),
    /// SLO breach triggered a rollback to 0%.
    Rollback(&'a str),
    /// Unrecoverable validation or configuration error.
    Fatal(&'a str),
    /// Telemetry query failed; reconcile will retry.
    PromQueryError(&'a str),
}

impl<'a> RolloutEvent<'a> {
    fn into_event(self) -> Event {
        match self {
            RolloutEvent::Progress(msg) => Event {
                type_: EventType::Normal,
                reason: "Progress".into(),
                note: Some(msg.to_string()),
                action: "Reconcile".into(),
                secondary: None,
            },
            RolloutEvent::Rollback(msg) => Event {
                type_: EventType::Warning,
                reason: "Rollback".into(),
                note: Some(msg.to_string()),
                action: "Reconcile".into(),
                secondary: None,
            },
            RolloutEvent::Fatal(msg) => Event {
                type_: EventType::Warning,
                reason: "Fatal".into(),
                note: Some(msg.to_string()),
                action: "Reconcile".into(),
                secondary: None,
            },
            RolloutEvent::PromQueryError(msg) => Event {
                type_: EventType::Warning,
                reason: "PromQueryError".into(),
                note: Some(msg.to_string()),
                action: "Reconcile".into(),
                secondary: None,
            },
        }
    }
}

/// Publishes a rollout event through a recorder already bound to the
/// rollout's object reference.
///
/// Errors are logged, never propagated: a failure to record an event must
/// never fail or retry a reconcile.
pub async fn publish(recorder: &Recorder, event: RolloutEvent<'_>) {
    if let Err(err) = recorder.publish(&event.into_event()).await {
        tracing::warn!(error = %err, "failed to publish rollout event");
    }
}
