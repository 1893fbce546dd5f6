pub mod backoff;
pub mod clock;
pub mod events;
pub mod rollout;
pub mod telemetry;

pub use rollout::{error_policy, reconcile, Context, ReconcileError};
