pub mod reconcile;
pub mod routing;
pub mod state_machine;
pub mod validation;

pub use reconcile::{error_policy, reconcile, Context, ReconcileError};
