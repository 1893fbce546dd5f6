//! Progressive delivery controller for weighted canary traffic shifting.
//!
//! The reconciliation state machine (`controller::rollout::state_machine`) is the
//! core of this crate: a pure function from observed spec/status/telemetry to a
//! single next action. Everything else — the Kubernetes client plumbing, the
//! telemetry HTTP client, the routing writer, the health/metrics server — is the
//! ambient stack that hosts it.

pub mod crd;
pub mod controller;
pub mod server;
