//! Ambient HTTP/bootstrap surface for the controller binary: health probes,
//! metrics exposition, leader election, and graceful shutdown.

mod health;
mod leader;
mod metrics;
pub mod shutdown;

pub use health::{run_health_server, ReadinessState};
pub use leader::{run_leader_election, LeaderConfig, LeaderState};
pub use metrics::{create_metrics, run_metrics_server, SharedMetrics};
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
