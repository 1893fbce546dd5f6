//! Lease-based leader election, gated by `--leader-elect`.
//!
//! When disabled, the process always considers itself the leader (single
//! instance mode). When enabled, at most one replica holds the
//! `coordination.k8s.io/v1` `Lease` at a time; followers poll and take over
//! once the lease expires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use kube::api::{Api, Patch, PatchParams, PostParams};
use tracing::{info, warn};

use super::shutdown::ShutdownSignal;

const LEASE_DURATION_SECONDS: i32 = 15;
const RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Shared flag read by `Context::should_reconcile`.
#[derive(Clone)]
pub struct LeaderState {
    is_leader: Arc<AtomicBool>,
}

impl LeaderState {
    pub fn new() -> Self {
        Self {
            is_leader: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_leader(&self, leader: bool) {
        self.is_leader.store(leader, Ordering::SeqCst);
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }
}

impl Default for LeaderState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LeaderConfig {
    pub lease_name: String,
    pub namespace: String,
    pub holder_id: String,
}

impl LeaderConfig {
    /// Builds a config from the pod's own identity, falling back to
    /// sensible single-replica defaults when the downward API env vars
    /// aren't present (e.g. running outside Kubernetes).
    pub fn from_env() -> Self {
        let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_string());
        let holder_id = std::env::var("POD_NAME").unwrap_or_else(|_| {
            format!("canary-rollout-controller-{}", std::process::id())
        });

        Self {
            lease_name: "canary-rollout-controller-leader".to_string(),
            namespace,
            holder_id,
        }
    }
}

/// Runs the lease acquire/renew loop until `shutdown` fires. Intended to be
/// spawned as its own task; `state` is shared with the reconciler via
/// `Context`.
pub async fn run_leader_election(
    client: kube::Client,
    config: LeaderConfig,
    state: LeaderState,
    mut shutdown: ShutdownSignal,
) {
    let leases: Api<Lease> = Api::namespaced(client, &config.namespace);

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                info!(holder = %config.holder_id, "leader election stopping on shutdown");
                return;
            }
            result = try_acquire_or_renew(&leases, &config) => {
                match result {
                    Ok(acquired) => {
                        if acquired != state.is_leader() {
                            info!(holder = %config.holder_id, leader = acquired, "leadership status changed");
                        }
                        state.set_leader(acquired);
                    }
                    Err(err) => {
                        warn!(error = %err, "leader election lease operation failed");
                        state.set_leader(false);
                    }
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(RENEW_INTERVAL) => {}
            _ = shutdown.wait() => {
                info!(holder = %config.holder_id, "leader election stopping on shutdown");
                return;
            }
        }
    }
}

async fn try_acquire_or_renew(leases: &Api<Lease>, config: &LeaderConfig) -> Result<bool, kube::Error> {
    let now = Utc::now();

    match leases.get(&config.lease_name).await {
        Ok(lease) => {
            let spec = lease.spec.unwrap_or_default();
            let held_by_us = spec.holder_identity.as_deref() == Some(config.holder_id.as_str());
            let expired = spec
                .renew_time
                .map(|t| {
                    let elapsed = now.signed_duration_since(t.0);
                    elapsed.num_seconds() > spec.lease_duration_seconds.unwrap_or(LEASE_DURATION_SECONDS) as i64
                })
                .unwrap_or(true);

            if held_by_us || expired {
                let patch = serde_json::json!({
                    "spec": {
                        "holderIdentity": config.holder_id,
                        "leaseDurationSeconds": LEASE_DURATION_SECONDS,
                        "renewTime": now.to_rfc3339(),
                    }
                });
                leases
                    .patch(
                        &config.lease_name,
                        &PatchParams::apply("canary-rollout-controller"),
                        &Patch::Merge(&patch),
                    )
                    .await?;
                Ok(true)
            } else {
                Ok(false)
            }
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            let lease = Lease {
                metadata: kube::api::ObjectMeta {
                    name: Some(config.lease_name.clone()),
                    ..Default::default()
                },
                spec: Some(LeaseSpec {
                    holder_identity: Some(config.holder_id.clone()),
                    lease_duration_seconds: Some(LEASE_DURATION_SECONDS),
                    renew_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime(now)),
                    ..Default::default()
                }),
            };
            match leases.create(&PostParams::default(), &lease).await {
                Ok(_) => Ok(true),
                Err(kube::Error::Api(err)) if err.code == 409 => Ok(false),
                Err(err) => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_leader_state_starts_as_follower() {
        let state = LeaderState::new();
        assert!(!state.is_leader());
    }

    #[test]
    fn leader_state_reflects_latest_set_call() {
        let state = LeaderState::new();
        state.set_leader(true);
        assert!(state.is_leader());
        state.set_leader(false);
        assert!(!state.is_leader());
    }

    #[test]
    fn leader_config_from_env_falls_back_when_downward_api_env_missing() {
        std::env::remove_var("POD_NAMESPACE");
        std::env::remove_var("POD_NAME");
        let config = LeaderConfig::from_env();
        assert_eq!(config.namespace, "default");
        assert!(config.holder_id.starts_with("canary-rollout-controller-"));
    }
}
