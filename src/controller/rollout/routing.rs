//! Writes canary weight annotations onto the two routing handles.
//!
//! Routing handles are plain `v1.Service` objects; a mesh, ingress, or
//! sidecar outside this codebase is assumed to read the annotation this
//! module writes and actually move traffic.

use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use thiserror::Error;

use crate::crd::rollout::Rollout;

pub const WEIGHT_ANNOTATION: &str = "canary.example.io/weight";

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing handle operation failed, will retry: {0}")]
    Transient(#[source] kube::Error),

    #[error("routing handle operation failed permanently: {0}")]
    Fatal(#[source] kube::Error),
}

impl RoutingError {
    fn from_kube(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 401 || resp.code == 403 || resp.code == 422 => {
                RoutingError::Fatal(err)
            }
            _ => RoutingError::Transient(err),
        }
    }
}

/// Writes `stable_weight` and `canary_weight` onto the spec's two routing
/// handles. Skips a handle whose name is empty. Callers must ensure
/// `stable_weight + canary_weight == 100`.
pub async fn apply_weights(
    client: kube::Client,
    rollout: &Rollout,
    namespace: &str,
    stable_handle: &str,
    canary_handle: &str,
    stable_weight: i32,
    canary_weight: i32,
) -> Result<(), RoutingError> {
    let services: Api<Service> = Api::namespaced(client, namespace);

    patch_handle(&services, rollout, stable_handle, stable_weight).await?;
    patch_handle(&services, rollout, canary_handle, canary_weight).await?;

    Ok(())
}

async fn patch_handle(
    services: &Api<Service>,
    rollout: &Rollout,
    name: &str,
    weight: i32,
) -> Result<(), RoutingError> {
    if name.is_empty() {
        return Ok(());
    }

    let existing = services
        .get(name)
        .await
        .map_err(RoutingError::from_kube)?;

    let owned_already = existing
        .meta()
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.uid == rollout.uid().unwrap_or_default()));

    let mut patch = serde_json::json!({
        "metadata": {
            "annotations": {
                WEIGHT_ANNOTATION: weight.to_string(),
            }
        }
    });

    if !owned_already {
        if let Ok(owner_ref) = controller_owner_reference(rollout) {
            patch["metadata"]["ownerReferences"] = serde_json::json!([owner_ref]);
        }
    }

    services
        .patch(name, &PatchParams::apply("canary-rollout-controller"), &Patch::Merge(&patch))
        .await
        .map_err(RoutingError::from_kube)?;

    Ok(())
}

fn controller_owner_reference(
    rollout: &Rollout,
) -> Result<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference, ()> {
    let uid = rollout.uid().ok_or(())?;
    Ok(k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
        api_version: "canary.example.io/v1alpha1".to_string(),
        kind: "Rollout".to_string(),
        name: rollout.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_annotation_key_matches_documented_contract() {
        assert_eq!(WEIGHT_ANNOTATION, "canary.example.io/weight");
    }

    #[test]
    fn owner_reference_is_none_without_uid() {
        let rollout = Rollout::new("payments", Default::default());
        assert!(controller_owner_reference(&rollout).is_err());
    }
}
