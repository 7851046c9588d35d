//! Ready condition writer
//!
//! Turns an aggregation outcome into the policy's `Ready` condition and
//! persists it only when something a reader would see has changed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use super::aggregate::AggregateResult;
use crate::crd::{
    set_condition, CertificateRequestPolicy, CertificateRequestPolicyStatus, Condition,
    ConditionStatus, CONDITION_TYPE_READY,
};
use crate::{Error, FIELD_MANAGER};

/// Reason when every referenced approver is ready
pub const REASON_READY: &str = "Ready";

/// Reason when at least one referenced approver is not ready
pub const REASON_NOT_READY: &str = "NotReady";

/// Reason when the policy references approvers that are not registered
pub const REASON_UNKNOWN_APPROVER: &str = "UnknownApprover";

const READY_MESSAGE: &str = "CertificateRequestPolicy is ready for approval evaluation";

/// Trait abstracting status writes for CertificateRequestPolicy
///
/// Lets tests observe and fail writes without an API server.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PolicyStatusClient: Send + Sync {
    /// Replace the policy status
    ///
    /// `resource_version` is the version the status was derived from; the
    /// write must fail with a conflict if the object has moved on since.
    async fn patch_status(
        &self,
        name: &str,
        resource_version: Option<String>,
        status: &CertificateRequestPolicyStatus,
    ) -> Result<(), Error>;
}

/// Status client backed by the Kubernetes API
pub struct KubePolicyStatusClient {
    client: Client,
}

impl KubePolicyStatusClient {
    /// Create a new client wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PolicyStatusClient for KubePolicyStatusClient {
    async fn patch_status(
        &self,
        name: &str,
        resource_version: Option<String>,
        status: &CertificateRequestPolicyStatus,
    ) -> Result<(), Error> {
        let api: Api<CertificateRequestPolicy> = Api::all(self.client.clone());

        // resourceVersion in a merge patch is a precondition: the API server
        // answers 409 if the object changed after we read it.
        let mut patch = serde_json::json!({ "status": status });
        if let Some(rv) = resource_version {
            patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
        }

        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Condition for a completed aggregation
///
/// `lastTransitionTime` is kept from `existing` when the status is unchanged.
pub fn build_ready_condition(
    result: &AggregateResult,
    generation: Option<i64>,
    existing: Option<&Condition>,
    now: DateTime<Utc>,
) -> Condition {
    if result.ready {
        make_condition(ConditionStatus::True, REASON_READY, READY_MESSAGE, generation, existing, now)
    } else {
        let detail: Vec<String> = result.messages.iter().map(|m| format!("[{}]", m)).collect();
        let message = format!(
            "CertificateRequestPolicy is not ready for approval evaluation: {}",
            detail.join(", ")
        );
        make_condition(ConditionStatus::False, REASON_NOT_READY, message, generation, existing, now)
    }
}

/// Condition for a policy that references unregistered approvers
pub fn build_unknown_approver_condition(
    names: &[String],
    generation: Option<i64>,
    existing: Option<&Condition>,
    now: DateTime<Utc>,
) -> Condition {
    let message = format!(
        "CertificateRequestPolicy references unknown approvers: {}",
        names.join(", ")
    );
    make_condition(
        ConditionStatus::False,
        REASON_UNKNOWN_APPROVER,
        message,
        generation,
        existing,
        now,
    )
}

fn make_condition(
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
    generation: Option<i64>,
    existing: Option<&Condition>,
    now: DateTime<Utc>,
) -> Condition {
    let last_transition_time = match existing {
        Some(prev) if prev.status == status => prev.last_transition_time,
        _ => now,
    };
    Condition {
        type_: CONDITION_TYPE_READY.to_string(),
        status,
        reason: reason.to_string(),
        message: message.into(),
        observed_generation: generation,
        last_transition_time,
    }
}

/// Returns true if `desired` must be written over `existing`
///
/// A write is needed when status, reason or message differ, or when the
/// persisted condition was computed for another generation.
pub fn needs_update(existing: Option<&Condition>, desired: &Condition, generation: Option<i64>) -> bool {
    match existing {
        None => true,
        Some(cur) => {
            cur.status != desired.status
                || cur.reason != desired.reason
                || cur.message != desired.message
                || !cur.is_current(generation)
        }
    }
}

/// Persist `desired` as the policy's Ready condition if it changed
///
/// Returns whether a write was issued. Other conditions are preserved.
pub async fn write_ready_condition(
    client: &dyn PolicyStatusClient,
    policy: &CertificateRequestPolicy,
    desired: Condition,
) -> Result<bool, Error> {
    let generation = policy.metadata.generation;
    if !needs_update(policy.ready_condition(), &desired, generation) {
        debug!(policy = %policy.name_any(), "Ready condition unchanged, skipping update");
        return Ok(false);
    }

    let mut status = policy.status.clone().unwrap_or_default();
    set_condition(&mut status.conditions, desired);

    client
        .patch_status(&policy.name_any(), policy.resource_version(), &status)
        .await?;
    Ok(true)
}
