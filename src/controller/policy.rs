//! CertificateRequestPolicy readiness reconciler
//!
//! One pass selects the approvers a policy references, asks each whether it
//! is ready, writes the resulting `Ready` condition if it changed, and tells
//! the runtime when to look again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::aggregate::aggregate;
use super::condition::{
    build_ready_condition, build_unknown_approver_condition, write_ready_condition,
    KubePolicyStatusClient, PolicyStatusClient,
};
use super::scheduler::{schedule, schedule_misconfigured, NextStep, ReadinessState, Transition};
use super::selector::select;
use crate::approver::ReadyContext;
use crate::config::ControllerConfig;
use crate::crd::{CertificateRequestPolicy, ConditionStatus};
use crate::registry::Registry;
use crate::Error;

/// Shared state for every reconciliation
///
/// Built once by the composition root; the registry is read-only after that.
pub struct Context {
    /// Approvers available to policies
    pub registry: Arc<Registry>,
    /// Status writer (trait object for testability)
    pub status: Arc<dyn PolicyStatusClient>,
    /// Controller tunables
    pub config: ControllerConfig,
    /// Cancelled when the process shuts down
    pub cancel: CancellationToken,
}

impl Context {
    /// Create a builder for constructing a Context against a live cluster
    pub fn builder(client: Client, registry: Registry) -> ContextBuilder {
        ContextBuilder::new(client, registry)
    }

    /// Create a context from explicit parts
    ///
    /// Used where no API server is available, such as integration tests with
    /// an in-memory status store.
    pub fn new(
        registry: Registry,
        status: Arc<dyn PolicyStatusClient>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            status,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the shutdown token and return self for chaining
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    registry: Registry,
    status: Option<Arc<dyn PolicyStatusClient>>,
    config: ControllerConfig,
    cancel: CancellationToken,
}

impl ContextBuilder {
    fn new(client: Client, registry: Registry) -> Self {
        Self {
            client,
            registry,
            status: None,
            config: ControllerConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the controller tunables
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the shutdown token
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the status client (primarily for testing)
    pub fn status_client(mut self, status: Arc<dyn PolicyStatusClient>) -> Self {
        self.status = Some(status);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            registry: Arc::new(self.registry),
            status: self
                .status
                .unwrap_or_else(|| Arc::new(KubePolicyStatusClient::new(self.client.clone()))),
            config: self.config,
            cancel: self.cancel,
        }
    }
}

/// Reconcile a CertificateRequestPolicy
///
/// Misconfigured policies (unknown approvers) are reported on the condition
/// and are not errors. Errors are returned for failed status writes and for
/// passes aborted by shutdown, in which case nothing is written.
#[instrument(skip(policy, ctx), fields(policy = %policy.name_any()))]
pub async fn reconcile(
    policy: Arc<CertificateRequestPolicy>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    reconcile_policy(&policy, &ctx, Utc::now())
        .await
        .map(Action::from)
}

async fn reconcile_policy(
    policy: &CertificateRequestPolicy,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<NextStep, Error> {
    let generation = policy.metadata.generation;
    let existing = policy.ready_condition();
    let from = ReadinessState::observe(policy);

    let (desired, step, blocking) = match select(&ctx.registry, policy) {
        Ok(approvers) => {
            debug!(approvers = approvers.len(), "evaluating approver readiness");
            let ready_ctx = ReadyContext::new(ctx.cancel.child_token());
            let result = aggregate(&approvers, policy, &ready_ctx, &ctx.config).await;
            if ready_ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }
            (
                build_ready_condition(&result, generation, existing, now),
                schedule(&result, &ctx.config),
                result.not_ready,
            )
        }
        Err(Error::UnknownApprover { names }) => {
            warn!(unknown = ?names, "policy references unregistered approvers");
            (
                build_unknown_approver_condition(&names, generation, existing, now),
                schedule_misconfigured(&ctx.config),
                names,
            )
        }
        Err(e) => return Err(e),
    };

    let transition = Transition {
        from,
        to: ReadinessState::from_ready(desired.status == ConditionStatus::True),
    };
    let reason = desired.reason.clone();

    if write_ready_condition(ctx.status.as_ref(), policy, desired).await? {
        if transition.is_self_loop() {
            debug!(
                state = %transition.to,
                reason = %reason,
                blocking = ?blocking,
                "updated Ready condition"
            );
        } else {
            info!(
                from = %transition.from,
                to = %transition.to,
                reason = %reason,
                blocking = ?blocking,
                "policy readiness changed"
            );
        }
    }

    Ok(step)
}

/// Error policy for the controller
///
/// Status write conflicts mean the policy moved on; retry immediately
/// against the newer object. A shutdown abort is not retried.
pub fn error_policy(
    policy: Arc<CertificateRequestPolicy>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    if error.is_conflict() {
        // Zero delay is bounded: the runtime dedupes this with the watch event
        // for the newer version, and the resourceVersion precondition keeps a
        // stale pass from ever writing.
        debug!(policy = %policy.name_any(), "status write conflicted, retrying");
        return Action::requeue(Duration::ZERO);
    }
    if matches!(error, Error::Cancelled) {
        debug!(policy = %policy.name_any(), "reconciliation cancelled");
        return Action::await_change();
    }

    error!(
        ?error,
        policy = %policy.name_any(),
        "reconciliation failed"
    );
    Action::requeue(ctx.config.clamp_requeue(ctx.config.default_requeue_after))
}
