//! Convergence scheduling
//!
//! Per-policy readiness state machine (`Unknown → Ready | NotReady`,
//! `Ready ⇄ NotReady`) and the decision of when to look at a policy again.
//! Requeues are deferred re-submissions through the controller runtime;
//! nothing here sleeps.

use std::fmt;
use std::time::Duration;

use kube::runtime::controller::Action;

use super::aggregate::AggregateResult;
use crate::config::ControllerConfig;
use crate::crd::{CertificateRequestPolicy, ConditionStatus};

/// Readiness state of a policy as seen by this controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadinessState {
    /// No authoritative condition for the current generation
    Unknown,
    /// All referenced approvers are ready
    Ready,
    /// At least one referenced approver is not ready, or the policy is misconfigured
    NotReady,
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Ready => write!(f, "Ready"),
            Self::NotReady => write!(f, "NotReady"),
        }
    }
}

impl ReadinessState {
    /// Current state from the persisted condition
    ///
    /// A condition computed for another generation is stale and reads as Unknown.
    pub fn observe(policy: &CertificateRequestPolicy) -> Self {
        match policy.ready_condition() {
            Some(cond) if cond.is_current(policy.metadata.generation) => match cond.status {
                ConditionStatus::True => Self::Ready,
                ConditionStatus::False => Self::NotReady,
                ConditionStatus::Unknown => Self::Unknown,
            },
            _ => Self::Unknown,
        }
    }

    /// State implied by an aggregation outcome
    pub fn from_ready(ready: bool) -> Self {
        if ready {
            Self::Ready
        } else {
            Self::NotReady
        }
    }
}

/// Observed state change for one pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// State before this pass
    pub from: ReadinessState,
    /// State after this pass
    pub to: ReadinessState,
}

impl Transition {
    /// Returns true if the state stayed the same
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// What the controller does after a pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NextStep {
    /// Delay before the next forced pass; `None` waits for a watch event
    pub requeue_after: Option<Duration>,
}

impl NextStep {
    /// Wait for the next change notification
    pub fn await_change() -> Self {
        Self {
            requeue_after: None,
        }
    }

    /// Re-submit after `after`
    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

impl From<NextStep> for Action {
    fn from(step: NextStep) -> Self {
        match step.requeue_after {
            Some(after) => Action::requeue(after),
            None => Action::await_change(),
        }
    }
}

/// Decide when to reconcile a policy again after aggregation
///
/// Ready policies are not requeued. Not-ready ones come back after the
/// smallest approver hint, or the configured default, bounded on both sides.
pub fn schedule(result: &AggregateResult, config: &ControllerConfig) -> NextStep {
    if result.ready {
        return NextStep::await_change();
    }
    let after = result.next_requeue.unwrap_or(config.default_requeue_after);
    NextStep::requeue(config.clamp_requeue(after))
}

/// Requeue for a policy that references unregistered approvers
pub fn schedule_misconfigured(config: &ControllerConfig) -> NextStep {
    NextStep::requeue(config.clamp_requeue(config.default_requeue_after))
}
