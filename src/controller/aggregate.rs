//! Readiness aggregation
//!
//! Consults every selected approver in selector order and folds the
//! responses into one [`AggregateResult`]. There is no short-circuit: the
//! result names every blocking approver.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::approver::{Approver, ReadyContext, ReadyResponse};
use crate::config::ControllerConfig;
use crate::crd::CertificateRequestPolicy;
use crate::Error;

/// Combined readiness of all approvers a policy references
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateResult {
    /// True only if every consulted approver is ready (vacuously true)
    pub ready: bool,
    /// One entry per not-ready approver, prefixed with its name, in selector order
    pub messages: Vec<String>,
    /// Names of the not-ready approvers, in selector order
    pub not_ready: Vec<String>,
    /// When to check again; `None` when ready
    pub next_requeue: Option<Duration>,
}

impl AggregateResult {
    /// Result for a policy whose approvers are all ready
    pub fn all_ready() -> Self {
        Self {
            ready: true,
            messages: Vec::new(),
            not_ready: Vec::new(),
            next_requeue: None,
        }
    }
}

/// Invoke `ready` on each approver and combine the responses
pub async fn aggregate(
    approvers: &[Arc<dyn Approver>],
    policy: &CertificateRequestPolicy,
    ctx: &ReadyContext,
    config: &ControllerConfig,
) -> AggregateResult {
    let mut result = AggregateResult::all_ready();
    let mut next_requeue: Option<Duration> = None;

    for approver in approvers {
        let name = approver.name();
        let (message, hint) = match check(approver.as_ref(), policy, ctx, config.ready_timeout).await
        {
            Ok(response) if response.ready => {
                debug!(approver = %name, "approver ready");
                continue;
            }
            Ok(response) => {
                debug!(
                    approver = %name,
                    errors = response.errors.len(),
                    requeue_after = ?response.requeue_after,
                    "approver not ready"
                );
                (not_ready_message(name, &response), response.requeue_after)
            }
            Err(e) => {
                warn!(approver = %name, error = %e, "approver readiness check failed");
                (format!("{}: {}", name, e), None)
            }
        };

        let hint = hint.unwrap_or(config.default_requeue_after);
        next_requeue = Some(next_requeue.map_or(hint, |current| current.min(hint)));

        result.ready = false;
        result.messages.push(message);
        result.not_ready.push(name.to_string());
    }

    result.next_requeue = next_requeue;
    result
}

/// Run one readiness check, bounded by the timeout and the pass's cancellation
async fn check(
    approver: &dyn Approver,
    policy: &CertificateRequestPolicy,
    ctx: &ReadyContext,
    timeout: Duration,
) -> Result<ReadyResponse, Error> {
    tokio::select! {
        biased;
        _ = ctx.cancellation().cancelled() => Err(Error::Cancelled),
        res = tokio::time::timeout(timeout, approver.ready(ctx, policy)) => {
            res.unwrap_or(Err(Error::Timeout(timeout)))
        }
    }
}

fn not_ready_message(name: &str, response: &ReadyResponse) -> String {
    if response.errors.is_empty() {
        return format!("{}: not ready", name);
    }
    let details: Vec<String> = response.errors.iter().map(ToString::to_string).collect();
    format!("{}: {}", name, details.join("; "))
}
