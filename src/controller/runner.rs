//! Controller wiring
//!
//! Builds the kube-runtime controller future for CertificateRequestPolicy.
//! The runtime supplies per-object exclusion, the bounded worker pool and
//! the requeue timers; this module only connects them to [`reconcile`].

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::Config as ControllerRuntimeConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use tracing::info;

use super::policy::{error_policy, reconcile, Context};
use crate::crd::CertificateRequestPolicy;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// so the API server closes idle watches before the client gives up on them.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the policy readiness controller
///
/// The returned future completes once `ctx.cancel` fires and in-flight
/// reconciliations have drained. Pending requeues are dropped.
pub fn build_policy_controller(client: Client, ctx: Arc<Context>) -> impl Future<Output = ()> {
    let policies: Api<CertificateRequestPolicy> = Api::all(client);
    let workers = ctx.config.workers;
    let shutdown = ctx.cancel.clone().cancelled_owned();

    info!(workers, "starting CertificateRequestPolicy controller");

    Controller::new(policies, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .with_config(ControllerRuntimeConfig::default().concurrency(workers))
        .graceful_shutdown_on(shutdown)
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("CertificateRequestPolicy"))
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::warn!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
