//! Behaviour that holds for every policy, whatever its approvers say

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;

use approver_policy::approver::fake::FakeApprover;
use approver_policy::approver::{builtin, Approver, ReadyContext, ReadyResponse};
use approver_policy::config::ControllerConfig;
use approver_policy::controller::{error_policy, reconcile, Context, PolicyStatusClient};
use approver_policy::controller::{REASON_NOT_READY, REASON_UNKNOWN_APPROVER};
use approver_policy::crd::{CertificateRequestPolicy, ConditionStatus, PluginData};
use approver_policy::registry::Registry;
use approver_policy::Error;

use super::helpers::*;

// =============================================================================
// Aggregation
// =============================================================================

#[tokio::test]
async fn condition_names_exactly_the_not_ready_approvers() {
    let names = [A, B, C];
    for mask in 0u8..8 {
        let ready = [mask & 1 != 0, mask & 2 != 0, mask & 4 != 0];
        let approvers: Vec<_> = names
            .iter()
            .zip(ready)
            .map(|(name, r)| approver(name, r))
            .collect();
        let store = PolicyStore::new(policy_referencing(&names));
        let ctx = context(registry_of(&approvers), &store);

        reconcile_once(&store, &ctx).await.unwrap();

        let cond = store.ready().unwrap();
        let all_ready = ready.iter().all(|r| *r);
        assert_eq!(cond.status == ConditionStatus::True, all_ready, "mask {mask}");
        for (name, r) in names.iter().zip(ready) {
            assert_eq!(
                cond.message.contains(&not_ready_message(name)),
                !r,
                "mask {mask}, approver {name}"
            );
        }
    }
}

#[tokio::test]
async fn policy_without_plugins_is_ready() {
    let store = PolicyStore::new(policy_referencing(&[]));
    let ctx = context(registry_of(&[approver(A, false)]), &store);

    let action = reconcile_once(&store, &ctx).await.unwrap();

    assert_eq!(store.ready().unwrap().status, ConditionStatus::True);
    assert_eq!(action, Action::await_change());
}

#[tokio::test]
async fn builtin_approvers_are_always_ready() {
    let registry = Registry::new().store(builtin::approvers()).unwrap();
    let store = PolicyStore::new(policy_referencing(&[
        builtin::ALLOWED,
        builtin::CONSTRAINTS,
    ]));
    let ctx = context(registry, &store);

    reconcile_once(&store, &ctx).await.unwrap();

    assert_eq!(store.ready().unwrap().status, ConditionStatus::True);
}

// =============================================================================
// Approver faults
// =============================================================================

/// Never answers; only the readiness deadline ends the check
struct Unresponsive;

#[async_trait]
impl Approver for Unresponsive {
    fn name(&self) -> &str {
        B
    }

    async fn ready(
        &self,
        _ctx: &ReadyContext,
        _policy: &CertificateRequestPolicy,
    ) -> Result<ReadyResponse, Error> {
        futures::future::pending().await
    }
}

#[tokio::test]
async fn failing_approver_is_named_with_its_error_text() {
    let b = Arc::new(
        FakeApprover::new(B).with_ready(|_, _| Err(Error::approver("vault unreachable"))),
    );
    let store = PolicyStore::new(policy_referencing(&[A, B]));
    let ctx = context(registry_of(&[approver(A, true), b]), &store);

    let action = reconcile_once(&store, &ctx).await.unwrap();

    let cond = store.ready().unwrap();
    assert_eq!(cond.status, ConditionStatus::False);
    assert_eq!(cond.reason, REASON_NOT_READY);
    assert!(cond.message.contains(&format!("[{}: vault unreachable]", B)));
    assert!(!cond.message.contains(A));
    assert_eq!(action, default_requeue());
}

#[tokio::test(start_paused = true)]
async fn unresponsive_approver_times_out_as_not_ready() {
    let approvers = vec![
        approver(A, true) as Arc<dyn Approver>,
        Arc::new(Unresponsive) as Arc<dyn Approver>,
    ];
    let registry = Registry::new().store(approvers).unwrap();
    let store = PolicyStore::new(policy_referencing(&[A, B]));
    let status: Arc<dyn PolicyStatusClient> = store.clone();
    let config = ControllerConfig {
        ready_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let ctx = Arc::new(Context::new(registry, status, config));

    let action = reconcile_once(&store, &ctx).await.unwrap();

    let cond = store.ready().unwrap();
    assert_eq!(cond.status, ConditionStatus::False);
    assert_eq!(cond.reason, REASON_NOT_READY);
    assert!(cond.message.contains(&format!("[{}: ", B)));
    assert!(cond.message.contains("timed out"));
    assert_eq!(action, default_requeue());
}

// =============================================================================
// Selection isolation
// =============================================================================

#[tokio::test]
async fn unreferenced_approver_stays_untouched_across_passes() {
    let a = approver(A, true);
    let b = approver(B, false);
    let c = approver(C, false);
    let store = PolicyStore::new(policy_referencing(&[A, C]));
    let ctx = context(registry_of(&[a.clone(), b.clone(), c.clone()]), &store);

    for _ in 0..5 {
        reconcile_once(&store, &ctx).await.unwrap();
    }

    assert_eq!(b.calls(), 0);
    assert_eq!(a.calls(), 5);
    assert_eq!(c.calls(), 5);
}

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn repeated_passes_with_unchanged_inputs_do_not_write() {
    let store = PolicyStore::new(policy_referencing(&[A, B]));
    let ctx = context(registry_of(&[approver(A, true), approver(B, false)]), &store);

    let first = reconcile_once(&store, &ctx).await.unwrap();
    assert_eq!(store.writes(), 1);
    let written = store.ready().unwrap();

    for _ in 0..3 {
        let again = reconcile_once(&store, &ctx).await.unwrap();
        assert_eq!(again, first);
    }

    assert_eq!(store.writes(), 1);
    assert_eq!(store.ready().unwrap(), written);
}

#[tokio::test]
async fn flip_to_ready_keeps_one_write_per_transition() {
    let b = approver(B, false);
    let store = PolicyStore::new(policy_referencing(&[A, B]));
    let ctx = context(registry_of(&[approver(A, true), b.clone()]), &store);

    reconcile_once(&store, &ctx).await.unwrap();
    reconcile_once(&store, &ctx).await.unwrap();
    b.set_ready(|_, _| Ok(ReadyResponse::ready()));
    reconcile_once(&store, &ctx).await.unwrap();
    reconcile_once(&store, &ctx).await.unwrap();

    assert_eq!(
        store.ready_history(),
        vec![ConditionStatus::False, ConditionStatus::True]
    );
}

#[tokio::test]
async fn transition_time_only_moves_when_status_changes() {
    let b = approver(B, false);
    let store = PolicyStore::new(policy_referencing(&[A, B]));
    let ctx = context(registry_of(&[approver(A, true), b.clone()]), &store);

    reconcile_once(&store, &ctx).await.unwrap();
    let first = store.ready().unwrap().last_transition_time;

    // Different message, same status
    b.set_ready(|_, _| {
        Ok(ReadyResponse::not_ready(vec![
            approver_policy::approver::FieldError::required("spec.plugins", "still loading"),
        ]))
    });
    reconcile_once(&store, &ctx).await.unwrap();

    let cond = store.ready().unwrap();
    assert_eq!(store.writes(), 2);
    assert!(cond.message.contains("still loading"));
    assert_eq!(cond.last_transition_time, first);
}

// =============================================================================
// Generations and configuration changes
// =============================================================================

#[tokio::test]
async fn spec_edit_refreshes_observed_generation() {
    let store = PolicyStore::new(policy_referencing(&[A]));
    let ctx = context(registry_of(&[approver(A, true)]), &store);

    reconcile_once(&store, &ctx).await.unwrap();
    store.edit_spec(|spec| {
        if let Some(plugin) = spec.plugins.get_mut(A) {
            plugin.values.insert("mode".to_string(), "strict".to_string());
        }
    });
    reconcile_once(&store, &ctx).await.unwrap();

    assert_eq!(store.writes(), 2);
    assert_eq!(store.ready().unwrap().observed_generation, Some(2));
    assert_eq!(store.ready().unwrap().status, ConditionStatus::True);
}

#[tokio::test]
async fn unknown_approver_is_reported_until_the_policy_is_fixed() {
    let store = PolicyStore::new(policy_referencing(&[A, "vault"]));
    let ctx = context(registry_of(&[approver(A, true)]), &store);

    let action = reconcile_once(&store, &ctx).await.unwrap();
    let cond = store.ready().unwrap();
    assert_eq!(cond.status, ConditionStatus::False);
    assert_eq!(cond.reason, REASON_UNKNOWN_APPROVER);
    assert!(cond.message.contains("vault"));
    assert_eq!(action, default_requeue());

    store.edit_spec(|spec| {
        spec.plugins.remove("vault");
    });
    reconcile_once(&store, &ctx).await.unwrap();

    assert_eq!(store.ready().unwrap().status, ConditionStatus::True);
}

#[tokio::test]
async fn new_reference_to_not_ready_approver_flips_back() {
    let store = PolicyStore::new(policy_referencing(&[A]));
    let ctx = context(registry_of(&[approver(A, true), approver(B, false)]), &store);

    reconcile_once(&store, &ctx).await.unwrap();
    store.edit_spec(|spec| {
        spec.plugins.insert(B.to_string(), PluginData::default());
    });
    reconcile_once(&store, &ctx).await.unwrap();

    let cond = store.ready().unwrap();
    assert_eq!(cond.reason, REASON_NOT_READY);
    assert!(cond.message.contains(&not_ready_message(B)));
}

// =============================================================================
// Concurrency with writers and shutdown
// =============================================================================

#[tokio::test]
async fn stale_snapshot_write_is_rejected_and_retried_immediately() {
    let store = PolicyStore::new(policy_referencing(&[A]));
    let ctx = context(registry_of(&[approver(A, true)]), &store);

    let stale = store.current();
    store.edit_spec(|spec| {
        spec.plugins.insert(B.to_string(), PluginData::default());
    });

    let err = reconcile(stale.clone(), ctx.clone()).await.err().unwrap();
    assert!(err.is_conflict());
    assert_eq!(store.writes(), 0);
    assert_eq!(
        error_policy(stale, &err, ctx),
        Action::requeue(Duration::ZERO)
    );
}

#[tokio::test]
async fn shutdown_abandons_the_pass_without_writing() {
    let store = PolicyStore::new(policy_referencing(&[A]));
    let cancel = CancellationToken::new();
    let status: Arc<dyn PolicyStatusClient> = store.clone();
    let ctx = Arc::new(
        Context::new(
            registry_of(&[approver(A, true)]),
            status,
            ControllerConfig::default(),
        )
        .with_cancellation(cancel.clone()),
    );

    cancel.cancel();
    let result = reconcile_once(&store, &ctx).await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(store.writes(), 0);
    assert_eq!(error_policy(store.current(), &Error::Cancelled, ctx), Action::await_change());
}
