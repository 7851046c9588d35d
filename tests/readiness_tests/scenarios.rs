//! Three registered approvers, every combination the controller must get right
//!
//! Each story registers `test-plugin-1..3` and reconciles a policy that
//! references some of them, then checks what a user would see on the policy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use tokio::time::Instant;

use approver_policy::approver::fake::FakeApprover;
use approver_policy::approver::ReadyResponse;
use approver_policy::controller::{REASON_NOT_READY, REASON_READY};
use approver_policy::crd::ConditionStatus;
use approver_policy::Error;

use super::helpers::*;

/// Reconcile a policy referencing all three approvers, with the given readiness
async fn reconcile_all_three(ready: [bool; 3]) -> (Arc<PolicyStore>, Action) {
    let approvers = [
        approver(A, ready[0]),
        approver(B, ready[1]),
        approver(C, ready[2]),
    ];
    let store = PolicyStore::new(policy_referencing(&[A, B, C]));
    let ctx = context(registry_of(&approvers), &store);

    let action = reconcile_once(&store, &ctx).await.unwrap();
    (store, action)
}

#[tokio::test]
async fn story_all_approvers_ready_marks_policy_ready() {
    let (store, action) = reconcile_all_three([true, true, true]).await;

    let ready = store.ready().unwrap();
    assert_eq!(ready.status, ConditionStatus::True);
    assert_eq!(ready.reason, REASON_READY);
    assert_eq!(ready.observed_generation, Some(1));
    assert_eq!(action, Action::await_change());
}

#[tokio::test]
async fn story_one_approver_not_ready_is_the_only_one_named() {
    let (store, action) = reconcile_all_three([true, true, false]).await;

    let ready = store.ready().unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, REASON_NOT_READY);
    assert!(ready.message.contains(&not_ready_message(C)));
    assert!(!ready.message.contains(A));
    assert!(!ready.message.contains(B));
    assert_eq!(action, default_requeue());
}

#[tokio::test]
async fn story_two_approvers_not_ready_are_both_named_in_order() {
    let (store, _) = reconcile_all_three([true, false, false]).await;

    let ready = store.ready().unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(
        ready.message,
        format!(
            "CertificateRequestPolicy is not ready for approval evaluation: {}, {}",
            not_ready_message(B),
            not_ready_message(C)
        )
    );
    assert!(!ready.message.contains(A));
}

#[tokio::test]
async fn story_no_approver_ready_names_all_three() {
    let (store, _) = reconcile_all_three([false, false, false]).await;

    let ready = store.ready().unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    for name in [A, B, C] {
        assert!(ready.message.contains(&not_ready_message(name)));
    }
}

/// B is registered but fails loudly if anyone asks it anything. The policy
/// only references A and C, so it must still come out ready.
#[tokio::test]
async fn story_unreferenced_approver_is_never_consulted() {
    let a = approver(A, true);
    let b = Arc::new(FakeApprover::new(B).with_ready(|_, policy| {
        Err(Error::approver(format!(
            "consulted for {:?} which does not reference me",
            policy.metadata.name
        )))
    }));
    let c = approver(C, true);

    let store = PolicyStore::new(policy_referencing(&[A, C]));
    let ctx = context(registry_of(&[a.clone(), b.clone(), c.clone()]), &store);

    reconcile_once(&store, &ctx).await.unwrap();

    assert_eq!(store.ready().unwrap().status, ConditionStatus::True);
    assert_eq!(b.calls(), 0);
    assert_eq!(a.calls(), 1);
    assert_eq!(c.calls(), 1);
}

/// B reports not ready with a 100ms hint for its first six checks, then ready.
/// Polling as the runtime would, the policy is seen NotReady first and Ready
/// well inside three seconds.
#[tokio::test(start_paused = true)]
async fn story_slow_approver_converges_to_ready() {
    let checks = Arc::new(AtomicUsize::new(0));
    let b_checks = checks.clone();
    let b = Arc::new(FakeApprover::new(B).with_ready(move |_, _| {
        if b_checks.fetch_add(1, Ordering::SeqCst) < 6 {
            Ok(ReadyResponse::not_ready(vec![]).requeue_after(Duration::from_millis(100)))
        } else {
            Ok(ReadyResponse::ready())
        }
    }));

    let store = PolicyStore::new(policy_referencing(&[A, B, C]));
    let ctx = context(
        registry_of(&[approver(A, true), b, approver(C, true)]),
        &store,
    );

    let started = Instant::now();
    let mut observed_not_ready = false;
    loop {
        let action = reconcile_once(&store, &ctx).await.unwrap();
        match store.ready().map(|c| c.status) {
            Some(ConditionStatus::True) => {
                assert_eq!(action, Action::await_change());
                break;
            }
            Some(ConditionStatus::False) => {
                observed_not_ready = true;
                assert_eq!(action, requeue_ms(100));
            }
            other => panic!("unexpected Ready status {:?}", other),
        }
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "policy did not become ready within 3s"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(observed_not_ready);
    assert_eq!(checks.load(Ordering::SeqCst), 7);
    assert_eq!(
        store.ready_history(),
        vec![ConditionStatus::False, ConditionStatus::True]
    );
}
