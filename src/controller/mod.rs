//! Readiness reconciliation for CertificateRequestPolicy
//!
//! Follows the observe-diff-act pattern: select the referenced approvers,
//! aggregate their readiness, write the `Ready` condition if it changed, and
//! decide when to look again.

pub mod aggregate;
pub mod condition;
mod policy;
mod runner;
pub mod scheduler;
pub mod selector;

pub use aggregate::{aggregate, AggregateResult};
pub use condition::{
    build_ready_condition, build_unknown_approver_condition, needs_update, write_ready_condition,
    KubePolicyStatusClient, PolicyStatusClient, REASON_NOT_READY, REASON_READY,
    REASON_UNKNOWN_APPROVER,
};
pub use policy::{error_policy, reconcile, Context, ContextBuilder};
pub use runner::build_policy_controller;
pub use scheduler::{schedule, NextStep, ReadinessState, Transition};
pub use selector::select;
