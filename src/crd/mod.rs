//! Custom Resource Definitions for approver-policy
//!
//! This module contains the CertificateRequestPolicy CRD and the condition
//! types stored in its status.

mod policy;
mod types;

pub use policy::{
    CertificateRequestPolicy, CertificateRequestPolicySelector, CertificateRequestPolicySpec,
    CertificateRequestPolicyStatus, IssuerRefSelector, NamespaceSelector, PluginData,
};
pub use types::{
    find_condition, set_condition, Condition, ConditionStatus, CONDITION_TYPE_READY,
};
