//! CertificateRequestPolicy Custom Resource Definition
//!
//! A CertificateRequestPolicy selects certificate requests and names the
//! approvers that govern them. This controller only owns the `Ready`
//! condition in its status.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{find_condition, Condition, CONDITION_TYPE_READY};

/// Specification for a CertificateRequestPolicy
///
/// Example:
/// ```yaml
/// apiVersion: policy.cert-manager.io/v1alpha1
/// kind: CertificateRequestPolicy
/// metadata:
///   name: internal-ca
/// spec:
///   selector:
///     issuerRef:
///       name: internal-*
///       kind: ClusterIssuer
///   plugins:
///     constraints:
///       values:
///         maxDuration: 720h
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "policy.cert-manager.io",
    version = "v1alpha1",
    kind = "CertificateRequestPolicy",
    plural = "certificaterequestpolicies",
    shortname = "crp",
    status = "CertificateRequestPolicyStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestPolicySpec {
    /// Which certificate requests this policy applies to
    #[serde(default)]
    pub selector: CertificateRequestPolicySelector,

    /// Approvers activated by this policy, keyed by approver name
    ///
    /// The value is opaque configuration handed to that approver.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugins: BTreeMap<String, PluginData>,
}

/// Request-matching criteria
///
/// Evaluated at admission time; the readiness controller never inspects it.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestPolicySelector {
    /// Match requests by the issuer they reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_ref: Option<IssuerRefSelector>,

    /// Match requests by the namespace they are created in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<NamespaceSelector>,
}

/// Issuer reference match; each field is a wildcard pattern
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRefSelector {
    /// Issuer name pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Issuer kind pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Issuer group pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Namespace match
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    /// Namespace name patterns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_names: Vec<String>,

    /// Namespace label selector
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

/// Opaque per-approver configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PluginData {
    /// Free-form key/value configuration interpreted by the approver
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
}

/// Status for a CertificateRequestPolicy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestPolicyStatus {
    /// Conditions representing the policy state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl CertificateRequestPolicy {
    /// Names of the approvers this policy references
    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.spec.plugins.keys().map(String::as_str)
    }

    /// The persisted Ready condition, if any
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| find_condition(&s.conditions, CONDITION_TYPE_READY))
    }
}
