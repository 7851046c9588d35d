//! Resolves the approvers a policy activates

use std::sync::Arc;

use crate::approver::Approver;
use crate::crd::CertificateRequestPolicy;
use crate::registry::Registry;
use crate::Error;

/// Approvers referenced by `policy.spec.plugins`, in registration order
///
/// Unreferenced approvers are never returned. A reference to an unregistered
/// name fails with [`Error::UnknownApprover`].
pub fn select(
    registry: &Registry,
    policy: &CertificateRequestPolicy,
) -> Result<Vec<Arc<dyn Approver>>, Error> {
    registry.retrieve(policy.plugin_names())
}
