//! Approvers compiled into the controller binary
//!
//! `allowed` and `constraints` evaluate requests purely from the policy spec
//! at admission time, so they never have external state to wait for.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Approver, ReadyContext, ReadyResponse};
use crate::crd::CertificateRequestPolicy;
use crate::Error;

/// Name of the allowed-fields approver
pub const ALLOWED: &str = "allowed";

/// Name of the constraints approver
pub const CONSTRAINTS: &str = "constraints";

/// Approver restricting which request fields may be set
#[derive(Clone, Copy, Debug, Default)]
pub struct Allowed;

#[async_trait]
impl Approver for Allowed {
    fn name(&self) -> &str {
        ALLOWED
    }

    async fn ready(
        &self,
        _ctx: &ReadyContext,
        _policy: &CertificateRequestPolicy,
    ) -> Result<ReadyResponse, Error> {
        Ok(ReadyResponse::ready())
    }
}

/// Approver enforcing duration and key constraints
#[derive(Clone, Copy, Debug, Default)]
pub struct Constraints;

#[async_trait]
impl Approver for Constraints {
    fn name(&self) -> &str {
        CONSTRAINTS
    }

    async fn ready(
        &self,
        _ctx: &ReadyContext,
        _policy: &CertificateRequestPolicy,
    ) -> Result<ReadyResponse, Error> {
        Ok(ReadyResponse::ready())
    }
}

/// All built-in approvers, in registration order
pub fn approvers() -> Vec<Arc<dyn Approver>> {
    vec![Arc::new(Allowed), Arc::new(Constraints)]
}
