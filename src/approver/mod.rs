//! Approver capability contract
//!
//! Every approver plugin implements [`Approver`]. The controller only calls
//! [`Approver::ready`]; request-time evaluation happens elsewhere.

pub mod builtin;
pub mod fake;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::crd::CertificateRequestPolicy;
use crate::Error;

/// Category of a structured field error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// A required value is missing
    Required,
    /// A value is present but malformed
    Invalid,
    /// A value is not one of the supported options
    NotSupported,
    /// A value is not permitted
    Forbidden,
    /// The approver failed for reasons unrelated to the input
    InternalError,
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "Required value"),
            Self::Invalid => write!(f, "Invalid value"),
            Self::NotSupported => write!(f, "Unsupported value"),
            Self::Forbidden => write!(f, "Forbidden"),
            Self::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Structured error pointing at a field of the policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the offending field (e.g. `spec.plugins.vault.values.role`)
    pub path: String,
    /// What is wrong with it
    pub kind: FieldErrorKind,
    /// Free-form detail from the approver
    pub detail: String,
}

impl FieldError {
    /// Create a field error
    pub fn new(kind: FieldErrorKind, path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            detail: detail.into(),
        }
    }

    /// A required field is missing
    pub fn required(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::Required, path, detail)
    }

    /// A field value is invalid
    pub fn invalid(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::Invalid, path, detail)
    }

    /// A field value is forbidden
    pub fn forbidden(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::Forbidden, path, detail)
    }

    /// The approver hit an internal failure while checking the field
    pub fn internal(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::InternalError, path, detail)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}: {}", self.path, self.kind)
        } else {
            write!(f, "{}: {}: {}", self.path, self.kind, self.detail)
        }
    }
}

/// Result of one approver's readiness check for one policy
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadyResponse {
    /// Whether the approver can evaluate requests against the policy
    pub ready: bool,
    /// Why it cannot; empty when ready
    pub errors: Vec<FieldError>,
    /// Suggested delay before checking again
    pub requeue_after: Option<Duration>,
}

impl ReadyResponse {
    /// Approver is ready
    pub fn ready() -> Self {
        Self {
            ready: true,
            ..Default::default()
        }
    }

    /// Approver is not ready for the given reasons
    pub fn not_ready(errors: Vec<FieldError>) -> Self {
        Self {
            ready: false,
            errors,
            requeue_after: None,
        }
    }

    /// Attach a retry hint
    pub fn requeue_after(mut self, after: Duration) -> Self {
        self.requeue_after = Some(after);
        self
    }
}

/// Per-pass context handed to readiness checks
#[derive(Clone, Debug)]
pub struct ReadyContext {
    cancel: CancellationToken,
}

impl ReadyContext {
    /// Wrap a cancellation token tied to the reconciliation's lifetime
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Token that fires when the pass should be abandoned
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns true once the pass has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Capability every approver plugin provides to the readiness controller
///
/// `ready` returning `Err` is an execution fault (retried with the default
/// interval). A substantive "not ready" judgement is `Ok` with
/// `ready: false` and field errors explaining why.
#[async_trait]
pub trait Approver: Send + Sync {
    /// Unique, stable name. Policies reference approvers by this name.
    fn name(&self) -> &str;

    /// Report whether this approver can evaluate requests against `policy` now
    async fn ready(
        &self,
        ctx: &ReadyContext,
        policy: &CertificateRequestPolicy,
    ) -> Result<ReadyResponse, Error>;
}
