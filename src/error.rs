//! Error types for the approver-policy controller

use thiserror::Error;

/// Main error type for approver-policy operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A policy references approvers that are not registered
    #[error("unknown approvers: {}", names.join(", "))]
    UnknownApprover {
        /// Names of the unregistered approvers, sorted
        names: Vec<String>,
    },

    /// Two approvers were registered under the same name
    #[error("approver {name:?} is already registered")]
    DuplicateApprover {
        /// The duplicated approver name
        name: String,
    },

    /// An approver's readiness check failed to execute
    ///
    /// Displays only the approver's own text; the aggregator prefixes the name.
    #[error("{0}")]
    Approver(String),

    /// A readiness check was aborted because the controller is shutting down
    #[error("readiness check cancelled")]
    Cancelled,

    /// A readiness check did not finish within the configured deadline
    #[error("readiness check timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Validation error for controller configuration
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal/operational error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an unknown-approver error; names are sorted for stable messages
    pub fn unknown_approvers<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self::UnknownApprover { names }
    }

    /// Create an approver execution error with the given message
    pub fn approver(msg: impl Into<String>) -> Self {
        Self::Approver(msg.into())
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this is an optimistic-concurrency conflict from the API server
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }

    /// Check if this error is retryable
    ///
    /// Duplicate registrations and invalid configuration are build or
    /// deployment defects. Everything else is retried by the reconcile loop.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(source) => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409 && ae.code != 429
            ),
            Error::DuplicateApprover { .. } => false,
            Error::Validation(_) => false,
            Error::UnknownApprover { .. }
            | Error::Approver(_)
            | Error::Cancelled
            | Error::Timeout(_)
            | Error::Internal(_) => true,
        }
    }
}
