//! Configurable approver test double
//!
//! Used by this crate's tests and by downstream plugin authors who need a
//! stand-in approver when testing the readiness loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{Approver, ReadyContext, ReadyResponse};
use crate::crd::CertificateRequestPolicy;
use crate::Error;

type ReadyFn =
    dyn Fn(&ReadyContext, &CertificateRequestPolicy) -> Result<ReadyResponse, Error> + Send + Sync;

/// Approver whose readiness is supplied by a closure
///
/// The closure can be swapped after registration, and every call is counted.
pub struct FakeApprover {
    name: String,
    ready_fn: RwLock<Arc<ReadyFn>>,
    calls: AtomicUsize,
}

impl FakeApprover {
    /// A fake that always reports ready
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready_fn: RwLock::new(Arc::new(|_, _| Ok(ReadyResponse::ready()))),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replace the readiness behaviour and return self for chaining
    pub fn with_ready<F>(self, f: F) -> Self
    where
        F: Fn(&ReadyContext, &CertificateRequestPolicy) -> Result<ReadyResponse, Error>
            + Send
            + Sync
            + 'static,
    {
        self.set_ready(f);
        self
    }

    /// Replace the readiness behaviour of a registered fake
    pub fn set_ready<F>(&self, f: F)
    where
        F: Fn(&ReadyContext, &CertificateRequestPolicy) -> Result<ReadyResponse, Error>
            + Send
            + Sync
            + 'static,
    {
        let mut guard = self
            .ready_fn
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(f);
    }

    /// Number of readiness checks performed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for FakeApprover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeApprover")
            .field("name", &self.name)
            .field("calls", &self.calls())
            .finish()
    }
}

#[async_trait]
impl Approver for FakeApprover {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ready(
        &self,
        ctx: &ReadyContext,
        policy: &CertificateRequestPolicy,
    ) -> Result<ReadyResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let f = self
            .ready_fn
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        f(ctx, policy)
    }
}
