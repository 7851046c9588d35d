//! Approver registry
//!
//! Built once by the composition root, then shared read-only as
//! `Arc<Registry>`. Registration order is preserved and drives the order in
//! which approvers are consulted.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::approver::Approver;
use crate::Error;

/// Name-keyed table of approvers
#[derive(Default, Clone)]
pub struct Registry {
    approvers: Vec<Arc<dyn Approver>>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single approver
    ///
    /// Fails with [`Error::DuplicateApprover`] if the name is taken.
    pub fn register(mut self, approver: Arc<dyn Approver>) -> Result<Self, Error> {
        let name = approver.name().to_string();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateApprover { name });
        }
        debug!(approver = %name, position = self.approvers.len(), "registered approver");
        self.index.insert(name, self.approvers.len());
        self.approvers.push(approver);
        Ok(self)
    }

    /// Register several approvers in order
    pub fn store<I>(self, approvers: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Arc<dyn Approver>>,
    {
        approvers
            .into_iter()
            .try_fold(self, |registry, approver| registry.register(approver))
    }

    /// Look up the approvers for exactly `names`, in registration order
    ///
    /// Every unknown name is reported in a single [`Error::UnknownApprover`].
    pub fn retrieve<'a, I>(&self, names: I) -> Result<Vec<Arc<dyn Approver>>, Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut positions = BTreeSet::new();
        let mut unknown = Vec::new();
        for name in names {
            match self.index.get(name) {
                Some(&pos) => {
                    positions.insert(pos);
                }
                None => unknown.push(name.to_string()),
            }
        }

        if !unknown.is_empty() {
            return Err(Error::unknown_approvers(unknown));
        }

        Ok(positions
            .into_iter()
            .map(|pos| self.approvers[pos].clone())
            .collect())
    }

    /// Registered names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.approvers.iter().map(|a| a.name())
    }

    /// Number of registered approvers
    pub fn len(&self) -> usize {
        self.approvers.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.approvers.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
