//! Controller configuration
//!
//! Populated from CLI flags in `main`; tests construct it directly.

use std::time::Duration;

use crate::Error;

/// Default number of policies reconciled in parallel
pub const DEFAULT_WORKERS: u16 = 4;

/// Requeue interval used when no not-ready approver supplied a hint
pub const DEFAULT_REQUEUE_AFTER: Duration = Duration::from_secs(5);

/// Default deadline for a single approver readiness check
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Lower bound applied to every requeue so a zero hint cannot busy-loop
pub const MIN_REQUEUE_AFTER: Duration = Duration::from_millis(100);

/// Upper bound applied to every requeue
pub const MAX_REQUEUE_AFTER: Duration = Duration::from_secs(300);

/// Tunables for the readiness controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Maximum number of distinct policies reconciled concurrently
    pub workers: u16,
    /// Fallback requeue interval for not-ready policies
    pub default_requeue_after: Duration,
    /// Deadline for each approver readiness check
    pub ready_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            default_requeue_after: DEFAULT_REQUEUE_AFTER,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

impl ControllerConfig {
    /// Check bounds; called once at startup
    pub fn validate(&self) -> Result<(), Error> {
        if self.workers == 0 {
            return Err(Error::validation("workers must be at least 1"));
        }
        if self.default_requeue_after < MIN_REQUEUE_AFTER
            || self.default_requeue_after > MAX_REQUEUE_AFTER
        {
            return Err(Error::validation(format!(
                "default requeue must be between {:?} and {:?}, got {:?}",
                MIN_REQUEUE_AFTER, MAX_REQUEUE_AFTER, self.default_requeue_after
            )));
        }
        if self.ready_timeout.is_zero() {
            return Err(Error::validation("ready timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Clamp a requeue interval into the permitted range
    pub fn clamp_requeue(&self, after: Duration) -> Duration {
        after.clamp(MIN_REQUEUE_AFTER, MAX_REQUEUE_AFTER)
    }
}
