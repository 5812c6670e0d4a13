//! Status polling
//!
//! Waits read a resource, compare its status with the target and sleep for
//! the poll interval. The deadline is checked before every read, so a zero
//! timeout fails without reading any status.

use crate::error::CpiError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Timeout and interval of status waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    timeout: Duration,
    interval: Duration,
}

impl PollingConfig {
    /// Create a polling configuration
    #[must_use]
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Overall time allowed for one wait
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pause between two status reads
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the clock for one wait. A timeout too large to represent
    /// never expires.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        Deadline {
            expires_at: Instant::now().checked_add(self.timeout),
        }
    }

    /// Sleep for one poll interval
    pub async fn pause(&self) {
        debug!("Sleeping {:?} before next status check", self.interval);
        tokio::time::sleep(self.interval).await;
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(5))
    }
}

/// Point in time after which a wait gives up
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// Fail with a timeout naming `what` once the deadline has passed
    pub fn check<F: FnOnce() -> String>(&self, what: F) -> Result<(), CpiError> {
        if self.expires_at.is_some_and(|expires_at| Instant::now() >= expires_at) {
            return Err(CpiError::Timeout(format!("timeout while waiting for {}", what())));
        }
        Ok(())
    }
}
