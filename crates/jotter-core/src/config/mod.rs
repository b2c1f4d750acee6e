//! Sync engine configuration.

use std::time::Duration;

/// Number of failed drain passes after which a queue item stops being retried.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Upper bound on a single remote call before it counts as a transient failure.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for draining the mutation queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Attempts allowed per queue item (one per drain pass)
    pub retry_limit: u32,
    /// Timeout applied to every remote `apply` call
    pub remote_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

impl SyncConfig {
    /// Set the retry cap (values below 1 are raised to 1)
    #[must_use]
    pub const fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = if retry_limit == 0 { 1 } else { retry_limit };
        self
    }

    /// Set the per-call remote timeout
    #[must_use]
    pub const fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }
}
