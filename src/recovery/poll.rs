//! Bounded polling for results produced asynchronously downstream
//!
//! A backfilled VAA reaches storage only after the ingest worker verified it.
//! Callers that need the bytes poll with a fixed interval and a bounded number
//! of attempts and get a distinct timeout error when verification doesn't
//! finish in time.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::RecoveryError;

pub const DEFAULT_POLL_ATTEMPTS: u32 = 15;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Storage poll configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum number of checks
    pub max_attempts: u32,
    /// Wait before each check
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollConfig {
    /// Upper bound on how long [`poll_until`] can take
    pub fn total_wait(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Call `check` every `interval` until it yields a value.
///
/// `Ok(None)` means "not yet" and keeps polling; an error stops immediately.
/// Exhausting the attempts returns [`RecoveryError::Timeout`] naming `what`.
pub async fn poll_until<T, F, Fut>(
    config: &PollConfig,
    what: &str,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T, RecoveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, RecoveryError>>,
{
    for attempt in 1..=config.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return Err(RecoveryError::Cancelled),
            _ = tokio::time::sleep(config.interval) => {}
        }

        if let Some(value) = check().await? {
            return Ok(value);
        }
        debug!(attempt, max_attempts = config.max_attempts, what, "Still waiting");
    }

    Err(RecoveryError::Timeout(format!(
        "{} not available after {} attempts",
        what, config.max_attempts
    )))
}
