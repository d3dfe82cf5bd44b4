//! Polling
//!
//! ldconsole has no notifications, so every state change is observed by
//! asking again. `Poller` owns the sleeping, the cancellation and the optional
//! deadline; callers only supply the check.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ldfleet_core::{LdError, Result};

/// Interval between checks and an optional overall deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    /// `None` waits until the condition holds or the poller is cancelled
    pub timeout: Option<Duration>,
}

impl PollSpec {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }
}

/// When the first check runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstCheck {
    Immediate,
    /// After one interval, for conditions that cannot hold right after the
    /// action that started the wait
    AfterInterval,
}

#[derive(Debug, Clone, Default)]
pub struct Poller {
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `check` until it returns true; returns the number of checks made.
    ///
    /// Errors from `check` end the wait unchanged.
    pub async fn until<F, Fut>(
        &self,
        what: &str,
        spec: PollSpec,
        first: FirstCheck,
        mut check: F,
    ) -> Result<u32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let started = Instant::now();
        if first == FirstCheck::AfterInterval {
            self.pause(what, spec.interval).await?;
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if check().await? {
                debug!("{} after {} check(s)", what, attempts);
                return Ok(attempts);
            }

            if let Some(timeout) = spec.timeout {
                if started.elapsed() + spec.interval > timeout {
                    return Err(LdError::WaitTimeout(format!(
                        "{} not reached within {:?}",
                        what, timeout
                    )));
                }
            }

            debug!("Waiting {:?} for {} (check {})", spec.interval, what, attempts);
            self.pause(what, spec.interval).await?;
        }
    }

    /// Sleep for `interval` unless cancelled first
    pub async fn pause(&self, what: &str, interval: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(LdError::Interrupted(format!("wait for {} was cancelled", what)))
            }
            _ = tokio::time::sleep(interval) => Ok(()),
        }
    }
}
