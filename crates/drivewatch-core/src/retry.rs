//! Fixed-delay retry for individual remote calls.

use crate::remote::{RemoteError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry behaviour for one remote call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub delay: Duration,
    /// Maximum number of attempts (None = unlimited)
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever, waiting `delay` between attempts.
    pub const fn forever(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// At most `attempts` attempts, waiting `delay` between them.
    pub const fn limited(delay: Duration, attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(attempts),
        }
    }

    /// Check if `attempts` made so far exhaust this policy.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.map(|max| attempts >= max).unwrap_or(false)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or
    /// the policy is exhausted. The last error is returned in the latter cases.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e @ RemoteError::Transient(_)) => {
                    if self.exhausted(attempts) {
                        return Err(e);
                    }
                    warn!("{} failed (attempt {}): {}", what, attempts, e);
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
