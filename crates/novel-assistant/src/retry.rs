//! Bounded retries with linear backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{GatewayError, Result};

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub attempts: u32,
    /// Base delay; the wait after attempt `n` is `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub const fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    /// Policy for creating threads: three attempts, one second apart, growing.
    pub const fn thread_creation() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    /// Policy for whole runs: three attempts, two seconds apart, growing.
    pub const fn runs() -> Self {
        Self::new(3, Duration::from_secs(2))
    }

    /// Delay after the given 1-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }

    /// Run `op` until it succeeds, fails with an error `should_retry` rejects,
    /// or the attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut, P>(&self, label: &str, should_retry: P, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&GatewayError) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && should_retry(&err) => {
                    let delay = self.delay(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        attempts,
                        ?delay,
                        error = %err,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::runs()
    }
}
