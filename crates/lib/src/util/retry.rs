//! Bounded retry for external invocations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How often, and how far apart, a failing operation is re-attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Additional attempts after the first one.
  pub retries: u32,
  /// Pause between attempts.
  pub delay: Duration,
}

impl RetryPolicy {
  pub const NONE: RetryPolicy = RetryPolicy {
    retries: 0,
    delay: Duration::ZERO,
  };

  pub fn new(retries: u32, delay: Duration) -> Self {
    Self { retries, delay }
  }

  pub fn attempts(&self) -> u32 {
    self.retries.saturating_add(1)
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::NONE
  }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// `op` receives the 1-based attempt number. The last error is returned when
/// every attempt failed.
pub async fn with_retry<T, E, F, Fut>(what: &str, policy: RetryPolicy, op: F) -> Result<T, E>
where
  E: Display,
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  with_retry_if(what, policy, |_| true, op).await
}

/// Like [`with_retry`], but an error for which `retryable` returns false is
/// returned immediately.
pub async fn with_retry_if<T, E, P, F, Fut>(what: &str, policy: RetryPolicy, retryable: P, mut op: F) -> Result<T, E>
where
  E: Display,
  P: Fn(&E) -> bool,
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let attempts = policy.attempts();
  let mut attempt = 1;

  loop {
    match op(attempt).await {
      Ok(value) => return Ok(value),
      Err(err) if attempt < attempts && retryable(&err) => {
        warn!(what, attempt, attempts, error = %err, "attempt failed, retrying");
        if !policy.delay.is_zero() {
          tokio::time::sleep(policy.delay).await;
        }
        attempt += 1;
      }
      Err(err) => return Err(err),
    }
  }
}
