//! Retrying storage calls that failed with [`Error::Unavailable`].

use std::{future::Future, time::Duration};

use drinkr_core::{Error, Result};
use rand_core::{OsRng, RngCore};
use tracing::warn;

use crate::config::RetryPolicy;

/// "Equal jitter": the delay is drawn from `[backoff/2, backoff]`.
pub(crate) fn jittered_backoff(rng: &mut impl RngCore, backoff: Duration) -> Duration {
  let backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
  if backoff_ms <= 1 {
    return backoff;
  }
  let half_ms = backoff_ms / 2;
  let jitter_ms = rng.next_u64() % (half_ms + 1);
  Duration::from_millis(half_ms.saturating_add(jitter_ms))
}

/// Run `f` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` tries have been made.
///
/// `op` names the storage call in log lines.
pub(crate) async fn run<T, E, F, Fut>(policy: &RetryPolicy, op: &'static str, mut f: F) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = std::result::Result<T, E>>,
  E: Into<Error>,
{
  let mut attempt = 1;
  let mut backoff = policy.base_delay();
  loop {
    let result: Result<T> = f().await.map_err(Into::into);
    match result {
      Ok(value) => return Ok(value),
      Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
        let delay = jittered_backoff(&mut OsRng, backoff);
        warn!(op, attempt, ?delay, error = %e, "storage unavailable, retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
        backoff = backoff.saturating_mul(2).min(policy.max_delay());
      }
      Err(e) => {
        if e.is_retryable() {
          warn!(op, attempt, error = %e, "storage unavailable, giving up");
        }
        return Err(e);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use super::*;

  fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
      max_attempts,
      base_delay_ms: 1,
      max_delay_ms: 4,
    }
  }

  #[test]
  fn jitter_stays_within_half_and_full_backoff() {
    let backoff = Duration::from_millis(100);
    for _ in 0..200 {
      let d = jittered_backoff(&mut OsRng, backoff);
      assert!(d >= Duration::from_millis(50) && d <= backoff, "{d:?}");
    }
    assert_eq!(jittered_backoff(&mut OsRng, Duration::ZERO), Duration::ZERO);
  }

  #[tokio::test]
  async fn transient_failures_are_retried() {
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let value = run(&policy(4), "test", || async move {
      if counter.fetch_add(1, Ordering::SeqCst) < 2 {
        Err(Error::Unavailable("busy".into()))
      } else {
        Ok(7)
      }
    })
    .await
    .unwrap();
    assert_eq!(value, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let err = run(&policy(3), "test", || async move {
      counter.fetch_add(1, Ordering::SeqCst);
      Err::<(), _>(Error::Unavailable("busy".into()))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn deterministic_failures_are_not_retried() {
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let err = run(&policy(5), "test", || async move {
      counter.fetch_add(1, Ordering::SeqCst);
      Err::<(), _>(Error::Forbidden("no".into()))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
