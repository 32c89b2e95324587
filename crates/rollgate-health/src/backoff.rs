//! Bounded exponential-backoff retry.
//!
//! [`retry`] re-runs an operation until it succeeds or the policy's
//! wall-clock budget runs out. Every error is retryable; callers decide
//! what an error means.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use rollgate_core::BackoffPolicy;

use crate::shutdown::Shutdown;

/// Bookkeeping for a successful retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStats {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Why a retry loop gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// The budget ran out; `last` is the final attempt's error.
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last: E,
    },
    /// The shutdown signal fired.
    Cancelled,
}

/// Run `op` until it returns `Ok`, backing off between attempts.
///
/// After each failure the loop stops if `policy.max_elapsed` has passed
/// since the first attempt. Otherwise it waits the current interval,
/// clamped to the remaining budget, and grows the interval by
/// `policy.multiplier` up to `policy.max_interval`.
pub async fn retry<F, Fut, E>(
    policy: &BackoffPolicy,
    shutdown: &mut Shutdown,
    mut op: F,
) -> Result<RetryStats, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let start = Instant::now();
    let mut interval = policy.initial_interval.min(policy.max_interval);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let last = match shutdown.run(op()).await {
            Err(_) => return Err(RetryError::Cancelled),
            Ok(Ok(())) => {
                return Ok(RetryStats {
                    attempts,
                    elapsed: start.elapsed(),
                });
            }
            Ok(Err(e)) => e,
        };

        let elapsed = start.elapsed();
        if elapsed >= policy.max_elapsed {
            warn!(attempts, ?elapsed, error = %last, "retry budget exhausted");
            return Err(RetryError::Exhausted {
                attempts,
                elapsed,
                last,
            });
        }

        let wait = interval.min(policy.max_elapsed - elapsed);
        debug!(attempt = attempts, ?wait, error = %last, "attempt failed, backing off");
        if shutdown.sleep(wait).await.is_err() {
            return Err(RetryError::Cancelled);
        }
        interval = policy.next_interval(interval);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use tokio::sync::watch;

    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::default()
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_returns_immediately() {
        let mut shutdown = Shutdown::never();
        let stats = retry(&policy(), &mut shutdown, || async { Ok::<(), String>(()) })
            .await
            .unwrap();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let mut shutdown = Shutdown::never();
        let calls = Cell::new(0);
        let stats = retry(&policy(), &mut shutdown, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 4 {
                    Err(format!("attempt {n} not converged"))
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(stats.attempts, 4);
        // 500ms + 750ms + 1125ms of backoff.
        assert!(stats.elapsed >= Duration::from_millis(2375));
        assert!(stats.elapsed < Duration::from_millis(2400));
    }

    #[tokio::test(start_paused = true)]
    async fn never_converging_stops_within_budget() {
        let mut shutdown = Shutdown::never();
        let policy = policy();
        let start = Instant::now();

        let err = retry(&policy, &mut shutdown, || async { Err::<(), _>("still 3") })
            .await
            .unwrap_err();

        let total = start.elapsed();
        assert!(total >= policy.max_elapsed);
        assert!(total <= policy.max_elapsed + policy.max_interval);
        match err {
            RetryError::Exhausted { attempts, last, .. } => {
                assert!(attempts > 10);
                assert_eq!(last, "still 3");
            }
            RetryError::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_never_exceed_max_interval() {
        let mut shutdown = Shutdown::never();
        let policy = policy();
        let last_call = Cell::new(None::<Instant>);
        let longest = Cell::new(Duration::ZERO);

        let _ = retry(&policy, &mut shutdown, || {
            let now = Instant::now();
            if let Some(prev) = last_call.get() {
                longest.set(longest.get().max(now - prev));
            }
            last_call.set(Some(now));
            async { Err::<(), _>("pending") }
        })
        .await;

        assert!(longest.get() >= policy.max_interval);
        assert!(longest.get() < policy.max_interval + Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_multiplier_waits_at_max_interval() {
        let mut shutdown = Shutdown::never();
        let policy = BackoffPolicy {
            multiplier: 1e300,
            max_elapsed: Duration::from_secs(60),
            ..policy()
        };

        let err = retry(&policy, &mut shutdown, || async { Err::<(), _>("pending") })
            .await
            .unwrap_err();

        match err {
            // 500ms, then 10s waits until the minute runs out.
            RetryError::Exhausted { attempts, .. } => assert_eq!(attempts, 8),
            RetryError::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_backoff() {
        let (tx, rx) = watch::channel(false);
        let mut shutdown = Shutdown::new(rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            let _ = tx.send(true);
        });

        let start = Instant::now();
        let err = retry(&policy(), &mut shutdown, || async { Err::<(), _>("pending") })
            .await
            .unwrap_err();
        assert_eq!(err, RetryError::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(30));
    }
}
