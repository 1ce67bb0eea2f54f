//! Run-level retry with exponential backoff
//!
//! A failed crawl attempt is retried after `base_delay * 2^retry`, where
//! `retry` counts the retries already made (0 for the first retry). With the
//! default base of 60 seconds the waits are 60, 120, 240, ... seconds.
//! An abort cuts the wait short.

use crate::config::RetryConfig;
use crate::HarvestError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Operator abort shared between the crawl tasks and the supervisor
///
/// Page fetches poll `is_aborted`; backoff waits await `aborted`.
#[derive(Debug, Default)]
pub struct AbortSignal {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal and wakes every waiter
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Completes once the signal is raised
    pub async fn aborted(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent abort is not missed
        notified.as_mut().enable();
        if self.is_aborted() {
            return;
        }
        notified.await;
    }
}

/// How often and how patiently a crawl run is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.base_delay),
        }
    }

    /// Backoff before the given retry
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Outcome of a supervised run
#[derive(Debug)]
pub struct Supervised<T> {
    /// Attempts made, including the last one
    pub attempts: u32,
    pub result: Result<T, HarvestError>,
}

/// Runs `attempt` until it succeeds, fails permanently, or retries run out
///
/// The closure receives the 1-based attempt number. Errors for which
/// `is_retryable()` is false end the run immediately. Raising `abort` during
/// a backoff wait ends the run with `HarvestError::Cancelled`.
pub async fn supervise<T, F, Fut>(
    policy: &RetryPolicy,
    abort: &AbortSignal,
    mut attempt: F,
) -> Supervised<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, HarvestError>>,
{
    let mut retries = 0;

    loop {
        let attempt_no = retries + 1;
        match attempt(attempt_no).await {
            Ok(value) => {
                return Supervised {
                    attempts: attempt_no,
                    result: Ok(value),
                }
            }
            Err(e) if !e.is_retryable() => {
                tracing::error!("Crawl attempt {} failed permanently: {}", attempt_no, e);
                return Supervised {
                    attempts: attempt_no,
                    result: Err(e),
                };
            }
            Err(e) if retries >= policy.max_retries => {
                tracing::error!(
                    "Crawl attempt {} failed, no retries left ({} allowed): {}",
                    attempt_no,
                    policy.max_retries,
                    e
                );
                return Supervised {
                    attempts: attempt_no,
                    result: Err(e),
                };
            }
            Err(e) => {
                let delay = policy.delay_for(retries);
                tracing::warn!(
                    "Crawl attempt {} failed: {}. Retrying in {:?}",
                    attempt_no,
                    e,
                    delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = abort.aborted() => {
                        tracing::warn!("Abort requested during backoff, not retrying");
                        return Supervised {
                            attempts: attempt_no,
                            result: Err(HarvestError::Cancelled),
                        };
                    }
                }
                retries += 1;
            }
        }
    }
}
