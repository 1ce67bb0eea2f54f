//! Adaptive request throttle
//!
//! This module handles:
//! - A minimum delay between requests to the forum
//! - A concurrency limit on in-flight requests
//! - Growing the delay with observed response latency (auto-throttle)
//! - Halving the concurrency limit when the forum signals strain

use crate::config::CrawlerConfig;
use crate::model::ScanMode;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;

#[derive(Debug)]
struct ThrottleState {
    delay: Duration,
    last_request: Option<Instant>,
    in_flight: u32,
    concurrency_limit: u32,
    /// Permits still held by requests that must be forgotten on release
    /// to bring the semaphore down to `concurrency_limit`
    shrink_debt: u32,
}

/// Auto-throttle shared by every traversal of one crawl attempt
///
/// The delay starts at the configured start delay and follows
/// `new = max(latency / target_concurrency, (old + that) / 2)`, clamped to
/// `[baseline, max_delay]`. Error responses never shrink it.
///
/// The concurrency limit is the number of permits of a semaphore.
#[derive(Debug)]
pub struct AutoThrottle {
    slots: Semaphore,
    state: Mutex<ThrottleState>,
    baseline: Duration,
    max_delay: Duration,
    target_concurrency: f64,
    max_concurrency: u32,
}

/// A claimed request slot; releases it on drop
#[derive(Debug)]
pub struct ThrottlePermit<'a> {
    permit: Option<SemaphorePermit<'a>>,
    throttle: &'a AutoThrottle,
}

impl Drop for ThrottlePermit<'_> {
    fn drop(&mut self) {
        let mut state = self.throttle.lock();
        state.in_flight = state.in_flight.saturating_sub(1);

        if let Some(permit) = self.permit.take() {
            if state.shrink_debt > 0 {
                state.shrink_debt -= 1;
                permit.forget();
            }
        }
    }
}

impl AutoThrottle {
    /// Creates a throttle for the given scan mode
    ///
    /// Full scans use the more conservative `full-scan-delay` as their
    /// baseline.
    pub fn new(config: &CrawlerConfig, mode: &ScanMode) -> Self {
        let baseline = Duration::from_millis(if mode.is_full() {
            config.full_scan_delay
        } else {
            config.download_delay
        });
        let max_delay = Duration::from_millis(config.autothrottle_max_delay).max(baseline);
        let start = Duration::from_millis(config.autothrottle_start_delay)
            .max(baseline)
            .min(max_delay);
        let max_concurrency = config.max_concurrent_requests.max(1);

        Self {
            slots: Semaphore::new(max_concurrency as usize),
            state: Mutex::new(ThrottleState {
                delay: start,
                last_request: None,
                in_flight: 0,
                concurrency_limit: max_concurrency,
                shrink_debt: 0,
            }),
            baseline,
            max_delay,
            target_concurrency: config.autothrottle_target_concurrency,
            max_concurrency,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ThrottleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until a request may be sent and claims a slot for it
    ///
    /// Waiters queue on the semaphore in FIFO order. Once a slot is held the
    /// caller sleeps for whatever the delay since the previous request still
    /// requires.
    pub async fn acquire(&self) -> ThrottlePermit<'_> {
        // The semaphore is never closed
        let permit = self.slots.acquire().await.ok();

        loop {
            let wait = {
                let mut state = self.lock();
                let now = Instant::now();

                match state.last_request {
                    Some(last) if now.duration_since(last) < state.delay => {
                        state.delay - now.duration_since(last)
                    }
                    _ => {
                        state.in_flight += 1;
                        state.last_request = Some(now);
                        return ThrottlePermit {
                            permit,
                            throttle: self,
                        };
                    }
                }
            };

            tracing::trace!("Throttle waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Lowers the limit, forgetting free permits now and held ones on release
    fn shrink_to(&self, state: &mut ThrottleState, limit: u32) {
        let excess = state.concurrency_limit - limit;
        let forgotten = self.slots.forget_permits(excess as usize) as u32;
        state.shrink_debt += excess - forgotten;
        state.concurrency_limit = limit;
    }

    fn grow_by_one(&self, state: &mut ThrottleState) {
        if state.shrink_debt > 0 {
            state.shrink_debt -= 1;
        } else {
            self.slots.add_permits(1);
        }
        state.concurrency_limit += 1;
    }

    /// Adjusts delay and concurrency from one observed response
    ///
    /// # Arguments
    ///
    /// * `latency` - Time the response took
    /// * `status` - HTTP status code of the response
    pub fn record_response(&self, latency: Duration, status: u16) {
        let mut state = self.lock();

        if status == 429 || status == 503 {
            let backed_off = (state.delay * 2).max(self.baseline).min(self.max_delay);
            let limit = (state.concurrency_limit / 2).max(1);
            tracing::warn!(
                "Forum signalled strain (HTTP {}), delay {:?} -> {:?}, concurrency {} -> {}",
                status,
                state.delay,
                backed_off,
                state.concurrency_limit,
                limit
            );
            state.delay = backed_off;
            self.shrink_to(&mut state, limit);
            return;
        }

        let target = Duration::from_secs_f64(latency.as_secs_f64() / self.target_concurrency);
        let averaged = (state.delay + target) / 2;
        let proposed = target.max(averaged).clamp(self.baseline, self.max_delay);

        let success = (200..300).contains(&status);
        if success || proposed > state.delay {
            state.delay = proposed;
        }

        if success && state.concurrency_limit < self.max_concurrency {
            self.grow_by_one(&mut state);
        }
    }

    /// Current delay between requests
    pub fn current_delay(&self) -> Duration {
        self.lock().delay
    }

    /// Current concurrency limit
    pub fn concurrency_limit(&self) -> u32 {
        self.lock().concurrency_limit
    }

    /// Number of requests currently holding a permit
    pub fn in_flight(&self) -> u32 {
        self.lock().in_flight
    }
}
