//! Sliding-window rate limiting
//!
//! Each [`Quota`] keeps the timestamps of recently admitted requests. A request is admitted
//! only when every quota has room; otherwise the caller sleeps until the oldest timestamp of
//! the most constrained window ages out, then re-checks.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::config::{REQUESTS_PER_HOUR, REQUESTS_PER_MINUTE};
use crate::metrics::RateLimiterMetrics;

/// At most `max_requests` admissions within any rolling `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Admissions allowed per window
    pub max_requests: usize,
    /// Window length
    pub window: Duration,
}

impl Quota {
    /// Create a quota; a zero request budget is raised to one
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
        }
    }
}

#[derive(Debug)]
struct SlidingWindow {
    quota: Quota,
    admitted: VecDeque<Instant>,
}

impl SlidingWindow {
    fn new(quota: Quota) -> Self {
        Self {
            quota,
            admitted: VecDeque::with_capacity(quota.max_requests),
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(oldest) = self.admitted.front() {
            if now.duration_since(*oldest) >= self.quota.window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until a slot frees up, or `None` when the window has room
    fn wait_time(&self, now: Instant) -> Option<Duration> {
        if self.admitted.len() < self.quota.max_requests {
            return None;
        }
        self.admitted
            .front()
            .map(|oldest| self.quota.window.saturating_sub(now.duration_since(*oldest)))
    }
}

/// Multi-window sliding rate limiter shared by every request of a run
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<Vec<SlidingWindow>>,
}

impl RateLimiter {
    /// Create a limiter enforcing all of `quotas` at once
    pub fn new(quotas: impl IntoIterator<Item = Quota>) -> Self {
        Self {
            windows: Mutex::new(quotas.into_iter().map(SlidingWindow::new).collect()),
        }
    }

    /// OpenAQ quotas: 60 requests per minute and 2000 per hour
    pub fn openaq() -> Self {
        Self::per_minute_and_hour(REQUESTS_PER_MINUTE, REQUESTS_PER_HOUR)
    }

    /// Limiter with a per-minute and a per-hour quota
    pub fn per_minute_and_hour(per_minute: usize, per_hour: usize) -> Self {
        Self::new([
            Quota::new(per_minute, Duration::from_secs(60)),
            Quota::new(per_hour, Duration::from_secs(3600)),
        ])
    }

    /// Configured quotas, in construction order
    pub fn quotas(&self) -> Vec<Quota> {
        self.lock().iter().map(|w| w.quota).collect()
    }

    /// Admissions currently counted against each window
    pub fn window_usage(&self) -> Vec<usize> {
        let now = Instant::now();
        let mut windows = self.lock();
        windows
            .iter_mut()
            .map(|w| {
                w.evict_expired(now);
                w.admitted.len()
            })
            .collect()
    }

    /// Wait until a request may be sent, then record it against every window
    ///
    /// Returns the total time spent waiting.
    pub async fn admit(&self) -> Duration {
        let started = Instant::now();

        loop {
            let wait = {
                let now = Instant::now();
                let mut windows = self.lock();
                for window in windows.iter_mut() {
                    window.evict_expired(now);
                }

                match windows.iter().filter_map(|w| w.wait_time(now)).max() {
                    Some(wait) => Some(wait),
                    None => {
                        for window in windows.iter_mut() {
                            window.admitted.push_back(now);
                        }
                        None
                    }
                }
            };

            match wait {
                Some(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
                    sleep(wait).await;
                }
                None => {
                    let waited = started.elapsed();
                    RateLimiterMetrics::record_admission(waited);
                    return waited;
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SlidingWindow>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
