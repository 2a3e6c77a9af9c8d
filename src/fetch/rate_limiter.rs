//! Minimum-interval request pacing
//!
//! One limiter is shared by every query against the same target site. The
//! wait and the timestamp update happen under one lock, so concurrent
//! callers are spaced by at least the interval.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter enforcing `interval` between request starts
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    /// Creates a limiter from a requests-per-minute budget
    ///
    /// A budget of 0 disables pacing.
    pub fn from_rpm(rpm: u32) -> Self {
        if rpm == 0 {
            return Self::new(Duration::ZERO);
        }
        Self::new(Duration::from_secs_f64(60.0 / f64::from(rpm)))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until a request may start, then records it
    ///
    /// Dropping the returned future while it waits leaves the recorded
    /// timestamp untouched.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                tracing::trace!("Rate limiter waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}
