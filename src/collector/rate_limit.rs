//! Sliding-window rate limiting
//!
//! Keeps the timestamps of the last N calls and delays a new call until the
//! oldest of them has left the trailing window.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::metrics;

/// Request-based rate limiter over a sliding window
///
/// Owned by a single collection run; callers are strictly sequential, so
/// `acquire` takes `&mut self` and needs no synchronisation.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: usize,
    window: Duration,
    history: VecDeque<Instant>,
}

impl RateLimiter {
    /// Create a limiter allowing `permits` calls per `window`
    ///
    /// # Arguments
    /// * `permits` - Maximum calls per window (values below 1 are raised to 1)
    /// * `window` - Length of the trailing window
    pub fn new(permits: usize, window: Duration) -> Self {
        let permits = permits.max(1);
        Self {
            permits,
            window,
            history: VecDeque::with_capacity(permits),
        }
    }

    /// Maximum calls per window
    pub fn permits(&self) -> usize {
        self.permits
    }

    /// Length of the trailing window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of calls currently remembered
    pub fn recorded(&self) -> usize {
        self.history.len()
    }

    /// How long the next `acquire` would sleep
    pub fn next_delay(&self) -> Duration {
        if self.history.len() < self.permits {
            return Duration::ZERO;
        }
        self.history
            .front()
            .map(|oldest| self.window.saturating_sub(oldest.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    /// Wait until a call is permitted, then record it
    ///
    /// # Returns
    /// The time spent waiting
    pub async fn acquire(&mut self) -> Duration {
        let mut waited = Duration::ZERO;

        if self.history.len() >= self.permits {
            if let Some(oldest) = self.history.pop_front() {
                let elapsed = oldest.elapsed();
                if elapsed < self.window {
                    waited = self.window - elapsed;
                    debug!(wait_ms = waited.as_millis(), "Rate limit reached, waiting");
                    sleep(waited).await;
                }
            }
        }

        self.history.push_back(Instant::now());
        metrics::record_rate_limit_wait(waited);
        waited
    }

    /// Forget all recorded calls
    pub fn reset(&mut self) {
        self.history.clear();
    }
}
