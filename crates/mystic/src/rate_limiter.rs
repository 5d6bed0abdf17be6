use dashmap::DashMap;
use std::time::{Duration, Instant};

pub const MAX_REQUESTS_PER_WINDOW: usize = 10;
pub const REQUEST_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter on request frequency, keyed by caller IP. The
/// table is process-local and lost on restart; rate limiting is best-effort,
/// not a durability guarantee.
pub struct RateLimiter {
    windows: DashMap<String, Vec<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(MAX_REQUESTS_PER_WINDOW, REQUEST_WINDOW)
    }

    pub fn with_limits(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    /// Purges expired timestamps for `key`, then admits or rejects the
    /// request. Rejected requests are not recorded, so a limited caller's
    /// window is not extended indefinitely.
    pub fn is_rate_limited(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut timestamps = self.windows.entry(key.to_string()).or_default();
        timestamps.retain(|&requested_at| now.duration_since(requested_at) < self.window);
        if timestamps.len() < self.max_requests {
            timestamps.push(now);
            false
        } else {
            true
        }
    }

    /// Drops keys whose entire window has expired, bounding memory.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.windows.retain(|_, timestamps| {
            timestamps.retain(|&requested_at| now.duration_since(requested_at) < self.window);
            !timestamps.is_empty()
        });
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
