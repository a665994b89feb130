//! Per-caller fixed-window rate limiting.

use crate::config::RateLimitConfig;
use crate::errors::PipelineError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counts requests per key in fixed windows.
///
/// Expired windows are swept at most once per window length, on the request
/// path, so the map only holds keys seen within the last window or two.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, Window>,
    last_pruned: Mutex<Instant>,
}

impl RateLimiter {
    /// Creates a limiter from config.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window(),
            windows: DashMap::new(),
            last_pruned: Mutex::new(Instant::now()),
        }
    }

    /// Counts a request for `key`.
    ///
    /// # Errors
    ///
    /// Returns RATE_LIMIT_EXCEEDED once `key` used up its window.
    pub fn check(&self, key: &str) -> Result<(), PipelineError> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), PipelineError> {
        // Must run before the entry below locks its shard.
        self.maybe_prune(now);

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            let retry_after = self.window.saturating_sub(elapsed.min(self.window));
            return Err(PipelineError::rate_limited(self.max_requests, self.window, retry_after));
        }
        entry.count += 1;
        Ok(())
    }

    fn maybe_prune(&self, now: Instant) {
        {
            let mut last = self.last_pruned.lock();
            if now.saturating_duration_since(*last) < self.window {
                return;
            }
            *last = now;
        }
        self.prune_at(now);
    }

    /// Drops windows that have expired.
    pub fn prune(&self) {
        self.prune_at(Instant::now());
    }

    fn prune_at(&self, now: Instant) {
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            window_secs: 60,
        })
    }

    #[test]
    fn test_limit_enforced_per_key() {
        let limiter = limiter(2);
        limiter.check("alice").unwrap();
        limiter.check("alice").unwrap();
        let err = limiter.check("alice").unwrap_err();

        assert_eq!(err.code, ErrorCode::RateLimitExceeded);
        assert_eq!(err.http_status(), 401);
        limiter.check("bob").unwrap();
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(1);
        let start = Instant::now();
        limiter.check_at("alice", start).unwrap();
        assert!(limiter.check_at("alice", start + Duration::from_secs(30)).is_err());
        limiter
            .check_at("alice", start + Duration::from_secs(61))
            .unwrap();
    }

    #[test]
    fn test_retry_after_reported() {
        let limiter = limiter(1);
        let start = Instant::now();
        limiter.check_at("alice", start).unwrap();
        let err = limiter
            .check_at("alice", start + Duration::from_secs(20))
            .unwrap_err();
        assert_eq!(err.metadata["retryAfterSecs"], serde_json::json!(40));
    }

    #[test]
    fn test_expired_keys_are_swept() {
        let limiter = limiter(5);
        let start = Instant::now();
        limiter.check_at("alice", start).unwrap();
        limiter.check_at("bob", start).unwrap();
        assert_eq!(limiter.tracked_keys(), 2);

        limiter
            .check_at("carol", start + Duration::from_secs(61))
            .unwrap();
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_prune_keeps_live_windows() {
        let limiter = limiter(5);
        limiter.check("alice").unwrap();
        limiter.prune();
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
