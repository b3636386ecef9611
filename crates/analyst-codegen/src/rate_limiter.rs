use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_calls() -> u32 {
    30
}

fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Sliding-window admission control keyed by caller identity.
///
/// Each key owns the timestamps of its recent calls. Timestamps older than
/// the window are pruned lazily whenever the key is touched. Buckets are
/// never evicted, so high-cardinality long-lived keys grow the map.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// `true` iff fewer than `max_calls` calls for `key` fall inside the window.
    ///
    /// Does not record anything. Callers pairing this with [`record_call`]
    /// race against each other between the two calls; use
    /// [`check_and_record`] when that matters.
    ///
    /// [`record_call`]: RateLimiter::record_call
    /// [`check_and_record`]: RateLimiter::check_and_record
    pub fn is_allowed(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.lock();
        let Some(bucket) = buckets.get_mut(key) else {
            return self.config.max_calls > 0;
        };
        self.prune(bucket, now);
        bucket.len() < self.config.max_calls as usize
    }

    pub fn record_call(&self, key: &str) {
        let now = Instant::now();
        let mut buckets = self.lock();
        let bucket = buckets.entry(key.to_string()).or_default();
        self.prune(bucket, now);
        bucket.push_back(now);
    }

    /// Atomic check-then-record. Returns `false` without recording when the
    /// key is at its limit.
    pub fn check_and_record(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.lock();
        let bucket = buckets.entry(key.to_string()).or_default();
        self.prune(bucket, now);
        if bucket.len() >= self.config.max_calls as usize {
            debug!(key, calls = bucket.len(), "rate limit reached");
            return false;
        }
        bucket.push_back(now);
        true
    }

    /// Calls left for `key` in the current window.
    pub fn remaining(&self, key: &str) -> u32 {
        let now = Instant::now();
        let buckets = self.lock();
        let used = buckets
            .get(key)
            .map(|b| b.iter().filter(|t| self.in_window(**t, now)).count())
            .unwrap_or(0);
        self.config.max_calls.saturating_sub(used as u32)
    }

    /// When the oldest surviving call leaves the window, or `None` if the
    /// key has no calls inside it.
    pub fn reset_time(&self, key: &str) -> Option<Instant> {
        let now = Instant::now();
        let buckets = self.lock();
        buckets
            .get(key)?
            .iter()
            .find(|t| self.in_window(**t, now))
            .map(|oldest| *oldest + self.config.window())
    }

    /// Whole seconds until [`reset_time`](RateLimiter::reset_time), rounded up.
    pub fn retry_after(&self, key: &str) -> u64 {
        match self.reset_time(key) {
            Some(reset) => {
                let d = reset.saturating_duration_since(Instant::now());
                d.as_secs() + u64::from(d.subsec_nanos() > 0)
            }
            None => 0,
        }
    }

    fn in_window(&self, t: Instant, now: Instant) -> bool {
        now.saturating_duration_since(t) < self.config.window()
    }

    fn prune(&self, bucket: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = bucket.front() {
            if self.in_window(*front, now) {
                break;
            }
            bucket.pop_front();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_calls: 3,
            window_secs: 60,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fourth_call_in_window_is_rejected() {
        let rl = limiter();
        for _ in 0..3 {
            assert!(rl.is_allowed("user-1"));
            rl.record_call("user-1");
        }
        assert!(!rl.is_allowed("user-1"));
        assert_eq!(rl.remaining("user-1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_past_oldest_call() {
        let rl = limiter();
        rl.record_call("k");
        tokio::time::advance(Duration::from_secs(20)).await;
        rl.record_call("k");
        rl.record_call("k");
        assert!(!rl.is_allowed("k"));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(rl.is_allowed("k"));
        assert_eq!(rl.remaining("k"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let rl = limiter();
        for _ in 0..3 {
            rl.record_call("a");
        }
        assert!(!rl.is_allowed("a"));
        assert!(rl.is_allowed("b"));
        assert_eq!(rl.remaining("b"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn check_and_record_stops_at_limit() {
        let rl = limiter();
        assert!(rl.check_and_record("k"));
        assert!(rl.check_and_record("k"));
        assert!(rl.check_and_record("k"));
        assert!(!rl.check_and_record("k"));
        assert_eq!(rl.remaining("k"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_time_is_oldest_plus_window() {
        let rl = limiter();
        assert_eq!(rl.reset_time("k"), None);
        assert_eq!(rl.retry_after("k"), 0);

        let first = Instant::now();
        rl.record_call("k");
        tokio::time::advance(Duration::from_secs(15)).await;
        rl.record_call("k");

        assert_eq!(rl.reset_time("k"), Some(first + Duration::from_secs(60)));
        assert_eq!(rl.retry_after("k"), 45);
    }
}
