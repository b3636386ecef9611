use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::circuit_breaker::{BreakerConfig, BreakerStats, CircuitBreaker};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};

/// Process-wide resilience state, one breaker and one limiter per remote
/// dependency name.
///
/// Construct once at startup and pass by reference. Entries are created on
/// first access with the registry's configs and live as long as the registry.
#[derive(Default)]
pub struct ResilienceRegistry {
    breaker_config: BreakerConfig,
    limit_config: RateLimitConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl ResilienceRegistry {
    pub fn new(breaker_config: BreakerConfig, limit_config: RateLimitConfig) -> Self {
        Self {
            breaker_config,
            limit_config,
            ..Self::default()
        }
    }

    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut map = lock(&self.breakers);
        Arc::clone(
            map.entry(name.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.breaker_config))),
        )
    }

    pub fn limiter(&self, name: &str) -> Arc<RateLimiter> {
        let mut map = lock(&self.limiters);
        Arc::clone(
            map.entry(name.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(self.limit_config))),
        )
    }

    /// Stats of every breaker created so far, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerStats> {
        let map = lock(&self.breakers);
        let mut stats: Vec<BreakerStats> = map.values().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
