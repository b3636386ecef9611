use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ─── CircuitState ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── BreakerConfig ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures in `Closed` that trip the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive successes in `HalfOpen` that close it again.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Cooldown after the last failure before a trial call is allowed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─── Errors and stats ─────────────────────────────────────────────────────

/// Returned instead of invoking the guarded call while the breaker is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{name}' is open, retry in {remaining_secs}s")]
pub struct CircuitOpen {
    pub name: String,
    pub remaining_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Seconds until an open breaker admits a trial call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_cooldown_secs: Option<u64>,
}

pub type OpenCallback = Arc<dyn Fn(&str) + Send + Sync>;

// ─── CircuitBreaker ───────────────────────────────────────────────────────

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
}

/// Three-state failure isolator for one remote dependency.
///
/// Bookkeeping (admission, outcome recording, transitions) happens under a
/// short critical section. The guarded future itself runs with the lock
/// released, so a slow remote call never blocks other callers' admission.
///
/// `Open → HalfOpen` is lazy: the first call attempted after the cooldown
/// performs the transition. There is no background timer.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    on_open: Option<OpenCallback>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name = name.into();
        debug!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            timeout_secs = config.timeout_secs,
            "circuit breaker created"
        );
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure: None,
                last_failure_at: None,
            }),
            on_open: None,
        }
    }

    /// Register a callback fired (outside the lock) every time the breaker opens.
    pub fn with_on_open(mut self, callback: OpenCallback) -> Self {
        self.on_open = Some(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// The stored state. An open breaker whose cooldown has elapsed still
    /// reports `Open` until a call attempt moves it to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `operation` under breaker protection.
    ///
    /// When open, the operation is not invoked and `CircuitOpen` is returned
    /// through `E`. Any `Err` from the operation counts as a failure.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpen>,
    {
        self.admit().map_err(E::from)?;

        let outcome = operation().await;
        match &outcome {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        outcome
    }

    /// Side-effect-free snapshot of counters and state.
    pub fn stats(&self) -> BreakerStats {
        let inner = self.lock();
        let remaining_cooldown_secs = match inner.state {
            CircuitState::Open => Some(self.remaining_cooldown(&inner).map_or(0, ceil_secs)),
            _ => None,
        };
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            last_failure_at: inner.last_failure_at,
            remaining_cooldown_secs,
        }
    }

    fn admit(&self) -> Result<(), CircuitOpen> {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }
        match self.remaining_cooldown(&inner) {
            Some(remaining) => Err(CircuitOpen {
                name: self.name.clone(),
                remaining_secs: ceil_secs(remaining),
            }),
            None => {
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 0;
                info!(breaker = %self.name, "circuit half-open, admitting trial call");
                Ok(())
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    info!(breaker = %self.name, "circuit closed, dependency recovered");
                }
            }
            // A call admitted before the breaker opened finished late.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let opened = {
            let mut inner = self.lock();
            inner.last_failure = Some(Instant::now());
            inner.last_failure_at = Some(Utc::now());
            match inner.state {
                CircuitState::Closed => {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        true
                    } else {
                        false
                    }
                }
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.consecutive_successes = 0;
                    true
                }
                CircuitState::Open => false,
            }
        };

        if opened {
            warn!(
                breaker = %self.name,
                cooldown_secs = self.config.timeout_secs,
                "circuit opened"
            );
            if let Some(cb) = &self.on_open {
                cb(&self.name);
            }
        }
    }

    /// `None` once the cooldown since the last failure has fully elapsed.
    fn remaining_cooldown(&self, inner: &Inner) -> Option<Duration> {
        let last = inner.last_failure?;
        self.config.timeout().checked_sub(last.elapsed()).filter(|d| !d.is_zero())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

// ─── Tests ────────────────────────────────────────────────────────────────
