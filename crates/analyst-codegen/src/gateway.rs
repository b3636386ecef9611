use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::CompletionBackend;
use crate::circuit_breaker::CircuitBreaker;
use crate::parse::parse_generated_code;
use crate::rate_limiter::RateLimiter;
use crate::registry::ResilienceRegistry;
use crate::types::GeneratedCode;
use crate::{ClientError, Result};

/// Registry name under which the code-generation service is tracked.
pub const SERVICE_DEPENDENCY: &str = "codegen-service";

// ─── RetryPolicy ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    8000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `failed_attempt + 1`: base doubled per failure, capped.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(20);
        let ms = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

// ─── Gateway ──────────────────────────────────────────────────────────────

/// Guarded access to the code-generation service.
///
/// A call is checked against the caller's rate limit, then runs the whole
/// retry loop inside one circuit-breaker call. An exhausted retry loop
/// therefore counts as a single breaker failure.
pub struct Gateway {
    backend: Arc<dyn CompletionBackend>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl Gateway {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        registry: &ResilienceRegistry,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            breaker: registry.breaker(SERVICE_DEPENDENCY),
            limiter: registry.limiter(SERVICE_DEPENDENCY),
            policy,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Send `prompt` on behalf of `identity` and return the raw reply text.
    pub async fn complete(&self, identity: &str, prompt: &str) -> Result<String> {
        if !self.limiter.check_and_record(identity) {
            let retry_after_secs = self.limiter.retry_after(identity);
            warn!(identity, retry_after_secs, "code generation rate limited");
            return Err(ClientError::RateLimited {
                key: identity.to_string(),
                retry_after_secs,
            });
        }

        self.breaker.call(|| self.with_retries(prompt)).await
    }

    /// [`complete`](Gateway::complete) followed by reply parsing. Parsing
    /// never fails; an unusable reply becomes the fallback summary script.
    pub async fn generate_code(&self, identity: &str, prompt: &str) -> Result<GeneratedCode> {
        let reply = self.complete(identity, prompt).await?;
        let code = parse_generated_code(&reply);
        info!(
            backend = self.backend.name(),
            fallback = code.fallback,
            chars = code.raw_text.len(),
            "code generated"
        );
        Ok(code)
    }

    async fn with_retries(&self, prompt: &str) -> Result<String> {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.backend.complete(prompt).await {
                Ok(text) => {
                    debug!(attempt, "completion succeeded");
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < max => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(attempt, max, delay_ms = delay.as_millis() as u64, error = %e, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "completion failed");
                    return Err(e);
                }
            }
        }
    }
}
