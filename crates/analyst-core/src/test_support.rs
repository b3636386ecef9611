//! Shared fakes for unit tests.

use analyst_codegen::{
    ClientError, CompletionBackend, Gateway, ResilienceRegistry, RetryPolicy,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Backend answering every prompt with a closure.
pub struct FnBackend<F>(pub F);

#[async_trait]
impl<F> CompletionBackend for FnBackend<F>
where
    F: Fn(&str) -> Result<String, ClientError> + Send + Sync,
{
    fn name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ClientError> {
        (self.0)(prompt)
    }
}

/// Gateway over a closure backend, fresh resilience state, no retries.
pub fn fn_gateway<F>(f: F) -> Gateway
where
    F: Fn(&str) -> Result<String, ClientError> + Send + Sync + 'static,
{
    Gateway::new(
        Arc::new(FnBackend(f)),
        &ResilienceRegistry::default(),
        RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        },
    )
}

pub fn unavailable() -> ClientError {
    ClientError::Status {
        status: 503,
        body: "unavailable".into(),
    }
}

/// Skip note for tests that need a Python interpreter.
pub fn has_python() -> bool {
    if which::which("python3").is_ok() {
        true
    } else {
        eprintln!("python3 not found; skipping");
        false
    }
}
