//! `analyst-codegen`: resilient driver for the external code-generation service.
//!
//! Every analysis task in a run asks a remote language model for a Python
//! script. The service is slow, rate limited and occasionally down, so every
//! call goes through the same guarded path.
//!
//! # Architecture
//!
//! ```text
//! prompt text
//!     │
//!     ▼
//! RateLimiter      ← sliding window per caller identity, rejects fast
//!     │
//!     ▼
//! CircuitBreaker   ← one per dependency name, shared via ResilienceRegistry
//!     │
//!     ▼
//! retry loop       ← up to RetryPolicy::max_attempts, exponential backoff
//!     │
//!     ▼
//! CompletionBackend (HttpBackend in production)
//!     │
//!     ▼
//! parse_generated_code → GeneratedCode { raw_text, description, … }
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use analyst_codegen::{Gateway, HttpBackend, ResilienceRegistry, ServiceConfig};
//!
//! let registry = ResilienceRegistry::default();
//! let backend = Arc::new(HttpBackend::new(ServiceConfig::default())?);
//! let gateway = Gateway::new(backend, &registry, Default::default());
//!
//! let code = gateway.generate_code("cli", "Summarise the dataset").await?;
//! println!("{}", code.raw_text);
//! ```

pub mod backend;
pub mod circuit_breaker;
pub mod error;
pub mod gateway;
pub mod parse;
pub mod rate_limiter;
pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;

pub use backend::{CompletionBackend, HttpBackend, ServiceConfig};
pub use circuit_breaker::{BreakerConfig, BreakerStats, CircuitBreaker, CircuitOpen, CircuitState};
pub use error::ClientError;
pub use gateway::{Gateway, RetryPolicy, SERVICE_DEPENDENCY};
pub use parse::{parse_generated_code, repair_json_newlines, FALLBACK_SCRIPT};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use registry::ResilienceRegistry;
pub use types::GeneratedCode;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClientError>;
