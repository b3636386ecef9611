use thiserror::Error;

use crate::circuit_breaker::CircuitOpen;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode service response: {0}")]
    Decode(String),

    #[error("rate limit exceeded for '{key}', retry in {retry_after_secs}s")]
    RateLimited { key: String, retry_after_secs: u64 },

    #[error("circuit '{name}' is open, retry in {remaining_secs}s")]
    CircuitOpen { name: String, remaining_secs: u64 },
}

impl ClientError {
    /// Network failures and non-2xx responses are worth another attempt.
    /// Everything else is either local admission control or a response we
    /// will never be able to read.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Status { .. })
    }
}

impl From<CircuitOpen> for ClientError {
    fn from(open: CircuitOpen) -> Self {
        ClientError::CircuitOpen {
            name: open.name,
            remaining_secs: open.remaining_secs,
        }
    }
}
