//! Typed HTTP client for system servers.

mod breaker;
mod client;

pub use breaker::{BreakerConfig, CircuitBreaker};
pub use client::{GeneratedAudio, GeneratorClient};

use thiserror::Error;

/// Failure modes of a generate call, as seen by the gateway.
#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    #[error("system unreachable")]
    Unreachable,

    #[error("generation deadline exceeded")]
    Timeout,

    #[error("prompt rejected by system: {0}")]
    Rejected(String),

    #[error("prompt unsupported by system")]
    Unsupported,

    #[error("system server error: {0}")]
    InternalServerError(String),

    #[error("request expired in the system batch queue")]
    BatchTimeout,
}

impl GenerateError {
    /// Whether the client retry policy applies to this error.
    ///
    /// Prompt-level failures (4xx) and blown deadlines are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerateError::Unreachable
                | GenerateError::InternalServerError(_)
                | GenerateError::BatchTimeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(GenerateError::Unreachable.is_retryable());
        assert!(GenerateError::InternalServerError("boom".to_string()).is_retryable());
        assert!(GenerateError::BatchTimeout.is_retryable());

        assert!(!GenerateError::Timeout.is_retryable());
        assert!(!GenerateError::Rejected("nope".to_string()).is_retryable());
        assert!(!GenerateError::Unsupported.is_retryable());
    }
}
