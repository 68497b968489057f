//! Chat provider trait definition.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Options for a single completion request.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the provider to emit a single JSON object.
    pub force_json: bool,
    pub seed: Option<u32>,
    pub timeout: Duration,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 400,
            temperature: 0.0,
            force_json: false,
            seed: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timeout")]
    Timeout,
}

/// A chat completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logs and cache keys (e.g. "openai").
    fn name(&self) -> &str;

    /// Complete a single-turn prompt and return the raw text.
    async fn complete(
        &self,
        input: &str,
        options: &CompletionOptions,
    ) -> Result<String, ChatError>;
}
