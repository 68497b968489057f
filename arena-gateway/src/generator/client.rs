//! HTTP client for one system server.

use super::breaker::{BreakerConfig, CircuitBreaker};
use super::GenerateError;
use arena_common::{DetailedTextToMusicPrompt, GenerateResponseBody, GenerateTelemetry, PromptSupport};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RETRIES: u32 = 2;

/// Decoded audio from one successful generate call.
#[derive(Debug, Clone)]
pub struct GeneratedAudio {
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    pub lyrics: Option<String>,
    pub telemetry: GenerateTelemetry,
    /// Wall time the gateway observed for the call, retries included.
    pub gen_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptSupportBody {
    support: PromptSupport,
}

/// Stateless apart from its connection pool and circuit breaker.
pub struct GeneratorClient {
    client: reqwest::Client,
    base_url: String,
    deadline: Duration,
    breaker: CircuitBreaker,
}

impl GeneratorClient {
    pub fn new(base_url: String, deadline: Duration, breaker_config: BreakerConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            deadline,
            breaker: CircuitBreaker::new(breaker_config),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe `/health`; returns the observed latency when the server is READY.
    pub async fn health(&self) -> Result<Duration, GenerateError> {
        let started = Instant::now();
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(classify_transport)?;
        if response.status().is_success() {
            Ok(started.elapsed())
        } else {
            Err(GenerateError::Unreachable)
        }
    }

    /// Ask the server whether it can serve this prompt.
    pub async fn prompt_support(
        &self,
        prompt: &DetailedTextToMusicPrompt,
    ) -> Result<PromptSupport, GenerateError> {
        let url = format!("{}/prompt_support", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(10))
            .json(prompt)
            .send()
            .await
            .map_err(classify_transport)?;
        if !response.status().is_success() {
            return Err(GenerateError::Unreachable);
        }
        let body: PromptSupportBody = response
            .json()
            .await
            .map_err(|e| GenerateError::InternalServerError(e.to_string()))?;
        Ok(body.support)
    }

    /// Generate audio, retrying transient failures within the deadline.
    ///
    /// Up to two extra attempts with 1 s then 2 s backoff, and only for
    /// errors the server might not repeat (unreachable, 5xx, batch timeout).
    pub async fn generate(
        &self,
        prompt: &DetailedTextToMusicPrompt,
    ) -> Result<GeneratedAudio, GenerateError> {
        let started = Instant::now();
        let mut last_error = GenerateError::Unreachable;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_secs(1 << (attempt - 1));
                if started.elapsed() + backoff >= self.deadline {
                    break;
                }
                tokio::time::sleep(backoff).await;
            }

            let remaining = match self.deadline.checked_sub(started.elapsed()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return Err(GenerateError::Timeout),
            };

            match self.attempt(prompt, remaining).await {
                Ok(mut generated) => {
                    generated.gen_ms = started.elapsed().as_millis() as u64;
                    return Ok(generated);
                }
                Err(error) => {
                    debug!(
                        attempt,
                        base_url = %self.base_url,
                        "generate attempt failed: {}",
                        error
                    );
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    last_error = error;
                }
            }
        }

        warn!(base_url = %self.base_url, "generate gave up: {}", last_error);
        Err(last_error)
    }

    async fn attempt(
        &self,
        prompt: &DetailedTextToMusicPrompt,
        remaining: Duration,
    ) -> Result<GeneratedAudio, GenerateError> {
        if !self.breaker.allow() {
            return Err(GenerateError::Unreachable);
        }

        let url = format!("{}/generate", self.base_url);
        let response = match self
            .client
            .post(&url)
            .timeout(remaining)
            .json(prompt)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                let classified = classify_transport(error);
                if matches!(classified, GenerateError::Unreachable) {
                    self.breaker.record_unreachable();
                }
                return Err(classified);
            }
        };

        let status = response.status();
        if status.as_u16() == 503 {
            self.breaker.record_unreachable();
            return Err(GenerateError::Unreachable);
        }
        self.breaker.record_success();

        match status.as_u16() {
            200 => {
                let body: GenerateResponseBody = response
                    .json()
                    .await
                    .map_err(|e| GenerateError::InternalServerError(e.to_string()))?;
                let audio = body
                    .decode_audio()
                    .map_err(|e| GenerateError::InternalServerError(e.to_string()))?;
                Ok(GeneratedAudio {
                    audio,
                    sample_rate: body.sample_rate,
                    lyrics: body.lyrics,
                    telemetry: body.metadata,
                    gen_ms: 0,
                })
            }
            504 => Err(GenerateError::BatchTimeout),
            409 => Err(GenerateError::Unsupported),
            code if (400..500).contains(&code) => {
                Err(GenerateError::Rejected(error_detail(response).await))
            }
            _ => Err(GenerateError::InternalServerError(
                error_detail(response).await,
            )),
        }
    }
}

fn classify_transport(error: reqwest::Error) -> GenerateError {
    if error.is_timeout() {
        GenerateError::Timeout
    } else if error.is_connect() || error.is_request() {
        GenerateError::Unreachable
    } else {
        GenerateError::InternalServerError(error.to_string())
    }
}

async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => body.detail.unwrap_or_else(|| status.to_string()),
        Err(_) => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_removed() {
        let client = GeneratorClient::new(
            "http://localhost:15001/".to_string(),
            Duration::from_secs(180),
            BreakerConfig::default(),
        );
        assert_eq!(client.base_url(), "http://localhost:15001");
    }
}
