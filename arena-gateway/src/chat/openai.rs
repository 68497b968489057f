//! OpenAI-compatible chat completion provider.

use super::provider::{ChatError, ChatProvider, CompletionOptions};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub struct OpenAiChatProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiChatProvider {
    pub fn new(base_url: String, model: String, api_key: String) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ChatError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }

    fn classify(error: reqwest::Error) -> ChatError {
        if error.is_timeout() {
            ChatError::Timeout
        } else {
            ChatError::Connection(error.to_string())
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        input: &str,
        options: &CompletionOptions,
    ) -> Result<String, ChatError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": input}],
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });
        if let Some(seed) = options.seed {
            body["seed"] = json!(seed);
        }
        if options.force_json {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(options.timeout)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::InvalidResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ChatError::InvalidResponse("no completion content".to_string()))
    }
}
