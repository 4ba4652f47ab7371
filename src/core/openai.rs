//! OpenAI-compatible chat completions backend
//!
//! Works with any server exposing `POST /chat/completions` (OpenAI,
//! OpenRouter, llama.cpp server, vLLM).

use super::backend::{BackendError, ChatBackend, ChatReply, ChatRequest};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(config: &crate::config::Config) -> Self {
        Self::with_endpoint(
            &config.backend_url,
            &config.backend_model,
            Some(config.backend_api_key.as_str()),
        )
    }

    pub fn with_endpoint(url: &str, model: &str, api_key: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()).map(str::to_string),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": request.full_messages(),
                "max_tokens": request.max_tokens,
                "temperature": request.temperature
            }));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body_text = response.text().await?;

        if !status.is_success() {
            warn!("❌ Chat completions error ({}): {}", status, body_text);
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body_text,
            });
        }

        debug!("🧠 Completion raw body: {}", body_text);

        let parsed: CompletionResponse = serde_json::from_str(&body_text).map_err(|e| {
            warn!("❌ Failed to deserialize completion: {} - Body: {}", e, body_text);
            BackendError::Malformed(e.to_string())
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| ChatReply { content })
            .ok_or_else(|| BackendError::Malformed("response has no message content".into()))
    }

    fn name(&self) -> &str {
        "openai"
    }

    async fn health_check(&self) -> bool {
        let mut builder = self
            .client
            .get(format!("{}/models", self.url))
            .timeout(Duration::from_secs(2));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        match builder.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
