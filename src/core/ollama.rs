//! Ollama AI Integration
//!
//! Answers open-ended questions through a local Ollama server using the
//! non-streaming `/api/chat` endpoint.

use super::backend::{BackendError, ChatBackend, ChatReply, ChatRequest};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

/// Ollama chat API response
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

/// Conversational backend backed by an Ollama server
#[derive(Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaBackend {
    /// Create new Ollama backend from config
    pub fn new(config: &crate::config::Config) -> Self {
        Self::with_endpoint(&config.backend_url, &config.backend_model)
    }

    pub fn with_endpoint(url: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": request.full_messages(),
                "stream": false,
                "options": {
                    "temperature": request.temperature,
                    "num_predict": request.max_tokens
                }
            }))
            .send()
            .await?;

        let status = response.status();
        let body_text = response.text().await?;

        if !status.is_success() {
            warn!("❌ Ollama API Error ({}): {}", status, body_text);
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body_text,
            });
        }

        debug!("🧠 Ollama raw body: {}", body_text);

        let ollama_resp: OllamaResponse = serde_json::from_str(&body_text).map_err(|e| {
            warn!(
                "❌ Failed to deserialize Ollama response: {} - Body: {}",
                e, body_text
            );
            BackendError::Malformed(e.to_string())
        })?;

        Ok(ChatReply {
            content: ollama_resp.message.content,
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }

    /// Health check - verify Ollama is reachable
    async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
