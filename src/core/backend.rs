//! Conversational backend abstraction
//!
//! The request manager talks to the language model only through
//! [`ChatBackend`]; concrete HTTP backends live in `ollama` and `openai`.

use crate::config::Config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One completion request: system preamble plus the bounded context window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    /// Messages with the system preamble prepended, as chat APIs expect them
    pub fn full_messages(&self) -> Vec<ChatMessage> {
        let mut all = Vec::with_capacity(self.messages.len() + 1);
        if !self.system_prompt.is_empty() {
            all.push(ChatMessage::new(ChatRole::System, self.system_prompt.clone()));
        }
        all.extend(self.messages.iter().cloned());
        all
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
}

/// Failures of a single backend call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// Non-success HTTP status
    #[error("AI API responded with status: {status}")]
    Status { status: u16, body: String },

    /// Connection, DNS or I/O failure
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The payload did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            BackendError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Trait for conversational AI backends
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the request and return the assistant reply
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, BackendError>;

    /// Get the backend name
    fn name(&self) -> &str;

    /// Verify the backend is reachable
    async fn health_check(&self) -> bool {
        true
    }
}

/// Factory to create the configured backend
pub fn create_backend(config: &Config) -> Arc<dyn ChatBackend> {
    info!("🛠️ Creating conversation backend: {}", config.backend);
    match config.backend.as_str() {
        "openai" | "openrouter" => Arc::new(super::openai::OpenAiBackend::new(config)),
        "ollama" => Arc::new(super::ollama::OllamaBackend::new(config)),
        other => {
            warn!("  - Unknown backend '{}', falling back to Ollama", other);
            Arc::new(super::ollama::OllamaBackend::new(config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_messages_prepends_system_prompt() {
        let request = ChatRequest {
            system_prompt: "You are JARVIS.".into(),
            messages: vec![ChatMessage::new(ChatRole::User, "hello")],
            max_tokens: 100,
            temperature: 0.7,
        };
        let all = request.full_messages();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].role, ChatRole::System);
        assert_eq!(all[1].content, "hello");
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&ChatMessage::new(ChatRole::Assistant, "hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_error_messages() {
        let err = BackendError::Status {
            status: 503,
            body: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "AI API responded with status: 503");
        assert_eq!(
            BackendError::Timeout(Duration::from_secs(30)).to_string(),
            "request timed out after 30s"
        );
    }

    #[test]
    fn test_factory_selects_backend() {
        let mut config = Config::default();
        config.backend = "openai".into();
        assert_eq!(create_backend(&config).name(), "openai");
        config.backend = "something-else".into();
        assert_eq!(create_backend(&config).name(), "ollama");
    }
}
