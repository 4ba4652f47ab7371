//! Conversation request management
//!
//! Owns the session transcript. Local intents are answered from templates;
//! everything else goes to the conversation backend, with at most one request
//! in flight. A superseded request never writes to the transcript.

use crate::commands::{self, CommandClassifier, Intent};
use crate::config::Config;
use crate::core::backend::{BackendError, ChatBackend, ChatMessage, ChatRequest, ChatRole};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shown instead of the raw error when the backend reply had the wrong shape
pub const MALFORMED_RESPONSE_MESSAGE: &str =
    "I apologize, Sir. I received a response I couldn't understand. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the transcript
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub id: u64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Local>,
    pub is_error: bool,
}

#[derive(Debug, Clone)]
pub struct ConversationSettings {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Most recent non-error turns sent as context
    pub context_turns: usize,
    pub request_timeout: Duration,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ConversationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            context_turns: config.context_turns.max(1),
            request_timeout: config.request_timeout(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConversationError {
    /// Superseded by a newer request or cancelled; nothing was written
    #[error("request cancelled")]
    Cancelled,

    /// Non-success status or transport failure; an error turn was appended
    #[error("backend error: {error}")]
    Backend {
        error: BackendError,
        turn: ConversationTurn,
    },

    /// The backend answered with an unexpected payload; an error turn was appended
    #[error("malformed response: {reason}")]
    MalformedResponse {
        reason: String,
        turn: ConversationTurn,
    },

    #[error("empty input")]
    EmptyInput,
}

impl ConversationError {
    /// The error turn appended for this failure, if any
    pub fn turn(&self) -> Option<&ConversationTurn> {
        match self {
            ConversationError::Backend { turn, .. }
            | ConversationError::MalformedResponse { turn, .. } => Some(turn),
            _ => None,
        }
    }
}

struct RequestHandle {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Transcript {
    turns: Vec<ConversationTurn>,
    next_turn_id: u64,
    next_request_id: u64,
    active: Option<RequestHandle>,
}

impl Transcript {
    fn push(&mut self, role: Role, content: String, is_error: bool) -> ConversationTurn {
        self.next_turn_id += 1;
        let turn = ConversationTurn {
            id: self.next_turn_id,
            role,
            content,
            created_at: Local::now(),
            is_error,
        };
        self.turns.push(turn.clone());
        turn
    }

    fn cancel_active(&mut self) -> bool {
        match self.active.take() {
            Some(handle) => {
                debug!("Cancelling request {}", handle.id);
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn last_is_error(&self) -> bool {
        self.turns.last().is_some_and(|t| t.is_error)
    }
}

pub struct ConversationManager {
    backend: Arc<dyn ChatBackend>,
    classifier: CommandClassifier,
    settings: ConversationSettings,
    state: Mutex<Transcript>,
    transcript_tx: watch::Sender<Vec<ConversationTurn>>,
}

impl ConversationManager {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        classifier: CommandClassifier,
        settings: ConversationSettings,
    ) -> Self {
        let (transcript_tx, _) = watch::channel(Vec::new());
        Self {
            backend,
            classifier,
            settings,
            state: Mutex::new(Transcript::default()),
            transcript_tx,
        }
    }

    pub fn classifier(&self) -> &CommandClassifier {
        &self.classifier
    }

    /// Classify `text` and answer it
    pub async fn send(&self, text: &str) -> Result<ConversationTurn, ConversationError> {
        let intent = self.classifier.classify(text);
        self.respond(text, &intent).await
    }

    /// Answer `text` whose intent is already known
    ///
    /// The user turn is appended before anything else happens, and any request
    /// still in flight is cancelled.
    pub async fn respond(
        &self,
        text: &str,
        intent: &Intent,
    ) -> Result<ConversationTurn, ConversationError> {
        let content = text.trim();
        if content.is_empty() {
            return Err(ConversationError::EmptyInput);
        }

        let (request_id, cancel, request) = {
            let mut state = self.lock();
            state.cancel_active();
            state.push(Role::User, content.to_string(), false);

            if let Some(reply) = commands::respond(intent) {
                debug!("💬 Local answer for intent '{}'", intent.name());
                let turn = state.push(Role::Assistant, reply, false);
                self.publish(&state);
                return Ok(turn);
            }

            state.next_request_id += 1;
            let id = state.next_request_id;
            let cancel = CancellationToken::new();
            state.active = Some(RequestHandle {
                id,
                cancel: cancel.clone(),
            });
            let request = self.build_request(&state.turns);
            self.publish(&state);
            (id, cancel, request)
        };

        info!(
            "🧠 Asking {} (request {}, {} context messages)",
            self.backend.name(),
            request_id,
            request.messages.len()
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConversationError::Cancelled),
            result = tokio::time::timeout(self.settings.request_timeout, self.backend.complete(&request)) => {
                result.unwrap_or(Err(BackendError::Timeout(self.settings.request_timeout)))
            }
        };

        let mut state = self.lock();
        if state.active.as_ref().map(|h| h.id) != Some(request_id) {
            debug!("Discarding result of superseded request {}", request_id);
            return Err(ConversationError::Cancelled);
        }
        state.active = None;

        let outcome = match result {
            Ok(reply) if !reply.content.trim().is_empty() => {
                Ok(state.push(Role::Assistant, reply.content.trim().to_string(), false))
            }
            Ok(_) => {
                let turn = state.push(Role::Assistant, MALFORMED_RESPONSE_MESSAGE.to_string(), true);
                Err(ConversationError::MalformedResponse {
                    reason: "empty reply".to_string(),
                    turn,
                })
            }
            Err(BackendError::Malformed(reason)) => {
                warn!("❌ Malformed backend response: {}", reason);
                let turn = state.push(Role::Assistant, MALFORMED_RESPONSE_MESSAGE.to_string(), true);
                Err(ConversationError::MalformedResponse { reason, turn })
            }
            Err(error) => {
                warn!("❌ Backend request failed: {}", error);
                let message = format!(
                    "I apologize, Sir. I'm experiencing technical difficulties: {}",
                    error
                );
                let turn = state.push(Role::Assistant, message, true);
                Err(ConversationError::Backend { error, turn })
            }
        };
        self.publish(&state);
        outcome
    }

    /// Re-send the user message whose answer failed
    ///
    /// No-op (`Ok(None)`) unless the last turn is an error turn and nothing is
    /// in flight. The failed pair is removed before re-sending.
    pub async fn retry_last_message(
        &self,
    ) -> Result<Option<ConversationTurn>, ConversationError> {
        let content = {
            let mut state = self.lock();
            if state.active.is_some() || !state.last_is_error() {
                return Ok(None);
            }
            state.turns.pop();
            let content = match state.turns.last() {
                Some(turn) if turn.role == Role::User => {
                    let content = turn.content.clone();
                    state.turns.pop();
                    content
                }
                _ => {
                    self.publish(&state);
                    return Ok(None);
                }
            };
            self.publish(&state);
            content
        };

        info!("🔁 Retrying: {}", content);
        self.send(&content).await.map(Some)
    }

    /// Cancel any in-flight request and empty the transcript
    pub fn clear(&self) {
        let mut state = self.lock();
        state.cancel_active();
        state.turns.clear();
        self.publish(&state);
        info!("🧹 Conversation cleared");
    }

    /// Cancel the in-flight request without touching the transcript
    pub fn cancel_in_flight(&self) -> bool {
        self.lock().cancel_active()
    }

    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.lock().turns.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ConversationTurn>> {
        self.transcript_tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().active.is_some()
    }

    pub fn can_retry(&self) -> bool {
        let state = self.lock();
        state.active.is_none() && state.last_is_error()
    }

    fn build_request(&self, turns: &[ConversationTurn]) -> ChatRequest {
        let mut window: Vec<ChatMessage> = turns
            .iter()
            .rev()
            .filter(|t| !t.is_error)
            .take(self.settings.context_turns)
            .map(|t| {
                let role = match t.role {
                    Role::User => ChatRole::User,
                    Role::Assistant => ChatRole::Assistant,
                };
                ChatMessage::new(role, t.content.clone())
            })
            .collect();
        window.reverse();

        ChatRequest {
            system_prompt: self.settings.system_prompt.clone(),
            messages: window,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }

    fn publish(&self, state: &Transcript) {
        self.transcript_tx.send_replace(state.turns.clone());
    }

    fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
