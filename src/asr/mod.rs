//! ASR (Automatic Speech Recognition) Module
//!
//! Capture engines push transcript fragments, errors and end-of-session
//! notifications onto a channel handed to [`CaptureEngine::start`].

pub mod line;

use crate::error::JarvisResult;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::sync::mpsc;

pub use line::{LineCapture, LineFeeder};

/// One recognition result from the capture engine
#[derive(Debug, Clone, PartialEq)]
pub struct AsrResult {
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
}

impl AsrResult {
    /// A final result with full confidence, as produced by typed input
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            confidence: 1.0,
        }
    }

    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            confidence: 0.0,
        }
    }
}

/// A finalized, normalized piece of user speech or typed text
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub raw_text: String,
    pub normalized_text: String,
    pub confidence: f32,
    pub captured_at: DateTime<Local>,
}

impl Utterance {
    pub fn new(raw_text: impl Into<String>, normalized_text: impl Into<String>, confidence: f32) -> Self {
        Self {
            raw_text: raw_text.into(),
            normalized_text: normalized_text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            captured_at: Local::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureErrorKind {
    /// Transient (no speech heard, audio glitch); capture may be restarted
    Recoverable,
    /// Permission denied, device gone, input closed
    Unrecoverable,
}

/// Events emitted by a running capture session
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Fragment(AsrResult),
    Error {
        kind: CaptureErrorKind,
        message: String,
    },
    /// The session ended on its own
    Ended,
}

pub type CaptureSender = mpsc::UnboundedSender<CaptureEvent>;

/// Trait for speech capture engines
#[async_trait]
pub trait CaptureEngine: Send + Sync {
    /// Begin a capture session delivering events on `events`
    ///
    /// Returns [`crate::error::JarvisError::CaptureUnavailable`] when the
    /// platform cannot capture at all.
    async fn start(&self, events: CaptureSender) -> JarvisResult<()>;

    /// End the current session; must be restartable afterwards
    async fn stop(&self);

    /// Get the engine name
    fn name(&self) -> &str;
}
