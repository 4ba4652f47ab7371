//! Jarvis Error Types
//!
//! Centralized error handling for the voice controller and its adapters.

use crate::core::backend::BackendError;
use thiserror::Error;

/// Central error type for Jarvis
#[derive(Error, Debug)]
pub enum JarvisError {
    /// The platform has no speech capture; the assistant falls back to typed input.
    #[error("Speech capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Speech capture error: {message}")]
    Capture { recoverable: bool, message: String },

    #[error("Conversation backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Voice controller is no longer running")]
    ControllerStopped,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Jarvis operations
pub type JarvisResult<T> = Result<T, JarvisError>;

impl JarvisError {
    /// Whether the capture collaborator can be restarted after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            JarvisError::Capture {
                recoverable: true,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_capture_error() {
        let err = JarvisError::Capture {
            recoverable: true,
            message: "no-speech".into(),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "Speech capture error: no-speech");
    }

    #[test]
    fn test_backend_error_conversion() {
        let err: JarvisError = BackendError::Transport("connection refused".into()).into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("connection refused"));
    }
}
