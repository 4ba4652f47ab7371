//! Line-based capture engine
//!
//! Treats each line of typed text as a final transcript fragment. Used when no
//! speech recognizer is available and by the CLI, which feeds it from stdin.

use super::{AsrResult, CaptureEngine, CaptureErrorKind, CaptureEvent, CaptureSender};
use crate::error::JarvisResult;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Producer side of a [`LineCapture`]
#[derive(Debug, Clone)]
pub struct LineFeeder {
    tx: mpsc::UnboundedSender<String>,
}

impl LineFeeder {
    /// Queue one line; returns false once the capture engine is gone
    pub fn feed(&self, line: impl Into<String>) -> bool {
        self.tx.send(line.into()).is_ok()
    }
}

/// Capture engine fed with lines of text
///
/// Lines fed while the engine is stopped are kept and delivered on the next
/// `start`. Dropping every [`LineFeeder`] ends the input with an
/// unrecoverable error.
pub struct LineCapture {
    lines: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
    session: Mutex<Option<CancellationToken>>,
}

impl LineCapture {
    pub fn new() -> (Self, LineFeeder) {
        let (tx, rx) = mpsc::unbounded_channel();
        let capture = Self {
            lines: Arc::new(tokio::sync::Mutex::new(rx)),
            session: Mutex::new(None),
        };
        (capture, LineFeeder { tx })
    }

    fn replace_session(&self, next: Option<CancellationToken>) {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = session.take() {
            previous.cancel();
        }
        *session = next;
    }
}

#[async_trait]
impl CaptureEngine for LineCapture {
    async fn start(&self, events: CaptureSender) -> JarvisResult<()> {
        let token = CancellationToken::new();
        self.replace_session(Some(token.clone()));

        let lines = Arc::clone(&self.lines);
        tokio::spawn(async move {
            let mut lines = tokio::select! {
                _ = token.cancelled() => return,
                guard = lines.lock() => guard,
            };
            debug!("⌨️ Line capture session started");

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    line = lines.recv() => match line {
                        Some(line) => {
                            let text = line.trim();
                            if text.is_empty() {
                                continue;
                            }
                            if events.send(CaptureEvent::Fragment(AsrResult::final_text(text))).is_err() {
                                break;
                            }
                        }
                        None => {
                            info!("⌨️ Line input closed");
                            let _ = events.send(CaptureEvent::Error {
                                kind: CaptureErrorKind::Unrecoverable,
                                message: "input closed".to_string(),
                            });
                            break;
                        }
                    },
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) {
        self.replace_session(None);
    }

    fn name(&self) -> &str {
        "line"
    }
}
