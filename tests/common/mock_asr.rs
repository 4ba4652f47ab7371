//! Mock Capture Engine for Testing
//!
//! Lets tests push fragments, errors and end-of-session events into whatever
//! session the controller currently has open.

use async_trait::async_trait;
use jarvis::asr::{AsrResult, CaptureEngine, CaptureErrorKind, CaptureEvent, CaptureSender};
use jarvis::{JarvisError, JarvisResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Mock capture engine driven by the test
pub struct MockCapture {
    /// Sender of the open session, if any
    session: Mutex<Option<CaptureSender>>,
    /// Number of successful `start` calls
    starts: watch::Sender<usize>,
    stops: AtomicUsize,
    /// Fail every `start` as if there were no microphone
    unavailable: AtomicBool,
}

impl MockCapture {
    pub fn new() -> Arc<Self> {
        let (starts, _) = watch::channel(0);
        Arc::new(Self {
            session: Mutex::new(None),
            starts,
            stops: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        let mock = Self::new();
        mock.unavailable.store(true, Ordering::SeqCst);
        mock
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().unwrap().is_some()
    }

    pub fn start_count(&self) -> usize {
        *self.starts.borrow()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Wait until `start` has succeeded at least `count` times
    pub async fn wait_for_starts(&self, count: usize) {
        let mut rx = self.starts.subscribe();
        rx.wait_for(|n| *n >= count)
            .await
            .expect("capture mock dropped");
    }

    /// Deliver an event to the open session; false when none is open
    pub fn emit(&self, event: CaptureEvent) -> bool {
        match self.session.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver a final, fully confident transcript
    pub fn say(&self, text: &str) -> bool {
        self.emit(CaptureEvent::Fragment(AsrResult::final_text(text)))
    }

    pub fn fail(&self, kind: CaptureErrorKind, message: &str) -> bool {
        self.emit(CaptureEvent::Error {
            kind,
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl CaptureEngine for MockCapture {
    async fn start(&self, events: CaptureSender) -> JarvisResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(JarvisError::CaptureUnavailable(
                "no microphone in test".to_string(),
            ));
        }
        *self.session.lock().unwrap() = Some(events);
        self.starts.send_modify(|n| *n += 1);
        Ok(())
    }

    async fn stop(&self) {
        if self.session.lock().unwrap().take().is_some() {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_mock_capture_delivers_to_open_session() {
        let mock = MockCapture::new();
        assert!(!mock.say("ignored"));

        let (tx, mut rx) = mpsc::unbounded_channel();
        mock.start(tx).await.unwrap();
        assert!(mock.say("hello"));
        assert_eq!(
            rx.recv().await,
            Some(CaptureEvent::Fragment(AsrResult::final_text("hello")))
        );

        mock.stop().await;
        assert!(!mock.is_running());
        assert_eq!(mock.start_count(), 1);
        assert_eq!(mock.stop_count(), 1);
    }
}
