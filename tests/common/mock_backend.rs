//! Mock Chat Backend for Testing
//!
//! Answers from a script; individual replies can be held back until the test
//! releases them.

use async_trait::async_trait;
use jarvis::core::backend::{ChatBackend, ChatReply, ChatRequest, BackendError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch};

struct Step {
    gate: Option<oneshot::Receiver<()>>,
    result: Result<ChatReply, BackendError>,
}

/// Backend answering from a fixed script
pub struct MockBackend {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
    received: watch::Sender<usize>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        let (received, _) = watch::channel(0);
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            received,
        })
    }

    fn push(&self, gate: Option<oneshot::Receiver<()>>, result: Result<ChatReply, BackendError>) {
        self.script.lock().unwrap().push_back(Step { gate, result });
    }

    pub fn reply(&self, text: &str) {
        self.push(
            None,
            Ok(ChatReply {
                content: text.to_string(),
            }),
        );
    }

    pub fn fail(&self, error: BackendError) {
        self.push(None, Err(error));
    }

    /// Queue a reply that is only returned once the sender fires
    pub fn held_reply(&self, text: &str) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.push(
            Some(gate),
            Ok(ChatReply {
                content: text.to_string(),
            }),
        );
        release
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        *self.received.borrow()
    }

    /// Wait until at least `count` requests have arrived
    pub async fn wait_for_requests(&self, count: usize) {
        let mut rx = self.received.subscribe();
        rx.wait_for(|n| *n >= count)
            .await
            .expect("backend mock dropped");
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        self.received.send_modify(|n| *n += 1);

        let step = self.script.lock().unwrap().pop_front();
        let Some(step) = step else {
            return Err(BackendError::Transport("script exhausted".to_string()));
        };
        if let Some(gate) = step.gate {
            let _ = gate.await;
        }
        step.result
    }

    fn name(&self) -> &str {
        "mock"
    }
}
