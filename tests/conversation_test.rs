use jarvis::commands::{CommandClassifier, Intent};
use jarvis::conversation::{ConversationError, ConversationManager, ConversationSettings, Role};
use jarvis::core::backend::BackendError;
use std::sync::Arc;

mod common;
use common::mock_backend::MockBackend;

fn manager(backend: Arc<MockBackend>) -> Arc<ConversationManager> {
    Arc::new(ConversationManager::new(
        backend,
        CommandClassifier::default(),
        ConversationSettings::default(),
    ))
}

#[tokio::test]
async fn test_new_message_supersedes_in_flight_request() {
    let backend = MockBackend::new();
    let release_first = backend.held_reply("A late joke");
    backend.reply("Once upon a time...");
    let conversation = manager(backend.clone());

    let first = {
        let conversation = Arc::clone(&conversation);
        tokio::spawn(async move { conversation.send("tell me a joke").await })
    };
    backend.wait_for_requests(1).await;
    assert!(conversation.is_busy());

    let second = conversation.send("tell me a story").await.unwrap();
    assert_eq!(second.content, "Once upon a time...");

    let _ = release_first.send(());
    let first = first.await.unwrap();
    assert!(matches!(first, Err(ConversationError::Cancelled)));

    let transcript = conversation.transcript();
    let contents: Vec<&str> = transcript.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["tell me a joke", "tell me a story", "Once upon a time..."]
    );
    assert!(!conversation.is_busy());
}

#[tokio::test]
async fn test_cancel_in_flight_keeps_user_turn() {
    let backend = MockBackend::new();
    let _release = backend.held_reply("never delivered");
    let conversation = manager(backend.clone());

    let pending = {
        let conversation = Arc::clone(&conversation);
        tokio::spawn(async move { conversation.send("what is the meaning of life").await })
    };
    backend.wait_for_requests(1).await;

    assert!(conversation.cancel_in_flight());
    assert!(matches!(
        pending.await.unwrap(),
        Err(ConversationError::Cancelled)
    ));
    let transcript = conversation.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].role, Role::User);
    assert!(!conversation.cancel_in_flight());
}

#[tokio::test]
async fn test_retry_only_after_error() {
    let backend = MockBackend::new();
    backend.reply("Fine, thank you.");
    backend.fail(BackendError::Status {
        status: 503,
        body: "overloaded".to_string(),
    });
    backend.reply("The answer is 42.");
    let conversation = manager(backend.clone());

    conversation.send("how do you feel").await.unwrap();
    assert!(!conversation.can_retry());
    assert_eq!(conversation.retry_last_message().await.unwrap(), None);
    assert_eq!(backend.request_count(), 1);

    let err = conversation
        .send("what is the meaning of life")
        .await
        .unwrap_err();
    assert!(err.turn().is_some_and(|t| t.is_error));
    let err_id = err.turn().map(|t| t.id).unwrap();
    assert!(conversation.can_retry());

    let retried = conversation.retry_last_message().await.unwrap().unwrap();
    assert_eq!(retried.content, "The answer is 42.");

    let transcript = conversation.transcript();
    assert_eq!(transcript.len(), 4);
    assert!(transcript.iter().all(|t| !t.is_error));
    assert_eq!(transcript[2].content, "what is the meaning of life");
    // Re-sent turns get fresh ids, so watchers keyed on the last id see them
    assert!(transcript.windows(2).all(|w| w[0].id < w[1].id));
    assert!(transcript[3].id > err_id);
}

#[tokio::test]
async fn test_clear_cancels_in_flight_request() {
    let backend = MockBackend::new();
    let release = backend.held_reply("A late answer");
    let conversation = manager(backend.clone());
    let mut updates = conversation.subscribe();

    let pending = {
        let conversation = Arc::clone(&conversation);
        tokio::spawn(async move { conversation.send("tell me a joke").await })
    };
    backend.wait_for_requests(1).await;

    conversation.clear();
    assert!(!conversation.is_busy());
    let _ = release.send(());

    assert!(matches!(
        pending.await.unwrap(),
        Err(ConversationError::Cancelled)
    ));
    assert!(conversation.transcript().is_empty());
    assert!(updates.borrow_and_update().is_empty());
    assert!(!conversation.can_retry());
}

#[tokio::test]
async fn test_local_answers_and_clear() {
    let backend = MockBackend::new();
    let conversation = manager(backend.clone());
    let mut updates = conversation.subscribe();

    let turn = conversation
        .respond("what is 6 times 7", &Intent::Calculate {
            expression: "6 * 7".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(turn.content, "The result is 42");
    assert_eq!(backend.request_count(), 0);
    assert_eq!(updates.borrow_and_update().len(), 2);

    conversation.clear();
    assert!(updates.has_changed().unwrap());
    assert!(updates.borrow_and_update().is_empty());
    assert!(!conversation.can_retry());

    let after = conversation.respond("hello", &Intent::Greeting).await.unwrap();
    assert!(after.id > turn.id);
}
