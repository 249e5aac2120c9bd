use super::*;

#[tokio::test]
async fn history_is_none_before_first_append() {
    let store = SessionStore::new();
    assert!(store.history("alice").await.is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn append_creates_the_session_and_preserves_order() {
    let store = SessionStore::new();
    store
        .append("alice", "first question".to_string(), "first answer".to_string())
        .await;
    store
        .append("alice", "second question".to_string(), "second answer".to_string())
        .await;

    let history = store.history("alice").await.expect("session should exist");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].question, "first question");
    assert_eq!(history[1].answer, "second answer");
}

#[tokio::test]
async fn sessions_are_isolated_per_user() {
    let store = SessionStore::new();
    store
        .append("alice", "q".to_string(), "a".to_string())
        .await;
    store
        .append("bob", "other q".to_string(), "other a".to_string())
        .await;

    assert_eq!(store.len().await, 2);
    let alice = store.history("alice").await.expect("alice should exist");
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].question, "q");
}

#[tokio::test]
async fn reset_returns_removed_turns_and_clears_the_session() {
    let store = SessionStore::new();
    store
        .append("alice", "q".to_string(), "a".to_string())
        .await;

    let removed = store.reset("alice").await.expect("reset should return turns");
    assert_eq!(removed.len(), 1);
    assert!(store.history("alice").await.is_none());

    // Resetting again is a no-op.
    assert!(store.reset("alice").await.is_none());
}
