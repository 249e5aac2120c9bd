// Sessions module
// Per-user in-memory chat history

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// In-memory chat histories keyed by caller-supplied user id.
///
/// Sessions appear on first append and live until explicitly reset; there is
/// no expiry and no persistence across restarts.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Vec<ChatTurn>>>,
}

impl SessionStore {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn to the user's session, creating it if absent.
    #[inline]
    pub async fn append(&self, user_id: &str, question: String, answer: String) {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user_id.to_string())
            .or_default()
            .push(ChatTurn { question, answer });
    }

    /// The user's history, oldest first. `None` when the user has no
    /// session.
    #[inline]
    pub async fn history(&self, user_id: &str) -> Option<Vec<ChatTurn>> {
        let sessions = self.sessions.read().await;
        sessions.get(user_id).cloned()
    }

    /// Drop the user's session, returning the removed turns.
    ///
    /// Resetting an unknown user is a no-op that returns `None`.
    #[inline]
    pub async fn reset(&self, user_id: &str) -> Option<Vec<ChatTurn>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(user_id);
        if removed.is_some() {
            debug!("Reset session for user {user_id}");
        }
        removed
    }

    /// Number of live sessions.
    #[inline]
    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
