//! Session store (§9 Design Notes: "Session state"): an explicit store
//! with a lifecycle owner, instead of process-global mutable instances
//! keyed by cookie. Concurrent queries on the same session serialize on a
//! per-session lock (§5); different sessions never block each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::RwLock;

use crate::agent::provider::Message;

/// One chat session: its patient focus and running message history.
/// Wrapped in its own async mutex so a long-running turn on session A never
/// blocks a request on session B.
pub struct Session {
    pub patient_id: Option<String>,
    pub history: Vec<Message>,
}

impl Session {
    fn new() -> Self {
        Self { patient_id: None, history: Vec::new() }
    }
}

/// Keyed by session id (signed cookie or `X-Session-Id` header, §6).
/// New sessions are created lazily on first use.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<AsyncMutex<Session>>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()) }
    }

    /// The per-session lock, created on first access. Hold it for the
    /// duration of one turn so concurrent requests on the same session id
    /// serialize (§5).
    pub async fn get_or_create(&self, session_id: &str) -> Arc<AsyncMutex<Session>> {
        if let Some(existing) = self.sessions.read().await.get(session_id) {
            return Arc::clone(existing);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(Session::new()))))
    }

    /// `POST /reset` (§6): drop a session's history and, optionally, its
    /// patient focus.
    pub async fn reset(&self, session_id: &str, clear_patient: bool) {
        let handle = self.get_or_create(session_id).await;
        let mut session = handle.lock().await;
        session.history.clear();
        if clear_patient {
            session.patient_id = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_are_isolated_by_id() {
        let store = SessionStore::new();
        let a = store.get_or_create("a").await;
        a.lock().await.patient_id = Some("patient-1".to_string());

        let b = store.get_or_create("b").await;
        assert!(b.lock().await.patient_id.is_none());
    }

    #[tokio::test]
    async fn reset_clears_history_but_keeps_patient_by_default() {
        let store = SessionStore::new();
        let handle = store.get_or_create("s1").await;
        {
            let mut session = handle.lock().await;
            session.patient_id = Some("patient-1".to_string());
            session.history.push(Message::user("hi"));
        }

        store.reset("s1", false).await;
        let session = handle.lock().await;
        assert!(session.history.is_empty());
        assert_eq!(session.patient_id.as_deref(), Some("patient-1"));
    }

    #[tokio::test]
    async fn reset_can_also_clear_the_patient_focus() {
        let store = SessionStore::new();
        let handle = store.get_or_create("s1").await;
        handle.lock().await.patient_id = Some("patient-1".to_string());

        store.reset("s1", true).await;
        assert!(handle.lock().await.patient_id.is_none());
    }
}
