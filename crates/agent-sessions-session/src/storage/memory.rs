//! In-memory session storage.

use std::{collections::HashMap, sync::RwLock};

use agent_sessions_core::{Event, Session, SessionError, SessionKey, SessionService};
use async_trait::async_trait;
use serde_json::Value;

/// In-memory session store.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
pub struct InMemorySessionService {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl InMemorySessionService {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        key: &SessionKey,
        state: HashMap<String, Value>,
    ) -> Result<Session, SessionError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| SessionError::Internal(e.to_string()))?;

        if sessions.contains_key(key) {
            return Err(SessionError::AlreadyExists(key.clone()));
        }

        let session = Session::new(key, state);
        sessions.insert(key.clone(), session.clone());
        tracing::debug!(%key, "Created in-memory session");

        Ok(session)
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>, SessionError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| SessionError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn append_event(&self, key: &SessionKey, event: Event) -> Result<Event, SessionError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| SessionError::Internal(e.to_string()))?;

        let session = sessions
            .get_mut(key)
            .ok_or_else(|| SessionError::NotFound(key.clone()))?;

        session.apply_event(event.clone());

        Ok(event)
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<SessionKey>, SessionError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| SessionError::Internal(e.to_string()))?;

        let mut keys: Vec<SessionKey> = sessions
            .keys()
            .filter(|k| k.app_name == app_name && k.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.session_id.cmp(&b.session_id));

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use agent_sessions_core::Content;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_create_then_duplicate_fails() {
        let store = InMemorySessionService::new();
        let key = SessionKey::new("app", "user", "s1");

        let session = store.create_session(&key, HashMap::new()).await.unwrap();
        assert_eq!(session.id, "s1");

        let err = store.create_session(&key, HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists(k) if k == key));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = InMemorySessionService::new();
        let found = store
            .get_session(&SessionKey::new("app", "user", "missing"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_append_event_applies_state() {
        let store = InMemorySessionService::new();
        let key = SessionKey::new("app", "user", "s1");
        store.create_session(&key, HashMap::new()).await.unwrap();

        let event = Event::new("inv", "agent")
            .with_content(Content::model_text("saved"))
            .with_state("user:country", json!("Poland"));
        store.append_event(&key, event).await.unwrap();

        let session = store.get_session(&key).await.unwrap().unwrap();
        assert_eq!(session.events.len(), 1);
        assert_eq!(session.state.get("user:country"), Some(&json!("Poland")));
    }

    #[tokio::test]
    async fn test_append_to_missing_session_fails() {
        let store = InMemorySessionService::new();
        let err = store
            .append_event(&SessionKey::new("app", "user", "nope"), Event::new("inv", "agent"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_app_and_user() {
        let store = InMemorySessionService::new();
        for (app, user, id) in [("app", "u1", "b"), ("app", "u1", "a"), ("app", "u2", "c"), ("other", "u1", "d")] {
            store
                .create_session(&SessionKey::new(app, user, id), HashMap::new())
                .await
                .unwrap();
        }

        let keys = store.list_sessions("app", "u1").await.unwrap();
        let ids: Vec<&str> = keys.iter().map(|k| k.session_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
