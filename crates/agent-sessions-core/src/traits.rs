//! Core traits for the runtime, session and memory collaborators.

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::event::{Content, Event, now};

/// State keys with this prefix live for one invocation and are never stored.
pub const TEMP_STATE_PREFIX: &str = "temp:";

/// Identifies a session: (application, user, session id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    #[must_use]
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

/// A stored conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    /// Keyed values written by tools and agents.
    #[serde(default)]
    pub state: HashMap<String, Value>,
    /// Ordered event history.
    #[serde(default)]
    pub events: Vec<Event>,
    /// Last update timestamp (Unix epoch seconds).
    pub last_update_time: i64,
}

impl Session {
    /// Create an empty session for `key`.
    #[must_use]
    pub fn new(key: &SessionKey, state: HashMap<String, Value>) -> Self {
        let mut session = Self {
            id: key.session_id.clone(),
            app_name: key.app_name.clone(),
            user_id: key.user_id.clone(),
            state: HashMap::new(),
            events: Vec::new(),
            last_update_time: now(),
        };
        session.merge_state(state);
        session
    }

    /// The key this session is stored under.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.app_name, &self.user_id, &self.id)
    }

    /// Append an event and merge its state delta.
    pub fn apply_event(&mut self, event: Event) {
        self.merge_state(event.actions.state_delta.clone());
        self.last_update_time = event.timestamp.max(self.last_update_time);
        self.events.push(event);
    }

    fn merge_state(&mut self, delta: HashMap<String, Value>) {
        self.state.extend(
            delta
                .into_iter()
                .filter(|(k, _)| !k.starts_with(TEMP_STATE_PREFIX)),
        );
    }
}

/// Session store error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session already exists: {0}")]
    AlreadyExists(SessionKey),
    #[error("Session not found: {0}")]
    NotFound(SessionKey),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for session store backends.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session.
    ///
    /// Fails with [`SessionError::AlreadyExists`] when the key is taken.
    async fn create_session(
        &self,
        key: &SessionKey,
        state: HashMap<String, Value>,
    ) -> Result<Session, SessionError>;

    /// Get a session by key.
    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>, SessionError>;

    /// Append an event to a session's history.
    async fn append_event(&self, key: &SessionKey, event: Event) -> Result<Event, SessionError>;

    /// List session keys for an (application, user) pair.
    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<SessionKey>, SessionError>;
}

/// Runtime error.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
    #[error("Model request failed: {0}")]
    Model(String),
    #[error("No paused invocation: {0}")]
    UnknownInvocation(String),
    #[error("Runtime error: {0}")]
    Internal(String),
}

/// Stream of events produced for one submission.
pub type EventStream = BoxStream<'static, Result<Event, RuntimeError>>;

/// One submission into a conversation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub user_id: String,
    pub session_id: String,
    pub new_message: Content,
    /// Resume a paused invocation instead of starting a new one.
    pub invocation_id: Option<String>,
}

impl RunRequest {
    #[must_use]
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>, new_message: Content) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            new_message,
            invocation_id: None,
        }
    }

    /// Target an existing invocation.
    #[must_use]
    pub fn resuming(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = Some(invocation_id.into());
        self
    }
}

/// Trait for agent runtimes.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Application name sessions are scoped under.
    fn app_name(&self) -> &str;

    /// Submit a message and stream the events it produces.
    async fn run(&self, request: RunRequest) -> Result<EventStream, RuntimeError>;
}

/// One searchable memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub author: String,
    pub content: Content,
    pub timestamp: i64,
}

/// Memory search result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchMemoryResponse {
    pub memories: Vec<MemoryEntry>,
}

/// Memory store error.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Memory error: {0}")]
    Internal(String),
}

/// Trait for long-term memory backends.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Ingest a completed session's events.
    async fn add_session_to_memory(&self, session: &Session) -> Result<(), MemoryError>;

    /// Search memories for an (application, user) pair.
    async fn search_memory(
        &self,
        app_name: &str,
        user_id: &str,
        query: &str,
    ) -> Result<SearchMemoryResponse, MemoryError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let key = SessionKey::new("app", "user", "s1");
        let session = Session::new(&key, HashMap::new());
        assert_eq!(session.id, "s1");
        assert!(session.events.is_empty());
        assert_eq!(session.key(), key);
    }

    #[test]
    fn test_apply_event_merges_state_and_drops_temp_keys() {
        let key = SessionKey::new("app", "user", "s1");
        let mut session = Session::new(&key, HashMap::new());

        let event = Event::new("inv", "agent")
            .with_state("user:name", json!("Sam"))
            .with_state("temp:scratch", json!(1));
        session.apply_event(event);

        assert_eq!(session.state.get("user:name"), Some(&json!("Sam")));
        assert!(!session.state.contains_key("temp:scratch"));
        assert_eq!(session.events.len(), 1);
    }

    #[test]
    fn test_initial_state_drops_temp_keys() {
        let key = SessionKey::new("app", "user", "s1");
        let state = HashMap::from([
            ("temp:x".to_string(), json!(true)),
            ("app:theme".to_string(), json!("dark")),
        ]);
        let session = Session::new(&key, state);
        assert_eq!(session.state.len(), 1);
    }

    #[test]
    fn test_session_key_display() {
        let key = SessionKey::new("app", "user", "s1");
        assert_eq!(key.to_string(), "app/user/s1");
    }
}
