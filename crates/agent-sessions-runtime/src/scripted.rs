//! Scripted agent runtime.
//!
//! Stands in for a model-backed runtime: replies come from a [`Responder`]
//! instead of an LLM. Events are written to the session store and streamed to
//! the caller through a channel, the way a real runtime would.
//!
//! With a memory store attached, each fresh invocation first searches memory
//! for the user's message and hands the hits to the responder, and every
//! finished turn is ingested back into memory.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use agent_sessions_core::{
    AgentRuntime, CompactionConfig, ConfigError, Content, Event, EventCompaction, EventStream,
    FunctionResponse, MemoryEntry, MemoryService, Part, Role, RunRequest, RuntimeError, Session,
    SessionError, SessionKey, SessionService, event::USER_AUTHOR,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::approvals::{confirmation_call, confirmation_decision};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A model text message.
    Text(String),
    /// A silent event that writes one state key.
    State(String, Value),
    /// A tool result, as a code executor or function tool would produce.
    ToolResult { name: String, response: Value },
    /// Pause for confirmation. Replies listed after this one are not produced;
    /// the branch matching the decision runs when the invocation resumes.
    Approval {
        hint: String,
        on_approve: Vec<Reply>,
        on_reject: Vec<Reply>,
    },
    /// Fail the submission with a model error.
    Fail(String),
}

impl Reply {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Produces replies for a submitted message.
pub trait Responder: Send + Sync {
    fn respond(&self, session: &Session, message: &Content) -> Vec<Reply>;

    /// Respond with memories recalled for `message` in view.
    ///
    /// Only called when the runtime has a memory store.
    fn respond_with_memories(
        &self,
        session: &Session,
        message: &Content,
        _memories: &[MemoryEntry],
    ) -> Vec<Reply> {
        self.respond(session, message)
    }
}

impl<F> Responder for F
where
    F: Fn(&Session, &Content) -> Vec<Reply> + Send + Sync,
{
    fn respond(&self, session: &Session, message: &Content) -> Vec<Reply> {
        self(session, message)
    }
}

/// Responder that repeats the user's text back.
#[derive(Debug, Default, Clone)]
pub struct EchoResponder;

impl Responder for EchoResponder {
    fn respond(&self, _session: &Session, message: &Content) -> Vec<Reply> {
        let text: Vec<&str> = message.texts().collect();
        vec![Reply::Text(format!("You said: {}", text.join(" ")))]
    }
}

struct PendingApproval {
    key: SessionKey,
    approval_id: String,
    on_approve: Vec<Reply>,
    on_reject: Vec<Reply>,
}

/// Runtime whose replies come from a [`Responder`].
pub struct ScriptedRuntime {
    app_name: String,
    agent_name: String,
    sessions: Arc<dyn SessionService>,
    responder: Arc<dyn Responder>,
    compaction: Option<CompactionConfig>,
    memory: Option<Arc<dyn MemoryService>>,
    pending: Arc<Mutex<HashMap<String, PendingApproval>>>,
}

impl ScriptedRuntime {
    /// Create a runtime that writes to `sessions`.
    #[must_use]
    pub fn new(
        app_name: impl Into<String>,
        sessions: Arc<dyn SessionService>,
        responder: impl Responder + 'static,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            agent_name: "scripted_agent".to_string(),
            sessions,
            responder: Arc::new(responder),
            compaction: None,
            memory: None,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Author name used for produced events.
    #[must_use]
    pub fn with_agent_name(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = agent_name.into();
        self
    }

    /// Enable periodic compaction markers.
    ///
    /// # Errors
    /// Returns error if the config is invalid.
    pub fn with_compaction(mut self, config: CompactionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.compaction = Some(config);
        Ok(self)
    }

    /// Preload memories and save every finished turn to `memory`.
    #[must_use]
    pub fn with_memory(mut self, memory: Arc<dyn MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    fn take_pending(&self, invocation_id: &str) -> Result<PendingApproval, RuntimeError> {
        self.pending
            .lock()
            .map_err(|e| RuntimeError::Internal(e.to_string()))?
            .remove(invocation_id)
            .ok_or_else(|| RuntimeError::UnknownInvocation(invocation_id.to_string()))
    }

    /// Forget pauses left unanswered in `key`; a new message supersedes them.
    fn abandon_pending(&self, key: &SessionKey) -> Result<(), RuntimeError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| RuntimeError::Internal(e.to_string()))?;
        let before = pending.len();
        pending.retain(|_, p| &p.key != key);
        let abandoned = before - pending.len();
        if abandoned > 0 {
            tracing::debug!(%key, abandoned, "Abandoned unanswered confirmations");
        }
        Ok(())
    }

    async fn recall(&self, user_id: &str, message: &Content) -> Result<Vec<MemoryEntry>, RuntimeError> {
        let Some(memory) = &self.memory else {
            return Ok(Vec::new());
        };
        let query = message.texts().collect::<Vec<_>>().join(" ");
        let found = memory.search_memory(&self.app_name, user_id, &query).await?;
        tracing::debug!(user_id, memories = found.memories.len(), "Preloaded memories");
        Ok(found.memories)
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    fn app_name(&self) -> &str {
        &self.app_name
    }

    async fn run(&self, request: RunRequest) -> Result<EventStream, RuntimeError> {
        let key = SessionKey::new(&self.app_name, &request.user_id, &request.session_id);
        let session = self
            .sessions
            .get_session(&key)
            .await?
            .ok_or_else(|| SessionError::NotFound(key.clone()))?;

        let (invocation_id, replies, resumed) = match request.invocation_id {
            Some(invocation_id) => {
                let pending = self.take_pending(&invocation_id)?;
                let approved = match confirmation_decision(&request.new_message) {
                    Some((id, confirmed)) if id == pending.approval_id => confirmed,
                    _ => {
                        tracing::warn!(%invocation_id, "Resume message does not answer the pending confirmation");
                        false
                    }
                };
                let replies = if approved {
                    pending.on_approve
                } else {
                    pending.on_reject
                };
                (invocation_id, replies, true)
            }
            None => {
                self.abandon_pending(&key)?;
                let replies = if self.memory.is_some() {
                    let memories = self.recall(&request.user_id, &request.new_message).await?;
                    self.responder
                        .respond_with_memories(&session, &request.new_message, &memories)
                } else {
                    self.responder.respond(&session, &request.new_message)
                };
                (Uuid::new_v4().to_string(), replies, false)
            }
        };

        tracing::debug!(%key, %invocation_id, resumed, replies = replies.len(), "Running invocation");

        let user_event =
            Event::new(&invocation_id, USER_AUTHOR).with_content(request.new_message);
        self.sessions.append_event(&key, user_event).await?;

        let (tx, rx) = mpsc::channel(32);
        let producer = Producer {
            key,
            invocation_id,
            agent_name: self.agent_name.clone(),
            sessions: Arc::clone(&self.sessions),
            pending: Arc::clone(&self.pending),
            compaction: if resumed { None } else { self.compaction },
            memory: self.memory.clone(),
            tx,
        };
        tokio::spawn(async move {
            if let Err(e) = producer.produce(replies).await {
                tracing::warn!("Invocation failed: {e}");
                let _ = producer.tx.send(Err(e)).await;
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// Background task state for one invocation.
struct Producer {
    key: SessionKey,
    invocation_id: String,
    agent_name: String,
    sessions: Arc<dyn SessionService>,
    pending: Arc<Mutex<HashMap<String, PendingApproval>>>,
    compaction: Option<CompactionConfig>,
    memory: Option<Arc<dyn MemoryService>>,
    tx: mpsc::Sender<Result<Event, RuntimeError>>,
}

impl Producer {
    async fn produce(&self, replies: Vec<Reply>) -> Result<(), RuntimeError> {
        let paused = self.emit_replies(replies).await?;
        if let (false, Some(config)) = (paused, self.compaction) {
            self.maybe_compact(config).await?;
        }
        if let Some(memory) = &self.memory {
            self.save_to_memory(memory.as_ref()).await?;
        }
        Ok(())
    }

    /// Emit replies in order. Returns `true` when the invocation paused.
    async fn emit_replies(&self, replies: Vec<Reply>) -> Result<bool, RuntimeError> {
        let mut replies = replies.into_iter();
        while let Some(reply) = replies.next() {
            let event = Event::new(&self.invocation_id, &self.agent_name);
            let event = match reply {
                Reply::Text(text) => event.with_content(Content::model_text(text)),
                Reply::State(key, value) => event.with_state(key, value),
                Reply::ToolResult { name, response } => event.with_content(Content {
                    role: Role::Model,
                    parts: vec![Part::function_response(FunctionResponse {
                        id: Uuid::new_v4().to_string(),
                        name,
                        response,
                    })],
                }),
                Reply::Approval {
                    hint,
                    on_approve,
                    on_reject,
                } => {
                    let approval_id = Uuid::new_v4().to_string();
                    self.pending
                        .lock()
                        .map_err(|e| RuntimeError::Internal(e.to_string()))?
                        .insert(
                            self.invocation_id.clone(),
                            PendingApproval {
                                key: self.key.clone(),
                                approval_id: approval_id.clone(),
                                on_approve,
                                on_reject,
                            },
                        );
                    let skipped = replies.len();
                    if skipped > 0 {
                        tracing::warn!(skipped, "Replies after an approval request are dropped");
                    }
                    let event = event.with_content(Content {
                        role: Role::Model,
                        parts: vec![Part::function_call(confirmation_call(approval_id, &hint))],
                    });
                    self.emit(event).await?;
                    return Ok(true);
                }
                Reply::Fail(message) => return Err(RuntimeError::Model(message)),
            };
            self.emit(event).await?;
        }
        Ok(false)
    }

    async fn save_to_memory(&self, memory: &dyn MemoryService) -> Result<(), RuntimeError> {
        let session = self
            .sessions
            .get_session(&self.key)
            .await?
            .ok_or_else(|| SessionError::NotFound(self.key.clone()))?;
        memory.add_session_to_memory(&session).await?;
        tracing::debug!(key = %self.key, events = session.events.len(), "Saved turn to memory");
        Ok(())
    }

    async fn emit(&self, event: Event) -> Result<(), RuntimeError> {
        let event = self.sessions.append_event(&self.key, event).await?;
        // A dropped receiver only means the caller stopped listening.
        let _ = self.tx.send(Ok(event)).await;
        Ok(())
    }

    async fn maybe_compact(&self, config: CompactionConfig) -> Result<(), RuntimeError> {
        let session = self
            .sessions
            .get_session(&self.key)
            .await?
            .ok_or_else(|| SessionError::NotFound(self.key.clone()))?;

        let invocations = invocation_order(&session.events);
        if invocations.is_empty() || invocations.len() % config.compaction_interval != 0 {
            return Ok(());
        }

        let window_start = invocations
            .len()
            .saturating_sub(config.compaction_interval + config.overlap_size);
        let window: HashSet<&str> = invocations[window_start..].iter().copied().collect();
        let covered: Vec<&Event> = session
            .events
            .iter()
            .filter(|e| !e.is_compaction() && window.contains(e.invocation_id.as_str()))
            .collect();

        let (Some(first), Some(last)) = (covered.first(), covered.last()) else {
            return Ok(());
        };
        let summary = covered
            .iter()
            .filter_map(|e| {
                let text: Vec<&str> = e.content.as_ref()?.texts().collect();
                (!text.is_empty()).then(|| format!("{}: {}", e.author, text.join(" ")))
            })
            .collect::<Vec<_>>()
            .join("\n");

        tracing::info!(key = %self.key, invocations = window.len(), "Compacting events");

        let mut event = Event::new(&self.invocation_id, &self.agent_name);
        event.actions.compaction = Some(EventCompaction {
            start_timestamp: first.timestamp,
            end_timestamp: last.timestamp,
            compacted_content: Content::model_text(summary),
        });
        self.emit(event).await
    }
}

/// Distinct invocation ids in first-seen order, ignoring compaction markers.
fn invocation_order(events: &[Event]) -> Vec<&str> {
    let mut seen = HashSet::new();
    events
        .iter()
        .filter(|e| !e.is_compaction())
        .map(|e| e.invocation_id.as_str())
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as Map;

    use agent_sessions_core::{MemoryError, SearchMemoryResponse, SessionService};
    use futures::TryStreamExt;
    use serde_json::json;

    use super::*;
    use crate::approvals::{check_for_approval, create_approval_response};

    /// Minimal store for exercising the runtime in isolation.
    #[derive(Default)]
    struct TestStore {
        sessions: Mutex<Map<SessionKey, Session>>,
    }

    #[async_trait]
    impl SessionService for TestStore {
        async fn create_session(
            &self,
            key: &SessionKey,
            state: Map<String, Value>,
        ) -> Result<Session, SessionError> {
            let session = Session::new(key, state);
            self.sessions
                .lock()
                .unwrap()
                .insert(key.clone(), session.clone());
            Ok(session)
        }

        async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>, SessionError> {
            Ok(self.sessions.lock().unwrap().get(key).cloned())
        }

        async fn append_event(&self, key: &SessionKey, event: Event) -> Result<Event, SessionError> {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get_mut(key)
                .ok_or_else(|| SessionError::NotFound(key.clone()))?;
            session.apply_event(event.clone());
            Ok(event)
        }

        async fn list_sessions(
            &self,
            _app_name: &str,
            _user_id: &str,
        ) -> Result<Vec<SessionKey>, SessionError> {
            Ok(self.sessions.lock().unwrap().keys().cloned().collect())
        }
    }

    /// Memory store that remembers every user message it was shown.
    #[derive(Default)]
    struct TestMemory {
        saved: Mutex<Vec<Session>>,
    }

    #[async_trait]
    impl MemoryService for TestMemory {
        async fn add_session_to_memory(&self, session: &Session) -> Result<(), MemoryError> {
            self.saved.lock().unwrap().push(session.clone());
            Ok(())
        }

        async fn search_memory(
            &self,
            _app_name: &str,
            _user_id: &str,
            _query: &str,
        ) -> Result<SearchMemoryResponse, MemoryError> {
            let saved = self.saved.lock().unwrap();
            let memories = saved
                .last()
                .into_iter()
                .flat_map(|s| s.events.iter())
                .filter(|e| e.author == USER_AUTHOR)
                .filter_map(|e| {
                    Some(MemoryEntry {
                        author: e.author.clone(),
                        content: e.content.clone()?,
                        timestamp: e.timestamp,
                    })
                })
                .collect();
            Ok(SearchMemoryResponse { memories })
        }
    }

    /// Reports how many memories it was given.
    struct CountingResponder;

    impl Responder for CountingResponder {
        fn respond(&self, _session: &Session, _message: &Content) -> Vec<Reply> {
            vec![Reply::text("no memory attached")]
        }

        fn respond_with_memories(
            &self,
            _session: &Session,
            _message: &Content,
            memories: &[MemoryEntry],
        ) -> Vec<Reply> {
            vec![Reply::Text(format!("{} memories", memories.len()))]
        }
    }

    fn first_text(events: &[Event]) -> Option<&str> {
        events.first()?.content.as_ref()?.first_text()
    }

    async fn setup(responder: impl Responder + 'static) -> (Arc<TestStore>, ScriptedRuntime) {
        let store = Arc::new(TestStore::default());
        store
            .create_session(&SessionKey::new("app", "user", "s1"), Map::new())
            .await
            .unwrap();
        let runtime = ScriptedRuntime::new("app", store.clone(), responder);
        (store, runtime)
    }

    async fn submit(runtime: &ScriptedRuntime, text: &str) -> Result<Vec<Event>, RuntimeError> {
        let stream = runtime
            .run(RunRequest::new("user", "s1", Content::user_text(text)))
            .await?;
        stream.try_collect().await
    }

    #[tokio::test]
    async fn test_echo_records_user_and_model_events() {
        let (store, runtime) = setup(EchoResponder).await;
        let events = submit(&runtime, "hello").await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].content.as_ref().unwrap().first_text(),
            Some("You said: hello")
        );

        let session = store
            .get_session(&SessionKey::new("app", "user", "s1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.events.len(), 2);
        assert_eq!(session.events[0].author, USER_AUTHOR);
        assert_eq!(session.events[0].invocation_id, session.events[1].invocation_id);
    }

    #[tokio::test]
    async fn test_missing_session_fails_before_streaming() {
        let store: Arc<TestStore> = Arc::new(TestStore::default());
        let runtime = ScriptedRuntime::new("app", store, EchoResponder);
        let result = runtime
            .run(RunRequest::new("user", "nope", Content::user_text("hi")))
            .await;
        assert!(matches!(result, Err(RuntimeError::Session(SessionError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_fail_reply_surfaces_in_stream() {
        let responder = |_: &Session, _: &Content| {
            vec![Reply::text("partial"), Reply::Fail("quota exceeded".to_string())]
        };
        let (_store, runtime) = setup(responder).await;
        let err = submit(&runtime, "hi").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Model(msg) if msg == "quota exceeded"));
    }

    #[tokio::test]
    async fn test_state_reply_updates_session_state() {
        let responder =
            |_: &Session, _: &Content| vec![Reply::State("user:name".to_string(), json!("Sam"))];
        let (store, runtime) = setup(responder).await;
        submit(&runtime, "My name is Sam").await.unwrap();

        let session = store
            .get_session(&SessionKey::new("app", "user", "s1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state.get("user:name"), Some(&json!("Sam")));
    }

    #[tokio::test]
    async fn test_approval_pauses_and_resumes() {
        let responder = |_: &Session, _: &Content| {
            vec![
                Reply::Approval {
                    hint: "Ship it?".to_string(),
                    on_approve: vec![Reply::text("Shipped")],
                    on_reject: vec![Reply::text("Cancelled")],
                },
                Reply::text("never produced"),
            ]
        };
        let (_store, runtime) = setup(responder).await;

        let events = submit(&runtime, "ship 5 containers").await.unwrap();
        assert_eq!(events.len(), 1);
        let request = check_for_approval(&events).unwrap();

        let resumed: Vec<Event> = runtime
            .run(
                RunRequest::new("user", "s1", create_approval_response(&request, false))
                    .resuming(&request.invocation_id),
            )
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].invocation_id, request.invocation_id);
        assert_eq!(
            resumed[0].content.as_ref().unwrap().first_text(),
            Some("Cancelled")
        );

        // The pause is consumed by the first answer.
        let again = runtime
            .run(
                RunRequest::new("user", "s1", create_approval_response(&request, true))
                    .resuming(&request.invocation_id),
            )
            .await;
        assert!(matches!(again, Err(RuntimeError::UnknownInvocation(_))));
    }

    #[tokio::test]
    async fn test_new_message_abandons_unanswered_confirmation() {
        let responder = |_: &Session, message: &Content| match message.first_text() {
            Some("ship") => vec![Reply::Approval {
                hint: "Ship it?".to_string(),
                on_approve: vec![Reply::text("Shipped")],
                on_reject: vec![Reply::text("Cancelled")],
            }],
            _ => vec![Reply::text("ok")],
        };
        let (_store, runtime) = setup(responder).await;

        let events = submit(&runtime, "ship").await.unwrap();
        let request = check_for_approval(&events).unwrap();
        assert_eq!(runtime.pending.lock().unwrap().len(), 1);

        submit(&runtime, "never mind").await.unwrap();
        assert!(runtime.pending.lock().unwrap().is_empty());

        let late = runtime
            .run(
                RunRequest::new("user", "s1", create_approval_response(&request, true))
                    .resuming(&request.invocation_id),
            )
            .await;
        assert!(matches!(late, Err(RuntimeError::UnknownInvocation(_))));
    }

    #[tokio::test]
    async fn test_memory_is_preloaded_and_each_turn_saved() {
        let memory = Arc::new(TestMemory::default());
        let (_store, runtime) = setup(CountingResponder).await;
        let runtime = runtime.with_memory(memory.clone());

        let first = submit(&runtime, "I gifted a toy").await.unwrap();
        assert_eq!(first_text(&first), Some("0 memories"));
        {
            let saved = memory.saved.lock().unwrap();
            assert_eq!(saved.len(), 1);
            assert_eq!(saved[0].events.len(), 2);
        }

        let second = submit(&runtime, "What did I gift?").await.unwrap();
        assert_eq!(first_text(&second), Some("1 memories"));
        assert_eq!(memory.saved.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_without_memory_responder_is_called_plainly() {
        let (_store, runtime) = setup(CountingResponder).await;
        let events = submit(&runtime, "hi").await.unwrap();
        assert_eq!(first_text(&events), Some("no memory attached"));
    }

    #[tokio::test]
    async fn test_compaction_marker_after_interval() {
        let (store, runtime) = setup(EchoResponder).await;
        let runtime = runtime
            .with_compaction(CompactionConfig {
                compaction_interval: 2,
                overlap_size: 0,
            })
            .unwrap();

        let first = submit(&runtime, "one").await.unwrap();
        assert!(first.iter().all(|e| !e.is_compaction()));

        let second = submit(&runtime, "two").await.unwrap();
        let marker = second.iter().find(|e| e.is_compaction()).unwrap();
        let compaction = marker.actions.compaction.as_ref().unwrap();
        let summary = compaction.compacted_content.first_text().unwrap();
        assert!(summary.contains("user: one"));
        assert!(summary.contains("You said: two"));

        let session = store
            .get_session(&SessionKey::new("app", "user", "s1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.events.iter().filter(|e| e.is_compaction()).count(), 1);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let store: Arc<TestStore> = Arc::new(TestStore::default());
        let runtime = ScriptedRuntime::new("app", store, EchoResponder);
        let result = runtime.with_compaction(CompactionConfig {
            compaction_interval: 0,
            overlap_size: 0,
        });
        assert!(result.is_err());
    }
}
