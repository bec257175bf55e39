//! Session orchestrator: resolves named sessions and dispatches queries.

use std::{
    collections::HashMap,
    io::{self, Write},
    sync::{Arc, Mutex},
};

use agent_sessions_core::{
    AgentRuntime, Content, Event, OrchestratorConfig, RunRequest, RuntimeError, Session,
    SessionError, SessionKey, SessionService,
};
use agent_sessions_runtime::{
    ApprovalError, ApprovalHandler, ApprovalRequest, check_for_approval, create_approval_response,
};
use futures::TryStreamExt;

use crate::printer::EventPrinter;

/// Orchestrator error.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),
    #[error("Session not found: {0}")]
    SessionNotFound(SessionKey),
    #[error("Output error: {0}")]
    Output(#[from] io::Error),
    #[error("Output unavailable: {0}")]
    OutputPoisoned(String),
}

/// How a session was resolved.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The session did not exist and was created.
    Created(Session),
    /// The session already existed.
    Found(Session),
}

impl Resolution {
    #[must_use]
    pub const fn session(&self) -> &Session {
        match self {
            Self::Created(session) | Self::Found(session) => session,
        }
    }

    #[must_use]
    pub fn into_session(self) -> Session {
        match self {
            Self::Created(session) | Self::Found(session) => session,
        }
    }

    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Ordered user queries, from one string or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Queries(Vec<String>);

impl Queries {
    #[must_use]
    pub const fn none() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl IntoIterator for Queries {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<&str> for Queries {
    fn from(query: &str) -> Self {
        Self(vec![query.to_string()])
    }
}

impl From<String> for Queries {
    fn from(query: String) -> Self {
        Self(vec![query])
    }
}

impl From<Vec<String>> for Queries {
    fn from(queries: Vec<String>) -> Self {
        Self(queries)
    }
}

impl From<Vec<&str>> for Queries {
    fn from(queries: Vec<&str>) -> Self {
        Self(queries.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Queries {
    fn from(queries: [&str; N]) -> Self {
        Self(queries.into_iter().map(str::to_string).collect())
    }
}

/// Result of one [`SessionOrchestrator::run_session`] call.
#[derive(Debug, Clone)]
pub struct SessionRun {
    pub session_id: String,
    /// Whether the session was created by this call.
    pub created: bool,
    /// Events produced by the runtime, in order.
    pub events: Vec<Event>,
}

/// How an approval workflow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The runtime never asked for confirmation.
    NotRequired,
    Approved,
    Rejected,
}

/// Result of one [`SessionOrchestrator::run_approval_workflow`] call.
#[derive(Debug, Clone)]
pub struct ApprovalRun {
    pub outcome: ApprovalOutcome,
    pub request: Option<ApprovalRequest>,
    /// Events from the initial submission and the resumed invocation.
    pub events: Vec<Event>,
}

/// Drives named sessions through an agent runtime.
///
/// Queries are submitted strictly one at a time: each response stream is
/// drained before the next query goes out.
pub struct SessionOrchestrator<R, S>
where
    R: AgentRuntime,
    S: SessionService + ?Sized,
{
    runtime: R,
    sessions: Arc<S>,
    config: OrchestratorConfig,
    printer: EventPrinter,
    output: Mutex<Box<dyn Write + Send>>,
}

impl<R, S> SessionOrchestrator<R, S>
where
    R: AgentRuntime,
    S: SessionService + ?Sized,
{
    /// Create an orchestrator printing to stdout.
    #[must_use]
    pub fn new(runtime: R, sessions: Arc<S>, config: OrchestratorConfig) -> Self {
        let printer = EventPrinter::fixed(&config.model_name);
        Self {
            runtime,
            sessions,
            config,
            printer,
            output: Mutex::new(Box::new(io::stdout())),
        }
    }

    /// Send the transcript to `output` instead of stdout.
    #[must_use]
    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Mutex::new(Box::new(output));
        self
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    #[must_use]
    pub const fn runtime(&self) -> &R {
        &self.runtime
    }

    #[must_use]
    pub const fn sessions(&self) -> &Arc<S> {
        &self.sessions
    }

    /// Key of `session_id` under this orchestrator's app and user.
    #[must_use]
    pub fn session_key(&self, session_id: &str) -> SessionKey {
        SessionKey::new(self.runtime.app_name(), &self.config.user_id, session_id)
    }

    fn write_with<F>(&self, f: F) -> Result<(), OrchestratorError>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let mut out = self
            .output
            .lock()
            .map_err(|e| OrchestratorError::OutputPoisoned(e.to_string()))?;
        f(&mut **out)?;
        out.flush()?;
        Ok(())
    }

    /// Create the session, or fetch it if it already exists.
    ///
    /// Only [`SessionError::AlreadyExists`] falls back to fetching; any other
    /// creation error is returned.
    ///
    /// # Errors
    /// Returns error if creation fails for another reason, or the session
    /// vanished between the two steps.
    pub async fn resolve_session(&self, session_id: &str) -> Result<Resolution, OrchestratorError> {
        let key = self.session_key(session_id);

        match self.sessions.create_session(&key, HashMap::new()).await {
            Ok(session) => {
                tracing::info!(%key, "Created session");
                Ok(Resolution::Created(session))
            }
            Err(SessionError::AlreadyExists(_)) => {
                let session = self
                    .sessions
                    .get_session(&key)
                    .await?
                    .ok_or_else(|| OrchestratorError::SessionNotFound(key.clone()))?;
                tracing::debug!(%key, events = session.events.len(), "Resumed existing session");
                Ok(Resolution::Found(session))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run queries against the session named `session_name`.
    ///
    /// Prints a session header, then `User > {query}` and the model's text
    /// for each query. With no queries, prints `No queries!` and returns.
    ///
    /// # Errors
    /// Returns error if resolution or any submission fails. Queries after a
    /// failed one are not sent.
    pub async fn run_session(
        &self,
        queries: impl Into<Queries> + Send,
        session_name: &str,
    ) -> Result<SessionRun, OrchestratorError> {
        self.write_with(|out| writeln!(out, "\n ### Session: {session_name}"))?;

        let resolution = self.resolve_session(session_name).await?;
        let created = resolution.is_created();
        let session_id = resolution.into_session().id;

        let queries = queries.into();
        if queries.is_empty() {
            self.write_with(|out| writeln!(out, "No queries!"))?;
            tracing::info!(%session_id, "No queries supplied, nothing to do");
            return Ok(SessionRun {
                session_id,
                created,
                events: Vec::new(),
            });
        }

        let mut events = Vec::new();
        for query in queries {
            events.extend(self.dispatch_query(&session_id, &query).await?);
        }

        Ok(SessionRun {
            session_id,
            created,
            events,
        })
    }

    /// Run queries against the configured default session.
    ///
    /// # Errors
    /// See [`Self::run_session`].
    pub async fn run_default(
        &self,
        queries: impl Into<Queries> + Send,
    ) -> Result<SessionRun, OrchestratorError> {
        let session_name = self.config.session_name.clone();
        self.run_session(queries, &session_name).await
    }

    /// Print and submit one query as a user message.
    ///
    /// # Errors
    /// Returns error if the submission fails.
    pub async fn dispatch_query(
        &self,
        session_id: &str,
        query: &str,
    ) -> Result<Vec<Event>, OrchestratorError> {
        self.write_with(|out| writeln!(out, "\nUser > {query}"))?;
        self.submit(session_id, Content::user_text(query), None).await
    }

    /// Submit a message and drain its event stream, printing text as it
    /// arrives. Pass `invocation_id` to resume a paused invocation.
    ///
    /// # Errors
    /// Returns error if the runtime rejects the submission or the stream
    /// yields an error.
    pub async fn submit(
        &self,
        session_id: &str,
        message: Content,
        invocation_id: Option<&str>,
    ) -> Result<Vec<Event>, OrchestratorError> {
        let mut request = RunRequest::new(&self.config.user_id, session_id, message);
        if let Some(invocation_id) = invocation_id {
            request = request.resuming(invocation_id);
        }

        let mut stream = self.runtime.run(request).await?;
        let mut events = Vec::new();
        while let Some(event) = stream.try_next().await? {
            self.write_with(|out| self.printer.print_event(&event, out).map(drop))?;
            events.push(event);
        }

        tracing::debug!(%session_id, events = events.len(), "Submission drained");
        Ok(events)
    }

    /// Submit `query`; if the runtime pauses for confirmation, ask `handler`
    /// and resume the paused invocation with its decision.
    ///
    /// # Errors
    /// Returns error if resolution, either submission, or the handler fails.
    pub async fn run_approval_workflow(
        &self,
        query: &str,
        session_name: &str,
        handler: &dyn ApprovalHandler,
    ) -> Result<ApprovalRun, OrchestratorError> {
        self.write_with(|out| writeln!(out, "\n ### Session: {session_name}"))?;
        let session_id = self.resolve_session(session_name).await?.into_session().id;

        let mut events = self.dispatch_query(&session_id, query).await?;
        let Some(request) = check_for_approval(&events) else {
            return Ok(ApprovalRun {
                outcome: ApprovalOutcome::NotRequired,
                request: None,
                events,
            });
        };

        self.write_with(|out| {
            writeln!(
                out,
                "Pausing for approval: {}",
                request.hint.as_deref().unwrap_or("confirmation requested")
            )
        })?;
        tracing::info!(
            approval_id = %request.approval_id,
            invocation_id = %request.invocation_id,
            "Invocation paused for approval"
        );

        let approved = handler.decide(&request).await?;
        self.write_with(|out| {
            writeln!(out, "Decision: {}", if approved { "APPROVED" } else { "REJECTED" })
        })?;

        let response = create_approval_response(&request, approved);
        events.extend(
            self.submit(&session_id, response, Some(&request.invocation_id))
                .await?,
        );

        Ok(ApprovalRun {
            outcome: if approved {
                ApprovalOutcome::Approved
            } else {
                ApprovalOutcome::Rejected
            },
            request: Some(request),
            events,
        })
    }
}
