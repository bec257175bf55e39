//! Long-term memory: an in-memory keyword store and ingestion helpers.

use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
};

use agent_sessions_core::{
    MemoryEntry, MemoryError, MemoryService, SearchMemoryResponse, Session, SessionError,
    SessionKey, SessionService,
};
use async_trait::async_trait;

/// Default bound on search results.
pub const DEFAULT_MAX_RESULTS: usize = 10;

type Scope = (String, String);

/// Memories ingested from one session.
struct SessionMemories {
    session_id: String,
    entries: Vec<MemoryEntry>,
}

/// In-memory keyword memory store.
///
/// An entry matches when it shares at least one word with the query,
/// case-insensitively. Re-ingesting a session replaces its earlier entries.
pub struct InMemoryMemoryService {
    scopes: RwLock<HashMap<Scope, Vec<SessionMemories>>>,
    max_results: usize,
}

impl InMemoryMemoryService {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_results(DEFAULT_MAX_RESULTS)
    }

    /// Create a store returning at most `max_results` entries per search.
    #[must_use]
    pub fn with_max_results(max_results: usize) -> Self {
        Self {
            scopes: RwLock::new(HashMap::new()),
            max_results,
        }
    }
}

impl Default for InMemoryMemoryService {
    fn default() -> Self {
        Self::new()
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl MemoryService for InMemoryMemoryService {
    async fn add_session_to_memory(&self, session: &Session) -> Result<(), MemoryError> {
        let entries: Vec<MemoryEntry> = session
            .events
            .iter()
            .filter(|e| !e.is_compaction())
            .filter_map(|e| {
                let content = e.content.as_ref()?;
                content.texts().any(|t| !t.trim().is_empty()).then(|| MemoryEntry {
                    author: e.author.clone(),
                    content: content.clone(),
                    timestamp: e.timestamp,
                })
            })
            .collect();

        let mut scopes = self
            .scopes
            .write()
            .map_err(|e| MemoryError::Internal(e.to_string()))?;
        let sessions = scopes
            .entry((session.app_name.clone(), session.user_id.clone()))
            .or_default();
        sessions.retain(|s| s.session_id != session.id);

        tracing::debug!(session_id = %session.id, entries = entries.len(), "Ingested session into memory");
        sessions.push(SessionMemories {
            session_id: session.id.clone(),
            entries,
        });

        Ok(())
    }

    async fn search_memory(
        &self,
        app_name: &str,
        user_id: &str,
        query: &str,
    ) -> Result<SearchMemoryResponse, MemoryError> {
        let query_words = words(query);
        if query_words.is_empty() {
            return Ok(SearchMemoryResponse::default());
        }

        let scopes = self
            .scopes
            .read()
            .map_err(|e| MemoryError::Internal(e.to_string()))?;
        let Some(sessions) = scopes.get(&(app_name.to_string(), user_id.to_string())) else {
            return Ok(SearchMemoryResponse::default());
        };

        let memories = sessions
            .iter()
            .flat_map(|s| s.entries.iter())
            .filter(|entry| {
                let text: Vec<&str> = entry.content.texts().collect();
                !words(&text.join(" ")).is_disjoint(&query_words)
            })
            .take(self.max_results)
            .cloned()
            .collect();

        Ok(SearchMemoryResponse { memories })
    }
}

/// Fetch a stored session and ingest it into memory.
///
/// # Errors
/// Returns error if the session does not exist or either store fails.
pub async fn save_session_to_memory<S, M>(
    sessions: &S,
    memory: &M,
    key: &SessionKey,
) -> Result<Session, MemoryError>
where
    S: SessionService + ?Sized,
    M: MemoryService + ?Sized,
{
    let session = sessions
        .get_session(key)
        .await?
        .ok_or_else(|| SessionError::NotFound(key.clone()))?;
    memory.add_session_to_memory(&session).await?;
    tracing::info!(%key, events = session.events.len(), "Session saved to memory");
    Ok(session)
}
