//! JSON file session storage.
//!
//! Each session is one document at `{root}/{app}/{user}/{session}.json`, so
//! sessions survive restarts and can be inspected by hand.
//!
//! Documents are always staged in a uniquely named `.tmp` file and then
//! published in one step, so readers never observe a partial document.
//! New sessions are published with a hard link, which fails when the target
//! exists and doubles as conflict detection across processes.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use agent_sessions_core::{Event, Session, SessionError, SessionKey, SessionService};
use async_trait::async_trait;
use serde_json::Value;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use uuid::Uuid;

/// File-backed session store.
pub struct FileSessionService {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileSessionService {
    /// Open a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open a store in the platform data directory.
    ///
    /// # Errors
    /// Returns error if the platform has no data directory.
    pub fn open_default() -> Result<Self, SessionError> {
        let base = dirs::data_dir()
            .ok_or_else(|| SessionError::Internal("No data directory available".to_string()))?;
        Ok(Self::new(base.join("agent-sessions")))
    }

    /// Root directory of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, app_name: &str, user_id: &str) -> Result<PathBuf, SessionError> {
        Ok(self
            .root
            .join(checked_component(app_name)?)
            .join(checked_component(user_id)?))
    }

    fn session_path(&self, key: &SessionKey) -> Result<PathBuf, SessionError> {
        let file = format!("{}.json", checked_component(&key.session_id)?);
        Ok(self.user_dir(&key.app_name, &key.user_id)?.join(file))
    }

    async fn read(&self, path: &Path) -> Result<Option<Session>, SessionError> {
        match fs::read(path).await {
            // An empty file holds no session yet.
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `session` to a fresh staging file next to `path`.
    async fn stage(&self, path: &Path, session: &Session) -> Result<PathBuf, SessionError> {
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec_pretty(session)?;

        let mut file = fs::File::create(&tmp).await?;
        if let Err(e) = write_synced(&mut file, &bytes).await {
            discard(&tmp).await;
            return Err(e.into());
        }
        Ok(tmp)
    }

    /// Replace the document at `path`.
    async fn write(&self, path: &Path, session: &Session) -> Result<(), SessionError> {
        let tmp = self.stage(path, session).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            discard(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Publish a staged document at `path` unless a session already lives there.
    async fn publish_new(&self, tmp: &Path, path: &Path, key: &SessionKey) -> Result<(), SessionError> {
        match fs::hard_link(tmp, path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if fs::metadata(path).await?.len() > 0 {
                    return Err(SessionError::AlreadyExists(key.clone()));
                }
                tracing::warn!(%key, path = %path.display(), "Replacing empty session file");
                fs::rename(tmp, path).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_synced(file: &mut fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Remove a staging file, tolerating one that is already gone.
async fn discard(tmp: &Path) {
    match fs::remove_file(tmp).await {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            tracing::warn!(path = %tmp.display(), "Failed to remove staging file: {e}");
        }
        _ => {}
    }
}

/// Reject identifiers that would escape their directory.
fn checked_component(id: &str) -> Result<&str, SessionError> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(SessionError::Internal(format!("Invalid identifier: {id:?}")));
    }
    Ok(id)
}

#[async_trait]
impl SessionService for FileSessionService {
    async fn create_session(
        &self,
        key: &SessionKey,
        state: HashMap<String, Value>,
    ) -> Result<Session, SessionError> {
        let path = self.session_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let session = Session::new(key, state);
        let tmp = self.stage(&path, &session).await?;

        let published = {
            let _guard = self.write_lock.lock().await;
            self.publish_new(&tmp, &path, key).await
        };
        discard(&tmp).await;
        published?;
        tracing::debug!(%key, path = %path.display(), "Created session file");

        Ok(session)
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>, SessionError> {
        let path = self.session_path(key)?;
        self.read(&path).await
    }

    async fn append_event(&self, key: &SessionKey, event: Event) -> Result<Event, SessionError> {
        let path = self.session_path(key)?;

        let _guard = self.write_lock.lock().await;
        let mut session = self
            .read(&path)
            .await?
            .ok_or_else(|| SessionError::NotFound(key.clone()))?;
        session.apply_event(event.clone());
        self.write(&path, &session).await?;

        Ok(event)
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<SessionKey>, SessionError> {
        let dir = self.user_dir(app_name, user_id)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(SessionKey::new(app_name, user_id, stem));
            }
        }
        keys.sort_by(|a, b| a.session_id.cmp(&b.session_id));

        Ok(keys)
    }
}
