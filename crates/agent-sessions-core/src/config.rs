//! Orchestration configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`OrchestratorConfig::user_id`].
pub const ENV_USER_ID: &str = "AGENT_SESSIONS_USER_ID";
/// Environment variable overriding [`OrchestratorConfig::model_name`].
pub const ENV_MODEL: &str = "AGENT_SESSIONS_MODEL";
/// Environment variable overriding [`OrchestratorConfig::session_name`].
pub const ENV_SESSION: &str = "AGENT_SESSIONS_SESSION";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for one session orchestrator.
///
/// Several orchestrators with different settings can share a runtime and
/// store; nothing here is process-global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// User the sessions belong to.
    pub user_id: String,
    /// Label printed in front of model output.
    pub model_name: String,
    /// Session used when the caller does not name one.
    pub session_name: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            user_id: "default".to_string(),
            model_name: "gemini-2.5-flash-lite".to_string(),
            session_name: "default".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Defaults overridden by any `AGENT_SESSIONS_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(user_id) = std::env::var(ENV_USER_ID) {
            config.user_id = user_id;
        }
        if let Ok(model) = std::env::var(ENV_MODEL) {
            config.model_name = model;
        }
        if let Ok(session) = std::env::var(ENV_SESSION) {
            config.session_name = session;
        }
        tracing::debug!(?config, "Loaded orchestrator config");
        config
    }

    /// Parse from JSON; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or a field is empty.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that no identifier is empty.
    ///
    /// # Errors
    /// Returns error naming the first empty field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("user_id", &self.user_id),
            ("model_name", &self.model_name),
            ("session_name", &self.session_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = session_name.into();
        self
    }
}

/// Periodic compaction of older events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Compact after every this many invocations.
    pub compaction_interval: usize,
    /// Previous invocations re-included in each compaction window.
    pub overlap_size: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            compaction_interval: 3,
            overlap_size: 1,
        }
    }
}

impl CompactionConfig {
    /// # Errors
    /// Returns error if the interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compaction_interval == 0 {
            return Err(ConfigError::Invalid(
                "compaction_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
