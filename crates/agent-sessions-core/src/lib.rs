//! Core abstractions for agent session orchestration.
//!
//! This crate provides the fundamental building blocks:
//! - `Event`, `Content`, `Part` - The conversation data model
//! - `OrchestratorConfig`, `CompactionConfig` - Explicit configuration
//! - Runtime, session store and memory store traits

pub mod config;
pub mod event;
pub mod traits;

pub use config::{CompactionConfig, ConfigError, OrchestratorConfig};
pub use event::{Content, Event, EventActions, EventCompaction, FunctionCall, FunctionResponse, Part, Role};
pub use traits::{
    AgentRuntime, EventStream, MemoryEntry, MemoryError, MemoryService, RunRequest, RuntimeError,
    SearchMemoryResponse, Session, SessionError, SessionKey, SessionService,
};
