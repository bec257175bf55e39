//! Session orchestration, memory helpers and storage for agent sessions.
//!
//! Provides:
//! - `SessionOrchestrator` - Resolve named sessions and dispatch queries in order
//! - `EventPrinter` and inspection helpers for events, sessions and memories
//! - `InMemoryMemoryService` and `save_session_to_memory`
//! - Storage implementations (memory, file)

pub mod memory;
pub mod orchestrator;
pub mod printer;
pub mod storage;

pub use memory::{InMemoryMemoryService, save_session_to_memory};
pub use orchestrator::{
    ApprovalOutcome, ApprovalRun, OrchestratorError, Queries, Resolution, SessionOrchestrator,
    SessionRun,
};
pub use printer::{EventPrinter, Label};
