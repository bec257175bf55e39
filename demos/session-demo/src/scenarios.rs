//! Demo scenarios.

use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use agent_sessions_core::{CompactionConfig, MemoryService, OrchestratorConfig, SessionService};
use agent_sessions_runtime::{AutoApproveHandler, AutoRejectHandler, EchoResponder, ScriptedRuntime};
use agent_sessions_session::{
    InMemoryMemoryService, SessionOrchestrator, printer, save_session_to_memory,
    storage::{FileSessionService, InMemorySessionService},
};
use anyhow::{Context, Result};

use crate::responder::{MemoryAgent, chat_bot, shipping_agent};

const MEMORY_APP: &str = "MemoryDemoApp";

/// Two queries in one session keep their shared context.
pub async fn stateful() -> Result<()> {
    let store = Arc::new(InMemorySessionService::new());
    let runtime = ScriptedRuntime::new("default", store.clone(), chat_bot).with_agent_name("text_chat_bot");
    let orchestrator = SessionOrchestrator::new(runtime, store, OrchestratorConfig::from_env());

    orchestrator
        .run_session(
            [
                "Hi, I am Sam! What is the capital of United States?",
                "Hello! What is my name?",
            ],
            "stateful-agentic-session",
        )
        .await?;
    Ok(())
}

/// Tools write to session state; a new session starts without it.
pub async fn session_state() -> Result<()> {
    let store = Arc::new(InMemorySessionService::new());
    let runtime = ScriptedRuntime::new("default", store.clone(), chat_bot).with_agent_name("text_chat_bot");
    let orchestrator = SessionOrchestrator::new(runtime, store.clone(), OrchestratorConfig::from_env());

    orchestrator
        .run_session(
            [
                "Hi there, how are you doing today? What is my name?",
                "My name is Sam. I'm from Poland.",
                "What is my name? Which country am I from?",
            ],
            "state-demo-session",
        )
        .await?;

    let session = store
        .get_session(&orchestrator.session_key("state-demo-session"))
        .await?
        .context("state-demo-session missing after run")?;
    println!("Session State Contents:");
    println!("{}", serde_json::to_string_pretty(&session.state)?);

    orchestrator
        .run_session(
            "Hi there, how are you doing today? What is my name?",
            "new-isolated-session",
        )
        .await?;
    Ok(())
}

/// Sessions saved to memory are searchable across sessions.
pub async fn memory() -> Result<()> {
    let store = Arc::new(InMemorySessionService::new());
    let memory = InMemoryMemoryService::new();
    let runtime = ScriptedRuntime::new(MEMORY_APP, store.clone(), EchoResponder)
        .with_agent_name("MemoryDemoAgent");
    let config = OrchestratorConfig::from_env().with_user("demo_user");
    let orchestrator = SessionOrchestrator::new(runtime, store.clone(), config);

    orchestrator
        .run_session(
            "My favorite color is blue-green. Can you write a Haiku about it?",
            "conversation-01",
        )
        .await?;
    orchestrator
        .run_session("My birthday is on March 15th.", "birthday-session-01")
        .await?;

    let mut out = io::stdout();
    for session_id in ["conversation-01", "birthday-session-01"] {
        let key = orchestrator.session_key(session_id);
        let session = save_session_to_memory(&*store, &memory, &key).await?;
        writeln!(out, "\nSession {session_id} contains:")?;
        printer::describe_session(&session, &mut out)?;
        writeln!(out, "Session added to memory!")?;
    }

    for query in ["What is the user's favorite color?", "When is my birthday?"] {
        let response = memory
            .search_memory(MEMORY_APP, "demo_user", query)
            .await?;
        writeln!(out, "\nSearch Results for {query:?}:")?;
        printer::print_memories(&response, &mut out)?;
    }
    Ok(())
}

/// Every turn is saved to memory and recalled from a fresh session.
pub async fn auto_memory() -> Result<()> {
    let store = Arc::new(InMemorySessionService::new());
    let memory = Arc::new(InMemoryMemoryService::new());
    let runtime = ScriptedRuntime::new(MEMORY_APP, store.clone(), MemoryAgent)
        .with_agent_name("AutoMemoryAgent")
        .with_memory(memory);
    let config = OrchestratorConfig::from_env().with_user("demo_user");
    let orchestrator = SessionOrchestrator::new(runtime, store, config);

    orchestrator
        .run_session(
            "I gifted a new toy to my nephew on his 1st birthday!",
            "auto-save-test",
        )
        .await?;
    orchestrator
        .run_session("What did I gift my nephew?", "auto-save-test-2")
        .await?;
    Ok(())
}

/// File-backed sessions survive restarts; compaction condenses old turns.
pub async fn persistent(data_dir: Option<PathBuf>) -> Result<()> {
    let store = Arc::new(match data_dir {
        Some(dir) => FileSessionService::new(dir),
        None => FileSessionService::open_default()?,
    });
    tracing::info!(root = %store.root().display(), "Using file session store");

    let runtime = ScriptedRuntime::new("research_app_compacting", store.clone(), chat_bot)
        .with_agent_name("text_chat_bot")
        .with_compaction(CompactionConfig {
            compaction_interval: 3,
            overlap_size: 1,
        })?;
    let orchestrator = SessionOrchestrator::new(runtime, store.clone(), OrchestratorConfig::from_env());

    for query in [
        "What is the latest news about AI in healthcare?",
        "Are there any new developments in drug discovery?",
        "Tell me more about the second development you found.",
        "Who are the main companies involved in that?",
    ] {
        orchestrator.run_session(query, "compaction_demo").await?;
    }

    let session = store
        .get_session(&orchestrator.session_key("compaction_demo"))
        .await?
        .context("compaction_demo missing after run")?;

    println!("--- Searching for Compaction Summary Event ---");
    match printer::find_compaction_event(&session.events) {
        Some(event) => {
            println!("\nFound the Compaction Event:");
            println!("  Author: {}", event.author);
            println!("\n Compacted information: {}", serde_json::to_string_pretty(event)?);
        }
        None => println!("\nNo compaction event found. Try increasing the number of turns in the demo."),
    }

    let sessions = store.list_sessions("research_app_compacting", &orchestrator.config().user_id).await?;
    println!("\nStored sessions: {}", sessions.len());
    for key in sessions {
        println!("  {key}");
    }
    Ok(())
}

/// Large orders pause for approval and resume with the decision.
pub async fn approval() -> Result<()> {
    let store = Arc::new(InMemorySessionService::new());
    let runtime = ScriptedRuntime::new("shipping_coordinator", store.clone(), shipping_agent)
        .with_agent_name("shipping_agent");
    let orchestrator = SessionOrchestrator::new(runtime, store, OrchestratorConfig::from_env());

    let small = orchestrator
        .run_approval_workflow("Ship 3 containers to Singapore", "order-small", &AutoRejectHandler)
        .await?;
    let approved = orchestrator
        .run_approval_workflow("Ship 10 containers to Rotterdam", "order-large-approved", &AutoApproveHandler)
        .await?;
    let rejected = orchestrator
        .run_approval_workflow("Ship 8 containers to Los Angeles", "order-large-rejected", &AutoRejectHandler)
        .await?;

    for (name, run) in [("small", small), ("approved", approved), ("rejected", rejected)] {
        tracing::info!(order = name, outcome = ?run.outcome, events = run.events.len(), "Workflow finished");
    }
    Ok(())
}
