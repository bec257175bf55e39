//! Session orchestration demo.
//!
//! Run with: cargo run -p session-demo -- [scenario]
//!
//! Scenarios run against a scripted runtime, so no model or API key is needed.

mod responder;
mod scenarios;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Two queries sharing one session.
    Stateful,
    /// Tools writing to session state.
    State,
    /// Saving sessions to memory and searching them.
    Memory,
    /// Turns saved to memory automatically and recalled in a new session.
    AutoMemory,
    /// File-backed sessions with compaction.
    Persistent,
    /// Confirmation pauses for large orders.
    Approval,
    /// Everything above, in order.
    All,
}

#[derive(Debug, Parser)]
#[command(name = "session-demo", about = "Agent session orchestration demo")]
struct Cli {
    #[arg(value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,

    /// Directory for the persistent scenario (defaults to the platform data dir).
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let all = cli.scenario == Scenario::All;

    if all || cli.scenario == Scenario::Stateful {
        scenarios::stateful().await?;
    }
    if all || cli.scenario == Scenario::State {
        scenarios::session_state().await?;
    }
    if all || cli.scenario == Scenario::Memory {
        scenarios::memory().await?;
    }
    if all || cli.scenario == Scenario::AutoMemory {
        scenarios::auto_memory().await?;
    }
    if all || cli.scenario == Scenario::Persistent {
        scenarios::persistent(cli.data_dir).await?;
    }
    if all || cli.scenario == Scenario::Approval {
        scenarios::approval().await?;
    }

    Ok(())
}
