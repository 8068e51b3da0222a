//! Flowscribe - Workflow Capture Console
//!
//! Command-line consumer of the capture engine: takes a task description,
//! runs one capture request, and renders the resulting workflow session with
//! its step list and capture counters.

use anyhow::bail;
use clap::Parser;
use flowscribe::adapter::ScriptedAdapter;
use flowscribe::{
    planner, ArtifactStore, CaptureOrchestrator, EngineConfig, FsArtifactStore,
    MemoryArtifactStore, SessionStatus, WorkflowSession,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "flowscribe", version, about = "Capture and document application workflows")]
struct Cli {
    /// Task to capture, e.g. "How do I create a project in Linear?"
    task: Vec<String>,

    /// Wall-clock budget for the capture, in seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Drive a deterministic scripted surface instead of the live desktop
    #[arg(long)]
    scripted: bool,

    /// Emit the session as JSON instead of rendered text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("flowscribe=info")),
        )
        .init();

    let cli = Cli::parse();
    let task = cli.task.join(" ");
    if task.trim().is_empty() {
        bail!("no task given; try: flowscribe \"How do I create a project in Linear?\"");
    }

    let config = EngineConfig::from_env();
    let deadline = cli
        .deadline
        .map(Duration::from_secs)
        .unwrap_or(config.default_deadline);

    let session = if cli.scripted {
        run_scripted(config, &task, deadline).await
    } else {
        let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::in_data_dir()?);
        let orchestrator = CaptureOrchestrator::new(config, store);
        orchestrator.capture(&task, deadline).await
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        render_session(&session);
    }

    Ok(())
}

/// Run the capture against a scripted surface built from the task's own plan
async fn run_scripted(config: EngineConfig, task: &str, deadline: Duration) -> WorkflowSession {
    let store = Arc::new(MemoryArtifactStore::new());
    let orchestrator = CaptureOrchestrator::new(config, store.clone());

    match planner::plan(task) {
        Ok(plan) => {
            let adapter = ScriptedAdapter::from_plan(&plan, store);
            orchestrator
                .capture_with(&adapter, task, deadline, CancellationToken::new())
                .await
        }
        // Let the engine surface the planning failure as a failed session
        Err(_) => orchestrator.capture(task, deadline).await,
    }
}

/// Render a session the way the presentation contract describes: steps in
/// order with title/action/state/artifact, plus cumulative counters
fn render_session(session: &WorkflowSession) {
    println!();
    println!("Captured workflow for: \"{}\"", session.task_description);
    println!();

    if let Some(app) = planner::classify_app(&session.task_description) {
        println!("Application:        {} (detected automatically)", app);
    }
    println!("Status:             {}", session.status);
    println!("Total steps:        {}", session.step_count());
    println!("Screenshots:        {}", session.artifact_count());
    if let Some(duration) = session.duration() {
        println!("Duration:           {:.1}s", duration.num_milliseconds() as f64 / 1000.0);
    }
    println!();

    for step in &session.steps {
        println!("Step {}: {}", step.index, step.title);
        println!("  Action:   {}", step.action);
        println!("  UI state: {}", step.resulting_state);
        println!("  Artifact: {}", step.artifact);
    }

    if session.steps.is_empty() {
        println!("(no steps were captured)");
    }

    println!();
    let workflows = if session.status == SessionStatus::Complete {
        1
    } else {
        0
    };
    println!("Workflows captured:  {}", workflows);
    println!("Artifacts captured:  {}", session.artifact_count());
}
