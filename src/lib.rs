//! Flowscribe: workflow capture engine
//!
//! This library drives an external application through a requested task,
//! observes its UI state transitions, and assembles them into an ordered,
//! documented workflow session for a presentation layer to display.

pub mod adapter;
pub mod artifact;
pub mod config;
pub mod observer;
pub mod orchestrator;
pub mod planner;
pub mod recorder;
pub mod retry;
pub mod session;

pub use adapter::{
    create_adapter, ActionDescriptor, ActionKind, AdapterError, StateSignature, TargetAdapter,
    TargetApp, UIStateSnapshot,
};
pub use artifact::{ArtifactError, ArtifactRef, ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use config::EngineConfig;
pub use observer::{ObserveError, StateObserver};
pub use orchestrator::CaptureOrchestrator;
pub use planner::{CapturePlan, PlanError, SubGoal};
pub use recorder::{StepRecorder, TransitionKind};
pub use session::{SessionError, SessionStatus, WorkflowSession, WorkflowStep};
