//! Workflow session and step records
//!
//! A [`WorkflowSession`] accumulates the ordered steps of one capture request
//! and its summary metadata. Only the orchestrator mutates a session; once its
//! status leaves [`SessionStatus::InProgress`] the session is terminal and is
//! handed to the presentation layer as-is.

use crate::artifact::ArtifactRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One documented step of a captured workflow
///
/// Immutable once created; owned exclusively by the session it was appended
/// to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// 1-based position in the session, contiguous without gaps
    pub index: u32,
    /// Short human title, e.g. "Navigate to Projects"
    pub title: String,
    /// The action that was performed
    pub action: String,
    /// Description of the UI state the action produced
    pub resulting_state: String,
    /// Reference to the captured visual record of the resulting state
    pub artifact: ArtifactRef,
}

/// Lifecycle status of a capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Capture is still running
    InProgress,
    /// All sub-goals executed, or plan exhausted without failure
    Complete,
    /// Unrecoverable adapter error or retry exhaustion on a mandatory sub-goal
    Failed,
    /// Wall-clock budget exceeded; partial steps preserved
    TimedOut,
}

impl SessionStatus {
    /// Whether this status ends the session
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::InProgress => write!(f, "in_progress"),
            SessionStatus::Complete => write!(f, "complete"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Errors raised by session mutators
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("step index {got} does not follow expected index {expected}")]
    StepOutOfOrder { expected: u32, got: u32 },

    #[error("session already finalized as {current}")]
    AlreadyFinalized { current: SessionStatus },

    #[error("cannot finalize a session with a non-terminal status")]
    NonTerminalStatus,
}

/// Accumulated result of one capture request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSession {
    /// The task the user asked to capture, verbatim
    pub task_description: String,
    /// Current lifecycle status; transitions only forward
    pub status: SessionStatus,
    /// Ordered steps, indexes contiguous from 1
    pub steps: Vec<WorkflowStep>,
    /// When the capture request started
    pub started_at: DateTime<Utc>,
    /// When the session reached a terminal status
    pub ended_at: Option<DateTime<Utc>>,
}

impl WorkflowSession {
    /// Create a fresh in-progress session for a task
    pub fn new(task_description: impl Into<String>) -> Self {
        Self {
            task_description: task_description.into(),
            status: SessionStatus::InProgress,
            steps: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Append a recorded step, enforcing the contiguous-index invariant
    pub(crate) fn append_step(&mut self, step: WorkflowStep) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::AlreadyFinalized {
                current: self.status,
            });
        }
        let expected = self.steps.len() as u32 + 1;
        if step.index != expected {
            return Err(SessionError::StepOutOfOrder {
                expected,
                got: step.index,
            });
        }
        self.steps.push(step);
        Ok(())
    }

    /// Index the next appended step must carry
    pub(crate) fn next_index(&self) -> u32 {
        self.steps.len() as u32 + 1
    }

    /// Move the session to a terminal status and stamp `ended_at`
    ///
    /// Idempotent for the same terminal status; rejects any transition that
    /// would move the status backward.
    pub(crate) fn finalize(&mut self, status: SessionStatus) -> Result<(), SessionError> {
        if !status.is_terminal() {
            return Err(SessionError::NonTerminalStatus);
        }
        if self.status.is_terminal() {
            if self.status == status {
                return Ok(()); // repeated finalize with the same status
            }
            return Err(SessionError::AlreadyFinalized {
                current: self.status,
            });
        }
        self.status = status;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Number of recorded steps
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Number of captured artifacts referenced by this session
    pub fn artifact_count(&self) -> usize {
        // One artifact per step; counted separately in case steps ever carry
        // more than one reference
        self.steps.len()
    }

    /// Wall-clock duration, if the session has ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}
