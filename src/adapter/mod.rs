//! Target application abstraction layer
//!
//! This module defines the capability set the engine needs from an external
//! application (navigate, read state, capture a frame) and the concrete
//! adapter variants that implement it against real automation surfaces.

pub use async_trait::async_trait;

pub mod desktop;
pub mod scripted;

pub use self::desktop::DesktopAdapter;
pub use self::scripted::ScriptedAdapter;

use crate::artifact::{ArtifactRef, ArtifactStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// External applications the engine can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetApp {
    /// Linear project management
    Linear,
    /// Notion workspaces and databases
    Notion,
    /// Asana task management
    Asana,
}

impl TargetApp {
    /// Human-readable product name
    pub fn display_name(&self) -> &'static str {
        match self {
            TargetApp::Linear => "Linear",
            TargetApp::Notion => "Notion",
            TargetApp::Asana => "Asana",
        }
    }
}

impl fmt::Display for TargetApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Broad category of a requested action, used for gesture resolution and for
/// transition classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Move to a different view or section
    Navigate,
    /// Open a modal, panel, or menu
    OpenDialog,
    /// Enter data into the current view
    Fill,
    /// Commit the current state (save, create, apply)
    Confirm,
    /// Anything outside the closed taxonomy
    Other,
}

/// A single requested action against the target application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Category driving gesture resolution and step classification
    pub kind: ActionKind,
    /// What the action operates on, e.g. "projects" or "create project"
    pub target: String,
    /// Free-form payload, e.g. text to enter into a form
    pub detail: Option<String>,
}

impl ActionDescriptor {
    pub fn navigate(target: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Navigate,
            target: target.into(),
            detail: None,
        }
    }

    pub fn open_dialog(target: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::OpenDialog,
            target: target.into(),
            detail: None,
        }
    }

    pub fn fill(target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Fill,
            target: target.into(),
            detail: Some(detail.into()),
        }
    }

    pub fn confirm(target: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Confirm,
            target: target.into(),
            detail: None,
        }
    }

    pub fn other(target: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Other,
            target: target.into(),
            detail: None,
        }
    }

    /// Human sentence describing the action, used as step text
    pub fn describe(&self) -> String {
        match self.kind {
            ActionKind::Navigate => format!("Go to {}", self.target),
            ActionKind::OpenDialog => format!("Open the {} dialog", self.target),
            ActionKind::Fill => match &self.detail {
                Some(detail) => format!("Enter '{}' into {}", detail, self.target),
                None => format!("Fill in {}", self.target),
            },
            ActionKind::Confirm => format!("Confirm {}", self.target),
            ActionKind::Other => format!("Perform {}", self.target),
        }
    }
}

/// Comparable fingerprint of the application's observable state
///
/// Desktop adapters use a perceptual hash of the captured frame; scripted
/// adapters use an opaque label. Comparison is structural either way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateSignature(String);

impl StateSignature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ephemeral fingerprint of the adapter's current screen
///
/// Produced by observation, consumed immediately for transition detection and
/// step recording; not persisted beyond the current step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIStateSnapshot {
    pub signature: StateSignature,
    pub observed_at: DateTime<Utc>,
    pub artifact: ArtifactRef,
}

impl UIStateSnapshot {
    pub fn new(signature: StateSignature, artifact: ArtifactRef) -> Self {
        Self {
            signature,
            observed_at: Utc::now(),
            artifact,
        }
    }
}

/// Error types for adapter operations
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The target process or connection is unreachable
    #[error("target application unavailable: {0}")]
    Unavailable(String),

    /// The requested action is not valid in the current state
    #[error("action rejected: {0}")]
    ActionRejected(String),
}

/// Capability set over one external application
///
/// The target mutates outside this process's control; implementations must
/// tolerate state changing between calls, at minimum by re-reading the
/// current state before reporting a navigation result.
#[async_trait]
pub trait TargetAdapter: Send + Sync {
    /// Which application this adapter drives
    fn app(&self) -> TargetApp;

    /// Perform one action and return the state it produced
    async fn navigate(&self, action: &ActionDescriptor) -> Result<UIStateSnapshot, AdapterError>;

    /// Read the current state without acting
    async fn current_state(&self) -> Result<UIStateSnapshot, AdapterError>;

    /// Capture a visual record of the current screen
    async fn capture_artifact(&self) -> Result<ArtifactRef, AdapterError>;
}

/// Create the adapter variant for an application
///
/// All supported applications are currently driven through the desktop
/// surface; each gets its own gesture profile.
pub fn create_adapter(app: TargetApp, store: Arc<dyn ArtifactStore>) -> Box<dyn TargetAdapter> {
    Box::new(DesktopAdapter::for_app(app, store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_navigate() {
        let action = ActionDescriptor::navigate("projects");
        assert_eq!(action.describe(), "Go to projects");
    }

    #[test]
    fn test_describe_fill_with_detail() {
        let action = ActionDescriptor::fill("project name", "Q3 Roadmap");
        assert_eq!(action.describe(), "Enter 'Q3 Roadmap' into project name");
    }

    #[test]
    fn test_signature_structural_equality() {
        assert_eq!(StateSignature::new("abc"), StateSignature::new("abc"));
        assert_ne!(StateSignature::new("abc"), StateSignature::new("abd"));
    }

    #[test]
    fn test_app_display_names() {
        assert_eq!(TargetApp::Linear.to_string(), "Linear");
        assert_eq!(TargetApp::Notion.to_string(), "Notion");
        assert_eq!(TargetApp::Asana.to_string(), "Asana");
    }
}
