//! Step recording
//!
//! Converts an observed transition into a structured [`WorkflowStep`].
//! Classification runs against a small closed taxonomy; a transition that
//! fits nothing gets the generic title instead of failing, so recording can
//! never abort a capture.

use crate::adapter::{ActionDescriptor, ActionKind, UIStateSnapshot};
use crate::session::WorkflowStep;
use std::fmt;

/// Closed taxonomy of recordable transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Moving between views, including opening dialogs
    Navigation,
    /// Entering data into the current view
    FormFill,
    /// Committing the current state
    Confirmation,
    /// Everything the taxonomy does not cover
    Generic,
}

impl TransitionKind {
    /// Classify a transition by the action that caused it
    pub fn classify(action: &ActionDescriptor) -> Self {
        match action.kind {
            ActionKind::Navigate | ActionKind::OpenDialog => TransitionKind::Navigation,
            ActionKind::Fill => TransitionKind::FormFill,
            ActionKind::Confirm => TransitionKind::Confirmation,
            ActionKind::Other => TransitionKind::Generic,
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::Navigation => write!(f, "navigation"),
            TransitionKind::FormFill => write!(f, "form-fill"),
            TransitionKind::Confirmation => write!(f, "confirmation"),
            TransitionKind::Generic => write!(f, "generic"),
        }
    }
}

/// Deterministic transition-to-step converter
///
/// Given the same snapshots and action it always produces the same title,
/// action text, and resulting-state text; only the artifact reference differs
/// because artifacts are capture-time unique.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepRecorder;

impl StepRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record one observed transition as a step with the given index
    pub fn record(
        &self,
        index: u32,
        before: &UIStateSnapshot,
        action: &ActionDescriptor,
        after: &UIStateSnapshot,
    ) -> WorkflowStep {
        let kind = TransitionKind::classify(action);
        tracing::debug!(
            %kind,
            from = %before.signature,
            to = %after.signature,
            "recording step {}",
            index
        );

        WorkflowStep {
            index,
            title: title_for(kind, action),
            action: action.describe(),
            resulting_state: resulting_state_for(kind, action),
            artifact: after.artifact.clone(),
        }
    }
}

fn title_for(kind: TransitionKind, action: &ActionDescriptor) -> String {
    let target = title_case(&action.target);
    match kind {
        TransitionKind::Navigation => match action.kind {
            ActionKind::OpenDialog => format!("Open {}", target),
            _ => format!("Navigate to {}", target),
        },
        TransitionKind::FormFill => format!("Enter {}", target),
        TransitionKind::Confirmation => target,
        TransitionKind::Generic => "Action performed".to_string(),
    }
}

fn resulting_state_for(kind: TransitionKind, action: &ActionDescriptor) -> String {
    let target = title_case(&action.target);
    match kind {
        TransitionKind::Navigation => match action.kind {
            ActionKind::OpenDialog => format!("{} opened", target),
            _ => format!("{} view", target),
        },
        TransitionKind::FormFill => format!("{} populated", target),
        TransitionKind::Confirmation => format!("{} confirmed", target),
        TransitionKind::Generic => "Application state changed".to_string(),
    }
}

/// Capitalize the first letter of each word
fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
