//! Task decomposition
//!
//! Turns a free-text task description into a [`CapturePlan`]: the target
//! application (inferred from keywords in the text) and an ordered list of
//! sub-goals. Plans are advisory; the orchestrator re-derives the remaining
//! goals whenever the observed state disagrees with them.

use crate::adapter::{ActionDescriptor, TargetApp, UIStateSnapshot};

/// One atomic action within a larger captured task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubGoal {
    /// Short goal name used in logs and step titles
    pub name: String,
    /// The action that should achieve this goal
    pub action: ActionDescriptor,
    /// Optional goals are skipped instead of failing the session when their
    /// retries are exhausted
    pub optional: bool,
    /// Expected resulting state label, where the surface exposes labels;
    /// opaque-signature surfaces leave this unset
    pub expect: Option<String>,
}

impl SubGoal {
    fn new(name: &str, action: ActionDescriptor, expect: &str) -> Self {
        Self {
            name: name.to_string(),
            action,
            optional: false,
            expect: Some(expect.to_string()),
        }
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Ordered sub-goals for one capture request
#[derive(Debug, Clone)]
pub struct CapturePlan {
    pub app: TargetApp,
    pub goals: Vec<SubGoal>,
}

impl CapturePlan {
    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }
}

/// Error types for planning
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("task description is empty")]
    EmptyTask,

    #[error("could not determine a target application from: '{0}'")]
    UnknownApplication(String),
}

/// Infer the target application from keywords in the task text
pub fn classify_app(task: &str) -> Option<TargetApp> {
    let lower = task.to_lowercase();
    if lower.contains("linear") {
        Some(TargetApp::Linear)
    } else if lower.contains("notion") {
        Some(TargetApp::Notion)
    } else if lower.contains("asana") {
        Some(TargetApp::Asana)
    } else {
        None
    }
}

/// Decompose a task description into a plan
///
/// Recognized task shapes get a multi-goal template; anything else against a
/// recognized application falls back to a single implicit goal.
pub fn plan(task: &str) -> Result<CapturePlan, PlanError> {
    let trimmed = task.trim();
    if trimmed.is_empty() {
        return Err(PlanError::EmptyTask);
    }

    let app = classify_app(trimmed).ok_or_else(|| PlanError::UnknownApplication(trimmed.to_string()))?;
    let goals = decompose(trimmed);

    Ok(CapturePlan { app, goals })
}

fn decompose(task: &str) -> Vec<SubGoal> {
    let lower = task.to_lowercase();

    if lower.contains("create") && lower.contains("project") {
        return vec![
            SubGoal::new(
                "open projects",
                ActionDescriptor::navigate("projects"),
                "projects list view",
            ),
            SubGoal::new(
                "open create dialog",
                ActionDescriptor::open_dialog("new project"),
                "create project modal",
            ),
            SubGoal::new(
                "enter project details",
                ActionDescriptor::fill("project details", "name and description"),
                "project form filled",
            ),
            SubGoal::new(
                "configure settings",
                ActionDescriptor::fill("project settings", "team and status"),
                "project settings configured",
            )
            .optional(),
            SubGoal::new(
                "create project",
                ActionDescriptor::confirm("create project"),
                "project created",
            ),
        ];
    }

    if lower.contains("filter") && lower.contains("database") {
        return vec![
            SubGoal::new(
                "open database",
                ActionDescriptor::navigate("database"),
                "database view",
            ),
            SubGoal::new(
                "open filter menu",
                ActionDescriptor::open_dialog("filter menu"),
                "filter menu open",
            ),
            SubGoal::new(
                "define filter rule",
                ActionDescriptor::fill("filter rule", "property and condition"),
                "filter rule defined",
            ),
            SubGoal::new(
                "apply filter",
                ActionDescriptor::confirm("apply filter"),
                "filtered database view",
            ),
        ];
    }

    if lower.contains("assign") && lower.contains("task") {
        return vec![
            SubGoal::new(
                "open tasks",
                ActionDescriptor::navigate("my tasks"),
                "task list view",
            ),
            SubGoal::new(
                "open task details",
                ActionDescriptor::open_dialog("task details"),
                "task details panel",
            ),
            SubGoal::new(
                "set assignee",
                ActionDescriptor::fill("assignee", "teammate name"),
                "assignee selected",
            ),
            SubGoal::new(
                "confirm assignment",
                ActionDescriptor::confirm("assignment"),
                "task assigned",
            ),
        ];
    }

    if lower.contains("settings") || lower.contains("preference") {
        return vec![
            SubGoal::new(
                "open settings",
                ActionDescriptor::navigate("settings"),
                "settings view",
            ),
            SubGoal::new(
                "adjust preference",
                ActionDescriptor::fill("preference", "new value"),
                "preference changed",
            )
            .optional(),
            SubGoal::new(
                "save settings",
                ActionDescriptor::confirm("save"),
                "settings saved",
            ),
        ];
    }

    // No template matched; capture the task as a single implicit goal
    vec![SubGoal {
        name: "complete task".to_string(),
        action: ActionDescriptor::other(task),
        optional: false,
        expect: None,
    }]
}

/// Re-derive the remaining goals from the observed state
///
/// The observed state wins over the stale plan: leading goals whose expected
/// state the application has already reached are dropped (an external actor,
/// or an earlier partially-applied gesture, got there first). Goals without
/// an expectation are kept conservatively.
pub fn rederive(remaining: &[SubGoal], observed: &UIStateSnapshot) -> Vec<SubGoal> {
    let mut goals = remaining.to_vec();
    while let Some(first) = goals.first() {
        match &first.expect {
            Some(expect) if expect == observed.signature.as_str() => {
                goals.remove(0);
            }
            _ => break,
        }
    }
    goals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ActionKind, StateSignature};
    use crate::artifact::ArtifactRef;

    #[test]
    fn test_classify_app_from_task_text() {
        assert_eq!(
            classify_app("How do I create a project in Linear?"),
            Some(TargetApp::Linear)
        );
        assert_eq!(
            classify_app("filter a database in NOTION"),
            Some(TargetApp::Notion)
        );
        assert_eq!(classify_app("assign a task in Asana"), Some(TargetApp::Asana));
        assert_eq!(classify_app("make me a sandwich"), None);
    }

    #[test]
    fn test_create_project_template() {
        let plan = plan("How do I create a project in Linear?").unwrap();
        assert_eq!(plan.app, TargetApp::Linear);
        assert_eq!(plan.len(), 5);
        assert_eq!(plan.goals[0].action.kind, ActionKind::Navigate);
        assert!(plan.goals[3].optional);
        assert_eq!(plan.goals[4].action.kind, ActionKind::Confirm);
    }

    #[test]
    fn test_unrecognized_task_gets_single_implicit_goal() {
        let plan = plan("How do I archive a cycle in Linear?").unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.goals[0].action.kind, ActionKind::Other);
        assert!(plan.goals[0].expect.is_none());
    }

    #[test]
    fn test_empty_task_fails() {
        assert!(matches!(plan("   "), Err(PlanError::EmptyTask)));
    }

    #[test]
    fn test_unknown_application_fails() {
        assert!(matches!(
            plan("How do I create a project in Jira?"),
            Err(PlanError::UnknownApplication(_))
        ));
    }

    #[test]
    fn test_rederive_drops_already_reached_goals() {
        let plan = plan("How do I create a project in Linear?").unwrap();
        // The application is already showing the create-project modal
        let observed = UIStateSnapshot::new(
            StateSignature::new("projects list view"),
            ArtifactRef::new("frame"),
        );

        let remaining = rederive(&plan.goals, &observed);

        assert_eq!(remaining.len(), plan.len() - 1);
        assert_eq!(remaining[0].name, "open create dialog");
    }

    #[test]
    fn test_rederive_keeps_goals_on_unknown_state() {
        let plan = plan("How do I assign a task in Asana?").unwrap();
        let observed = UIStateSnapshot::new(
            StateSignature::new("somewhere unexpected"),
            ArtifactRef::new("frame"),
        );

        let remaining = rederive(&plan.goals, &observed);
        assert_eq!(remaining.len(), plan.len());
    }
}
