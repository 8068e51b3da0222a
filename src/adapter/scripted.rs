//! Scripted in-memory adapter
//!
//! A deterministic stand-in for a real automation surface, used by tests and
//! by the CLI's demo mode. The script is a small state graph keyed by action
//! target, with optional fault injection: rejection countdowns, signature
//! flapping, navigation latency, and outage.

use crate::adapter::{
    ActionDescriptor, AdapterError, StateSignature, TargetAdapter, TargetApp, UIStateSnapshot,
};
use crate::artifact::{ArtifactRef, ArtifactStore};
use crate::planner::CapturePlan;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared log of adapter calls, used to assert call ordering across adapters
pub type CallLog = Arc<Mutex<Vec<String>>>;

struct ScriptState {
    current: String,
    /// action target -> state label it produces
    transitions: HashMap<String, String>,
    /// action target -> remaining rejections before it succeeds
    rejections: HashMap<String, u32>,
    navigate_latency: Duration,
    /// when set, `current_state` alternates between the two labels on every poll
    flapping: Option<(String, String)>,
    flap_toggle: bool,
    unavailable: bool,
}

/// Deterministic adapter over an in-memory state graph
pub struct ScriptedAdapter {
    app: TargetApp,
    store: Arc<dyn ArtifactStore>,
    state: Mutex<ScriptState>,
    call_log: Option<(CallLog, String)>,
}

impl ScriptedAdapter {
    /// Create an adapter starting in the "home" state with an empty graph
    pub fn new(app: TargetApp, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            app,
            store,
            state: Mutex::new(ScriptState {
                current: "home".to_string(),
                transitions: HashMap::new(),
                rejections: HashMap::new(),
                navigate_latency: Duration::ZERO,
                flapping: None,
                flap_toggle: false,
                unavailable: false,
            }),
            call_log: None,
        }
    }

    /// Build the graph that walks a plan goal by goal, so a capture against
    /// this adapter exercises every planned transition
    pub fn from_plan(plan: &CapturePlan, store: Arc<dyn ArtifactStore>) -> Self {
        let mut adapter = Self::new(plan.app, store);
        for goal in &plan.goals {
            let label = goal
                .expect
                .clone()
                .unwrap_or_else(|| format!("after {}", goal.action.target));
            adapter = adapter.with_transition(&goal.action.target, &label);
        }
        adapter
    }

    pub fn with_initial_state(self, label: &str) -> Self {
        self.state.lock().unwrap().current = label.to_string();
        self
    }

    /// Navigating `target` moves the script to the `next` state
    pub fn with_transition(self, target: &str, next: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .transitions
            .insert(target.to_string(), next.to_string());
        self
    }

    /// Reject the first `count` navigations to `target`
    pub fn with_rejections(self, target: &str, count: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .rejections
            .insert(target.to_string(), count);
        self
    }

    /// Delay every successful navigation
    pub fn with_navigate_latency(self, latency: Duration) -> Self {
        self.state.lock().unwrap().navigate_latency = latency;
        self
    }

    /// Alternate the reported signature between two labels on every poll
    pub fn with_flapping(self, a: &str, b: &str) -> Self {
        self.state.lock().unwrap().flapping = Some((a.to_string(), b.to_string()));
        self
    }

    /// Report the target as unreachable
    pub fn with_unavailable(self) -> Self {
        self.state.lock().unwrap().unavailable = true;
        self
    }

    /// Record every adapter call into a shared log, tagged with the given
    /// instance name
    pub fn with_call_log(mut self, log: CallLog, tag: &str) -> Self {
        self.call_log = Some((log, tag.to_string()));
        self
    }

    fn log_call(&self, call: &str) {
        if let Some((log, tag)) = &self.call_log {
            log.lock().unwrap().push(format!("{}:{}", tag, call));
        }
    }

    fn snapshot_of(&self, label: &str) -> Result<UIStateSnapshot, AdapterError> {
        let artifact = self
            .store
            .store(label.as_bytes(), label)
            .map_err(|e| AdapterError::Unavailable(format!("artifact store failed: {}", e)))?;
        Ok(UIStateSnapshot::new(StateSignature::new(label), artifact))
    }
}

#[async_trait]
impl TargetAdapter for ScriptedAdapter {
    fn app(&self) -> TargetApp {
        self.app
    }

    async fn navigate(&self, action: &ActionDescriptor) -> Result<UIStateSnapshot, AdapterError> {
        self.log_call(&format!("navigate {}", action.target));

        let (latency, next) = {
            let mut state = self.state.lock().unwrap();
            if state.unavailable {
                return Err(AdapterError::Unavailable("script: target offline".to_string()));
            }
            if let Some(remaining) = state.rejections.get_mut(&action.target) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AdapterError::ActionRejected(format!(
                        "script: '{}' rejected",
                        action.target
                    )));
                }
            }
            let next = match state.transitions.get(&action.target) {
                Some(next) => next.clone(),
                None => {
                    return Err(AdapterError::ActionRejected(format!(
                        "script: no transition for '{}'",
                        action.target
                    )))
                }
            };
            (state.navigate_latency, next)
        };

        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }

        self.state.lock().unwrap().current = next.clone();
        self.snapshot_of(&next)
    }

    async fn current_state(&self) -> Result<UIStateSnapshot, AdapterError> {
        self.log_call("current_state");

        let label = {
            let mut state = self.state.lock().unwrap();
            if state.unavailable {
                return Err(AdapterError::Unavailable("script: target offline".to_string()));
            }
            match state.flapping.clone() {
                Some((a, b)) => {
                    state.flap_toggle = !state.flap_toggle;
                    if state.flap_toggle {
                        a
                    } else {
                        b
                    }
                }
                None => state.current.clone(),
            }
        };
        self.snapshot_of(&label)
    }

    async fn capture_artifact(&self) -> Result<ArtifactRef, AdapterError> {
        self.log_call("capture_artifact");
        let snapshot = self.current_state().await?;
        Ok(snapshot.artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemoryArtifactStore;

    fn adapter() -> ScriptedAdapter {
        ScriptedAdapter::new(TargetApp::Linear, Arc::new(MemoryArtifactStore::new()))
            .with_transition("projects", "projects view")
    }

    #[tokio::test]
    async fn test_navigate_walks_the_graph() {
        let adapter = adapter();

        let before = adapter.current_state().await.unwrap();
        assert_eq!(before.signature.as_str(), "home");

        let after = adapter
            .navigate(&ActionDescriptor::navigate("projects"))
            .await
            .unwrap();
        assert_eq!(after.signature.as_str(), "projects view");

        let current = adapter.current_state().await.unwrap();
        assert_eq!(current.signature, after.signature);
    }

    #[tokio::test]
    async fn test_unknown_target_is_rejected() {
        let adapter = adapter();
        let err = adapter
            .navigate(&ActionDescriptor::navigate("inbox"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::ActionRejected(_)));
    }

    #[tokio::test]
    async fn test_rejections_count_down_then_succeed() {
        let adapter = adapter().with_rejections("projects", 2);
        let action = ActionDescriptor::navigate("projects");

        assert!(adapter.navigate(&action).await.is_err());
        assert!(adapter.navigate(&action).await.is_err());
        let snapshot = adapter.navigate(&action).await.unwrap();
        assert_eq!(snapshot.signature.as_str(), "projects view");
    }

    #[tokio::test]
    async fn test_flapping_alternates_signatures() {
        let adapter = adapter().with_flapping("loading", "spinner");

        let a = adapter.current_state().await.unwrap();
        let b = adapter.current_state().await.unwrap();
        let c = adapter.current_state().await.unwrap();

        assert_ne!(a.signature, b.signature);
        assert_eq!(a.signature, c.signature);
    }

    #[tokio::test]
    async fn test_capture_artifact_stores_a_frame() {
        let store = Arc::new(MemoryArtifactStore::new());
        let adapter = ScriptedAdapter::new(TargetApp::Notion, store.clone());

        let artifact = adapter.capture_artifact().await.unwrap();

        assert!(store.get(&artifact).is_some());
        assert_eq!(artifact.label(), "home");
    }

    #[tokio::test]
    async fn test_unavailable_reports_outage() {
        let adapter = adapter().with_unavailable();
        assert!(matches!(
            adapter.current_state().await.unwrap_err(),
            AdapterError::Unavailable(_)
        ));
    }
}
