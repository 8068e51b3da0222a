//! Capture orchestration
//!
//! The only stateful control-flow component. Each capture request runs a
//! small state machine: plan the task, drive the adapter goal by goal with
//! the observer confirming every transition and the recorder documenting it,
//! recover from rejections with bounded backoff, and finalize the session on
//! completion, failure, timeout, or cancellation. Partial progress is always
//! preserved.

use crate::adapter::{create_adapter, AdapterError, TargetAdapter, TargetApp};
use crate::artifact::ArtifactStore;
use crate::config::EngineConfig;
use crate::observer::{ObserveError, StateObserver};
use crate::planner::{self, SubGoal};
use crate::recorder::StepRecorder;
use crate::retry::calculate_backoff_delay;
use crate::session::{SessionStatus, WorkflowSession};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

lazy_static! {
    /// One lock per external application identity; no two concurrent capture
    /// requests may drive the same application instance
    static ref ADAPTER_LOCKS: StdMutex<HashMap<TargetApp, Arc<AsyncMutex<()>>>> =
        StdMutex::new(HashMap::new());
}

/// Fetch (or create) the exclusivity lock for an application
fn adapter_lock(app: TargetApp) -> Arc<AsyncMutex<()>> {
    ADAPTER_LOCKS
        .lock()
        .unwrap()
        .entry(app)
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Why a running plan stopped short of completion
enum Halt {
    /// Unrecoverable adapter error or retry exhaustion on a mandatory goal
    Failed { reason: String },
    /// Repeated observation stalls; wall-clock budget is effectively spent
    TimedOut { reason: String },
    /// The caller cancelled the request
    Cancelled,
}

/// Drives capture requests end to end
pub struct CaptureOrchestrator {
    config: EngineConfig,
    observer: StateObserver,
    recorder: StepRecorder,
    store: Arc<dyn ArtifactStore>,
}

impl CaptureOrchestrator {
    /// Create an orchestrator with the given configuration and artifact sink
    pub fn new(config: EngineConfig, store: Arc<dyn ArtifactStore>) -> Self {
        let observer = StateObserver::from_config(&config);
        Self {
            config,
            observer,
            recorder: StepRecorder::new(),
            store,
        }
    }

    /// Run one capture request to completion
    ///
    /// Synchronous from the caller's perspective: the returned session is
    /// terminal. Adapter selection happens through task classification; the
    /// adapter connection is exclusively owned for the duration of the
    /// request.
    pub async fn capture(&self, task_description: &str, deadline: Duration) -> WorkflowSession {
        self.capture_cancellable(task_description, deadline, CancellationToken::new())
            .await
    }

    /// [`capture`](Self::capture) with a caller-supplied cancellation signal
    pub async fn capture_cancellable(
        &self,
        task_description: &str,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> WorkflowSession {
        let plan = match planner::plan(task_description) {
            Ok(plan) => plan,
            Err(e) => {
                // Planning failures surface immediately, with zero steps
                tracing::warn!(task = task_description, "planning failed: {}", e);
                let mut session = WorkflowSession::new(task_description);
                close(&mut session, SessionStatus::Failed);
                return session;
            }
        };

        let adapter = create_adapter(plan.app, self.store.clone());
        self.capture_with(adapter.as_ref(), task_description, deadline, cancel)
            .await
    }

    /// Run a capture against a caller-supplied adapter
    ///
    /// The seam used by tests and by the demo mode; `capture` funnels here
    /// after building the adapter for the classified application.
    pub async fn capture_with(
        &self,
        adapter: &dyn TargetAdapter,
        task_description: &str,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> WorkflowSession {
        let mut session = WorkflowSession::new(task_description);
        let deadline_at = Instant::now() + deadline;

        let plan = match planner::plan(task_description) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(task = task_description, "planning failed: {}", e);
                close(&mut session, SessionStatus::Failed);
                return session;
            }
        };

        tracing::info!(
            app = %adapter.app(),
            goals = plan.len(),
            "capture started: {}",
            task_description
        );

        // Exclusive ownership of the application for the whole request. The
        // guard is dropped on every exit path below.
        let lock = adapter_lock(adapter.app());
        let _guard = tokio::select! {
            _ = cancel.cancelled() => {
                close(&mut session, SessionStatus::TimedOut);
                return session;
            }
            acquired = tokio::time::timeout_at(deadline_at, lock.lock_owned()) => match acquired {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::warn!(app = %adapter.app(), "deadline expired waiting for adapter lock");
                    close(&mut session, SessionStatus::TimedOut);
                    return session;
                }
            }
        };

        let outcome = tokio::time::timeout_at(
            deadline_at,
            self.run_plan(&mut session, adapter, plan.goals, &cancel),
        )
        .await;

        let status = match outcome {
            Ok(Ok(())) => SessionStatus::Complete,
            Ok(Err(Halt::Failed { reason })) => {
                tracing::warn!("capture failed: {}", reason);
                SessionStatus::Failed
            }
            Ok(Err(Halt::TimedOut { reason })) => {
                tracing::warn!("capture timed out: {}", reason);
                SessionStatus::TimedOut
            }
            Ok(Err(Halt::Cancelled)) => {
                tracing::info!("capture cancelled by caller");
                SessionStatus::TimedOut
            }
            Err(_) => {
                tracing::warn!("capture deadline of {:?} exceeded", deadline);
                SessionStatus::TimedOut
            }
        };

        close(&mut session, status);
        tracing::info!(
            status = %session.status,
            steps = session.step_count(),
            "capture finished"
        );
        session
    }

    /// Execute the planned goals sequentially, recording a step per observed
    /// transition
    async fn run_plan(
        &self,
        session: &mut WorkflowSession,
        adapter: &dyn TargetAdapter,
        goals: Vec<SubGoal>,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        let mut pending = goals;
        let mut observation_timeouts: u32 = 0;

        'goals: while let Some(goal) = pending.first().cloned() {
            tracing::info!(goal = %goal.name, "executing sub-goal");
            let mut attempt: u32 = 0;

            loop {
                if cancel.is_cancelled() {
                    return Err(Halt::Cancelled);
                }

                // Settle on the pre-action state first
                let before = match self.observer.observe(adapter, cancel).await {
                    Ok(snapshot) => snapshot,
                    Err(ObserveError::Timeout(_)) => {
                        observation_timeouts += 1;
                        if observation_timeouts >= self.config.max_observation_timeouts {
                            return Err(Halt::TimedOut {
                                reason: format!(
                                    "no stable state after {} consecutive observation timeouts",
                                    observation_timeouts
                                ),
                            });
                        }
                        continue;
                    }
                    Err(ObserveError::Cancelled) => return Err(Halt::Cancelled),
                    Err(ObserveError::Adapter(e)) => {
                        attempt += 1;
                        self.recover(&goal, attempt, &mut pending, &e.to_string(), cancel)
                            .await?;
                        if attempt > self.config.retry.max_attempts {
                            // recover() skipped an optional goal
                            continue 'goals;
                        }
                        continue;
                    }
                };

                match adapter.navigate(&goal.action).await {
                    Ok(_) => {
                        match self
                            .observer
                            .await_transition(adapter, &before.signature, cancel)
                            .await
                        {
                            Ok(after) => {
                                observation_timeouts = 0;
                                let step = self.recorder.record(
                                    session.next_index(),
                                    &before,
                                    &goal.action,
                                    &after,
                                );
                                if let Err(e) = session.append_step(step) {
                                    return Err(Halt::Failed {
                                        reason: format!("step bookkeeping error: {}", e),
                                    });
                                }
                                pending.remove(0);
                                continue 'goals;
                            }
                            Err(ObserveError::Timeout(_)) => {
                                observation_timeouts += 1;
                                if observation_timeouts >= self.config.max_observation_timeouts {
                                    return Err(Halt::TimedOut {
                                        reason: format!(
                                            "goal '{}' produced no stable transition",
                                            goal.name
                                        ),
                                    });
                                }
                                attempt += 1;
                                self.recover(
                                    &goal,
                                    attempt,
                                    &mut pending,
                                    "transition did not settle",
                                    cancel,
                                )
                                .await?;
                                if attempt > self.config.retry.max_attempts {
                                    continue 'goals;
                                }
                            }
                            Err(ObserveError::Cancelled) => return Err(Halt::Cancelled),
                            Err(ObserveError::Adapter(e)) => {
                                attempt += 1;
                                self.recover(&goal, attempt, &mut pending, &e.to_string(), cancel)
                                    .await?;
                                if attempt > self.config.retry.max_attempts {
                                    continue 'goals;
                                }
                            }
                        }
                    }
                    Err(AdapterError::ActionRejected(reason)) => {
                        attempt += 1;
                        tracing::warn!(
                            goal = %goal.name,
                            attempt,
                            "action rejected: {}",
                            reason
                        );
                        self.recover(&goal, attempt, &mut pending, &reason, cancel).await?;
                        if attempt > self.config.retry.max_attempts {
                            continue 'goals;
                        }

                        // The plan and the application may disagree about what
                        // comes next; the observed state wins
                        if let Ok(observed) = adapter.current_state().await {
                            let rederived = planner::rederive(&pending, &observed);
                            if rederived.len() != pending.len() {
                                tracing::info!(
                                    dropped = pending.len() - rederived.len(),
                                    "observed state already satisfies leading goals"
                                );
                                pending = rederived;
                                continue 'goals;
                            }
                        }
                    }
                    Err(AdapterError::Unavailable(reason)) => {
                        attempt += 1;
                        tracing::warn!(
                            goal = %goal.name,
                            attempt,
                            "target unavailable: {}",
                            reason
                        );
                        self.recover(&goal, attempt, &mut pending, &reason, cancel).await?;
                        if attempt > self.config.retry.max_attempts {
                            continue 'goals;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Recovery bookkeeping shared by every failure path of a goal
    ///
    /// While attempts remain, sleeps the backoff delay. Once the retry bound
    /// is exhausted, either drops an optional goal from the plan (the caller
    /// then moves on) or halts the session as failed.
    async fn recover(
        &self,
        goal: &SubGoal,
        attempt: u32,
        pending: &mut Vec<SubGoal>,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        if attempt > self.config.retry.max_attempts {
            if goal.optional {
                tracing::info!(goal = %goal.name, "skipping optional sub-goal: {}", reason);
                pending.remove(0);
                return Ok(());
            }
            return Err(Halt::Failed {
                reason: format!(
                    "sub-goal '{}' failed after {} attempts: {}",
                    goal.name, self.config.retry.max_attempts, reason
                ),
            });
        }

        let delay = calculate_backoff_delay(attempt, &self.config.retry);
        if delay > 0 {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Halt::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
            }
        }
        Ok(())
    }
}

/// Finalize, logging the (unreachable in practice) bookkeeping failure
fn close(session: &mut WorkflowSession, status: SessionStatus) {
    if let Err(e) = session.finalize(status) {
        tracing::error!("failed to finalize session: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ScriptedAdapter;
    use crate::artifact::MemoryArtifactStore;
    use crate::planner::plan;

    const CREATE_PROJECT: &str = "How do I create a project in Linear?";

    fn fast_config(max_attempts: u32) -> EngineConfig {
        let mut config = EngineConfig::new();
        config.poll_interval = Duration::from_millis(5);
        config.settle_interval = Duration::from_millis(10);
        config.observe_timeout = Duration::from_millis(200);
        config.max_observation_timeouts = 2;
        config.retry.max_attempts = max_attempts;
        config.retry.base_delay_ms = 5;
        config
    }

    fn orchestrator(max_attempts: u32) -> CaptureOrchestrator {
        CaptureOrchestrator::new(fast_config(max_attempts), Arc::new(MemoryArtifactStore::new()))
    }

    fn scripted_for(task: &str) -> ScriptedAdapter {
        let plan = plan(task).unwrap();
        ScriptedAdapter::from_plan(&plan, Arc::new(MemoryArtifactStore::new()))
    }

    #[tokio::test]
    async fn test_full_plan_completes_with_contiguous_steps() {
        let orchestrator = orchestrator(3);
        let adapter = scripted_for(CREATE_PROJECT);

        let session = orchestrator
            .capture_with(
                &adapter,
                CREATE_PROJECT,
                Duration::from_secs(10),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(session.status, SessionStatus::Complete);
        assert_eq!(session.step_count(), 5);
        for (i, step) in session.steps.iter().enumerate() {
            assert_eq!(step.index, i as u32 + 1);
        }
        assert_eq!(session.steps[0].title, "Navigate to Projects");
        assert!(session.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_rejections_within_retry_bound_still_complete() {
        // Rejected twice, retry bound of three: the goal must eventually
        // succeed and its step must be present
        let orchestrator = orchestrator(3);
        let adapter = scripted_for(CREATE_PROJECT).with_rejections("new project", 2);

        let session = orchestrator
            .capture_with(
                &adapter,
                CREATE_PROJECT,
                Duration::from_secs(10),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(session.status, SessionStatus::Complete);
        assert!(session
            .steps
            .iter()
            .any(|step| step.title == "Open New Project"));
    }

    #[tokio::test]
    async fn test_rejections_beyond_retry_bound_fail_with_partial_steps() {
        let orchestrator = orchestrator(1);
        let adapter = scripted_for(CREATE_PROJECT).with_rejections("new project", 5);

        let session = orchestrator
            .capture_with(
                &adapter,
                CREATE_PROJECT,
                Duration::from_secs(10),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(session.status, SessionStatus::Failed);
        // The first goal succeeded before the failing one
        assert_eq!(session.step_count(), 1);
        assert_eq!(session.steps[0].index, 1);
    }

    #[tokio::test]
    async fn test_optional_goal_is_skipped_and_indexes_stay_contiguous() {
        let orchestrator = orchestrator(1);
        // "configure settings" is the optional goal of the template
        let adapter = scripted_for(CREATE_PROJECT).with_rejections("project settings", 10);

        let session = orchestrator
            .capture_with(
                &adapter,
                CREATE_PROJECT,
                Duration::from_secs(10),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(session.status, SessionStatus::Complete);
        assert_eq!(session.step_count(), 4);
        for (i, step) in session.steps.iter().enumerate() {
            assert_eq!(step.index, i as u32 + 1);
        }
        assert!(!session
            .steps
            .iter()
            .any(|step| step.title == "Enter Project Settings"));
    }

    #[tokio::test]
    async fn test_observed_state_wins_over_stale_plan() {
        // The application already sits in the projects list, and navigating
        // there again is always rejected; re-derivation must drop the
        // satisfied goal instead of failing the session
        let orchestrator = orchestrator(3);
        let adapter = scripted_for(CREATE_PROJECT)
            .with_initial_state("projects list view")
            .with_rejections("projects", 100);

        let session = orchestrator
            .capture_with(
                &adapter,
                CREATE_PROJECT,
                Duration::from_secs(10),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(session.status, SessionStatus::Complete);
        assert_eq!(session.step_count(), 4);
        assert_eq!(session.steps[0].title, "Open New Project");
    }

    #[tokio::test]
    async fn test_flapping_signature_times_out_without_false_steps() {
        let orchestrator = orchestrator(3);
        let adapter = scripted_for(CREATE_PROJECT).with_flapping("loading", "spinner");

        let session = orchestrator
            .capture_with(
                &adapter,
                CREATE_PROJECT,
                Duration::from_secs(30),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(session.status, SessionStatus::TimedOut);
        assert_eq!(session.step_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_short_deadline_preserves_partial_steps() {
        // Runs against Notion so parallel tests holding the Linear lock
        // cannot eat into the deliberately tight budget
        let task = "How do I create a project in Notion?";
        let orchestrator = orchestrator(3);
        // Each navigation takes 150ms; a 400ms budget cannot cover five goals
        let adapter = scripted_for(task).with_navigate_latency(Duration::from_millis(150));

        let session = orchestrator
            .capture_with(
                &adapter,
                task,
                Duration::from_millis(400),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(session.status, SessionStatus::TimedOut);
        assert!(session.step_count() >= 1, "partial progress must be kept");
        assert!(session.step_count() < 5);
    }

    #[tokio::test]
    async fn test_unavailable_target_fails_after_retries() {
        let orchestrator = orchestrator(2);
        let adapter = scripted_for(CREATE_PROJECT).with_unavailable();

        let session = orchestrator
            .capture_with(
                &adapter,
                CREATE_PROJECT,
                Duration::from_secs(10),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.step_count(), 0);
    }

    #[tokio::test]
    async fn test_planning_failure_fails_with_zero_steps() {
        let orchestrator = orchestrator(3);
        let session = orchestrator
            .capture("How do I do anything in Jira?", Duration::from_secs(5))
            .await;

        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.step_count(), 0);
        assert!(session.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_cancellation_aborts_capture() {
        // Asana identity keeps this test off the contended Linear lock
        let task = "How do I create a project in Asana?";
        let orchestrator = orchestrator(3);
        let adapter = scripted_for(task).with_navigate_latency(Duration::from_millis(100));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            trigger.cancel();
        });

        let session = orchestrator
            .capture_with(&adapter, task, Duration::from_secs(30), cancel)
            .await;

        assert_eq!(session.status, SessionStatus::TimedOut);
        assert!(session.step_count() < 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_on_same_app_never_interleave() {
        let orchestrator = Arc::new(orchestrator(3));
        let log: crate::adapter::scripted::CallLog = Arc::new(std::sync::Mutex::new(Vec::new()));

        // Both adapters drive the same application identity (Linear), so the
        // second capture must wait for the first to release the lock
        let first = scripted_for(CREATE_PROJECT).with_call_log(log.clone(), "first");
        let second = scripted_for(CREATE_PROJECT).with_call_log(log.clone(), "second");

        let orch_a = orchestrator.clone();
        let orch_b = orchestrator.clone();
        let task_a = tokio::spawn(async move {
            orch_a
                .capture_with(
                    &first,
                    CREATE_PROJECT,
                    Duration::from_secs(30),
                    CancellationToken::new(),
                )
                .await
        });
        let task_b = tokio::spawn(async move {
            orch_b
                .capture_with(
                    &second,
                    CREATE_PROJECT,
                    Duration::from_secs(30),
                    CancellationToken::new(),
                )
                .await
        });

        let (session_a, session_b) = (task_a.await.unwrap(), task_b.await.unwrap());
        assert_eq!(session_a.status, SessionStatus::Complete);
        assert_eq!(session_b.status, SessionStatus::Complete);

        // All of one request's adapter calls happen before any of the
        // other's: exactly one tag switch in the whole log
        let entries = log.lock().unwrap();
        let tags: Vec<&str> = entries
            .iter()
            .map(|entry| entry.split(':').next().unwrap())
            .collect();
        let switches = tags.windows(2).filter(|pair| pair[0] != pair[1]).count();
        assert!(!tags.is_empty());
        assert!(
            switches <= 1,
            "adapter calls interleaved across requests: {:?}",
            *entries
        );
    }
}
