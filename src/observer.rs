//! UI state observation
//!
//! Samples an adapter's state and decides when a meaningful transition has
//! happened. Signatures are compared structurally; a signature only counts
//! once it has stayed unchanged across two consecutive polls separated by the
//! settle interval, which filters loading spinners and other transient
//! states. Every wait point checks the caller's cancellation token.

use crate::adapter::{AdapterError, StateSignature, TargetAdapter, UIStateSnapshot};
use crate::config::EngineConfig;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Error types for observation
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    /// No stable signature was reached within the bounded wait
    #[error("no stable UI state within {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the capture
    #[error("observation cancelled")]
    Cancelled,

    /// The adapter failed while being sampled
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Samples adapter state and detects transitions
#[derive(Debug, Clone)]
pub struct StateObserver {
    poll_interval: Duration,
    settle_interval: Duration,
    observe_timeout: Duration,
}

impl StateObserver {
    pub fn new(poll_interval: Duration, settle_interval: Duration, observe_timeout: Duration) -> Self {
        Self {
            poll_interval,
            settle_interval,
            observe_timeout,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.poll_interval,
            config.settle_interval,
            config.observe_timeout,
        )
    }

    /// Whether the signature changed between two snapshots
    ///
    /// Structural comparison only; artifact content is never consulted.
    pub fn has_transitioned(&self, previous: &StateSignature, current: &StateSignature) -> bool {
        previous != current
    }

    /// Read the adapter's current state, requiring a stable signature
    ///
    /// Polls until two consecutive samples separated by the settle interval
    /// agree, or the bounded wait expires.
    pub async fn observe(
        &self,
        adapter: &dyn TargetAdapter,
        cancel: &CancellationToken,
    ) -> Result<UIStateSnapshot, ObserveError> {
        let started = Instant::now();
        let mut last: Option<UIStateSnapshot> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(ObserveError::Cancelled);
            }
            if started.elapsed() >= self.observe_timeout {
                return Err(ObserveError::Timeout(self.observe_timeout));
            }

            let current = adapter.current_state().await?;
            if let Some(previous) = &last {
                if previous.signature == current.signature {
                    return Ok(current);
                }
                tracing::trace!(
                    previous = %previous.signature,
                    current = %current.signature,
                    "signature not settled yet"
                );
            }
            last = Some(current);

            self.pause(self.settle_interval, cancel).await?;
        }
    }

    /// Wait until the adapter settles in a state different from `previous`
    ///
    /// A changed signature must itself survive the settle interval before it
    /// is reported, so a flap through an intermediate state is not mistaken
    /// for the destination.
    pub async fn await_transition(
        &self,
        adapter: &dyn TargetAdapter,
        previous: &StateSignature,
        cancel: &CancellationToken,
    ) -> Result<UIStateSnapshot, ObserveError> {
        let started = Instant::now();

        loop {
            if cancel.is_cancelled() {
                return Err(ObserveError::Cancelled);
            }
            if started.elapsed() >= self.observe_timeout {
                return Err(ObserveError::Timeout(self.observe_timeout));
            }

            let candidate = adapter.current_state().await?;
            if self.has_transitioned(previous, &candidate.signature) {
                self.pause(self.settle_interval, cancel).await?;
                let confirm = adapter.current_state().await?;
                if confirm.signature == candidate.signature {
                    return Ok(confirm);
                }
                // Transient state; keep polling
                tracing::trace!(candidate = %candidate.signature, "transition did not settle");
            } else {
                self.pause(self.poll_interval, cancel).await?;
            }
        }
    }

    /// Sleep that aborts promptly on cancellation
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), ObserveError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ObserveError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
