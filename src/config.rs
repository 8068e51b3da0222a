//! Configuration for the capture engine
//!
//! This module handles loading and managing engine tuning values. Values come
//! from defaults, overridden by `FLOWSCRIBE_*` environment variables (a `.env`
//! file is loaded by the binary before this runs).

use crate::retry::{create_standard_retry_config, RetryConfig};
use std::env;
use std::time::Duration;

/// Engine configuration structure
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between state polls while waiting for a transition
    pub poll_interval: Duration,

    /// Minimum interval a signature must stay unchanged before it is
    /// considered stable
    pub settle_interval: Duration,

    /// Bounded wait for a single observation before it times out
    pub observe_timeout: Duration,

    /// Consecutive observation timeouts tolerated before the request is
    /// declared timed out
    pub max_observation_timeouts: u32,

    /// Retry behavior for rejected or failed navigations
    pub retry: RetryConfig,

    /// Wall-clock budget used when the caller does not supply a deadline
    pub default_deadline: Duration,
}

impl EngineConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            settle_interval: Duration::from_millis(400),
            observe_timeout: Duration::from_secs(10),
            max_observation_timeouts: 3,
            retry: create_standard_retry_config(),
            default_deadline: Duration::from_secs(120),
        }
    }

    /// Create a configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Some(ms) = env_u64("FLOWSCRIBE_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("FLOWSCRIBE_SETTLE_INTERVAL_MS") {
            config.settle_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("FLOWSCRIBE_OBSERVE_TIMEOUT_SECS") {
            config.observe_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("FLOWSCRIBE_MAX_OBSERVATION_TIMEOUTS") {
            config.max_observation_timeouts = n as u32;
        }
        if let Some(n) = env_u64("FLOWSCRIBE_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = n as u32;
        }
        if let Some(ms) = env_u64("FLOWSCRIBE_RETRY_BASE_DELAY_MS") {
            config.retry.base_delay_ms = ms;
        }
        if let Some(secs) = env_u64("FLOWSCRIBE_DEFAULT_DEADLINE_SECS") {
            config.default_deadline = Duration::from_secs(secs);
        }

        config
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}
