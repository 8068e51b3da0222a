//! Shared retry and backoff utilities for adapter recovery
//!
//! Standardized backoff behavior for navigation retries:
//! - Linear backoff with jitter by default (supports exponential as an option)
//! - Maximum waiting time between retries capped at the configured ceiling
//! - Helper functions to create standardized retry configurations

/// Standard retry constants for adapter recovery
pub mod constants {
    /// Default maximum retry attempts per sub-goal
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Default base delay for linear backoff (250 milliseconds)
    pub const DEFAULT_BASE_DELAY_MS: u64 = 250;

    /// Maximum waiting time between retries (5 seconds)
    pub const MAX_RETRY_DELAY_MS: u64 = 5000;
}

/// Configuration for retrying a rejected or failed navigation
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,

    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Whether to use exponential (true) or linear (false) backoff
    pub use_exponential: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        create_standard_retry_config()
    }
}

/// Calculate exponential backoff delay with jitter
pub fn calculate_exponential_backoff(attempt: u32, config: &RetryConfig) -> u64 {
    if attempt == 0 {
        return 0; // No delay on first attempt
    }

    // Exponential backoff: delay = base * 2^(attempt-1)
    let exponent = attempt.saturating_sub(1);
    let exponential_delay = config.base_delay_ms * (2_u64.saturating_pow(exponent));

    apply_jitter(exponential_delay, config)
}

/// Calculate linear backoff delay with jitter
pub fn calculate_linear_backoff(attempt: u32, config: &RetryConfig) -> u64 {
    if attempt == 0 {
        return 0; // No delay on first attempt
    }

    let linear_delay = config.base_delay_ms * (attempt as u64);

    apply_jitter(linear_delay, config)
}

/// Calculate backoff delay based on configuration
pub fn calculate_backoff_delay(attempt: u32, config: &RetryConfig) -> u64 {
    if config.use_exponential {
        calculate_exponential_backoff(attempt, config)
    } else {
        calculate_linear_backoff(attempt, config)
    }
}

/// Add ±10% jitter to prevent synchronized retries, capped at the ceiling
fn apply_jitter(delay_ms: u64, config: &RetryConfig) -> u64 {
    let jitter_range = delay_ms / 10;
    let with_jitter = if jitter_range > 0 {
        let jitter = rand::random::<u64>() % (jitter_range * 2);
        delay_ms.saturating_add(jitter).saturating_sub(jitter_range)
    } else {
        delay_ms
    };

    with_jitter.min(config.max_delay_ms)
}

/// Creates the standard retry configuration: linear backoff, short base
/// delay, delay ceiling from [`constants::MAX_RETRY_DELAY_MS`]
pub fn create_standard_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
        base_delay_ms: constants::DEFAULT_BASE_DELAY_MS,
        max_delay_ms: constants::MAX_RETRY_DELAY_MS,
        use_exponential: false, // Use linear backoff
    }
}

/// Creates a retry configuration with linear backoff strategy
pub fn create_linear_backoff_config(
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
) -> RetryConfig {
    RetryConfig {
        max_attempts: max_attempts.unwrap_or(constants::DEFAULT_MAX_ATTEMPTS),
        base_delay_ms: base_delay_ms.unwrap_or(constants::DEFAULT_BASE_DELAY_MS),
        max_delay_ms: constants::MAX_RETRY_DELAY_MS,
        use_exponential: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: u64, exponential: bool) -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            base_delay_ms: base,
            max_delay_ms: 5000,
            use_exponential: exponential,
        }
    }

    #[test]
    fn test_first_attempt_has_no_delay() {
        assert_eq!(calculate_backoff_delay(0, &config(1000, false)), 0);
        assert_eq!(calculate_backoff_delay(0, &config(1000, true)), 0);
    }

    #[test]
    fn test_linear_backoff_within_jitter_bounds() {
        let cfg = config(1000, false);
        for attempt in 1..=4 {
            let expected = 1000 * attempt as u64;
            let delay = calculate_linear_backoff(attempt, &cfg);
            assert!(delay >= expected - expected / 10);
            assert!(delay <= expected + expected / 10);
        }
    }

    #[test]
    fn test_exponential_backoff_doubles() {
        let cfg = config(100, true);
        let d1 = calculate_exponential_backoff(1, &cfg);
        let d3 = calculate_exponential_backoff(3, &cfg);
        // 100ms vs 400ms nominal, jitter is only ±10%
        assert!(d3 > d1 * 2);
    }

    #[test]
    fn test_delay_capped_at_ceiling() {
        let cfg = config(4000, true);
        // Nominal delay at attempt 5 is 64s, far over the 5s ceiling
        assert_eq!(calculate_exponential_backoff(5, &cfg), 5000);
    }

    #[test]
    fn test_standard_config_is_linear() {
        let cfg = create_standard_retry_config();
        assert!(!cfg.use_exponential);
        assert_eq!(cfg.max_attempts, constants::DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_linear_config_overrides() {
        let cfg = create_linear_backoff_config(Some(7), None);
        assert_eq!(cfg.max_attempts, 7);
        assert_eq!(cfg.base_delay_ms, constants::DEFAULT_BASE_DELAY_MS);
    }
}
