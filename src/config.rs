//! Error handling configuration
//!
//! Resolves the reaction strategy, retry budget and backoff base delay for
//! each error category. Categories without an explicit override fall back
//! to built-in defaults, so resolution never fails.

use crate::resilience::classifier::ErrorCategory;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reaction strategy applied when an error of a given category is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Attempt a category-specific alternate path
    Fallback,
    /// Notify an operator, then re-raise
    Escalate,
    /// Do not retry or escalate; re-raise immediately
    Ignore,
    /// Log at severity-appropriate level, then re-raise
    Log,
    /// Gate operations through a circuit breaker
    CircuitBreaker,
    /// Run the recovery-action list for the client, then re-raise
    AutoRecover,
}

/// Handler-wide error handling configuration
///
/// Per-category override maps are consulted first; the documented defaults
/// apply otherwise.
#[derive(Debug, Clone)]
pub struct ErrorHandlingConfig {
    /// Per-category strategy overrides
    pub strategies: HashMap<ErrorCategory, ErrorStrategy>,
    /// Per-category retry budget overrides
    pub max_retries: HashMap<ErrorCategory, u32>,
    /// Per-category backoff base delay overrides
    pub retry_delays: HashMap<ErrorCategory, Duration>,
    /// Enable circuit breaker gating
    pub enable_circuit_breaker: bool,
    /// Consecutive failures before a breaker opens
    pub circuit_breaker_threshold: u32,
    /// How long an open breaker blocks before admitting a probe
    pub circuit_breaker_timeout: Duration,
    /// Enable the periodic auto-recovery sweep
    pub enable_auto_recovery: bool,
    /// Sweep interval
    pub auto_recovery_interval: Duration,
    /// Recorded errors per client before the sweep triggers recovery
    pub auto_recovery_error_threshold: u64,
    /// FIFO cap on per-client error history
    pub max_history_per_client: usize,
    /// How long a client stays marked as in recovery
    pub recovery_cooldown: Duration,
    /// Retry attempt counters older than this are expired by the sweep
    pub retry_counter_ttl: Duration,
    /// Capacity of the error event broadcast channel
    pub event_channel_capacity: usize,
    /// How long cached fallback values stay servable
    pub fallback_cache_ttl: Duration,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            strategies: HashMap::new(),
            max_retries: HashMap::new(),
            retry_delays: HashMap::new(),
            enable_circuit_breaker: true,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::seconds(60),
            enable_auto_recovery: true,
            auto_recovery_interval: Duration::seconds(60),
            auto_recovery_error_threshold: 10,
            max_history_per_client: 1000,
            recovery_cooldown: Duration::seconds(60),
            retry_counter_ttl: Duration::hours(1),
            event_channel_capacity: 256,
            fallback_cache_ttl: Duration::minutes(5),
        }
    }
}

impl ErrorHandlingConfig {
    /// Override the strategy for a category
    pub fn with_strategy(mut self, category: ErrorCategory, strategy: ErrorStrategy) -> Self {
        self.strategies.insert(category, strategy);
        self
    }

    /// Override the retry budget for a category
    pub fn with_max_retries(mut self, category: ErrorCategory, max_retries: u32) -> Self {
        self.max_retries.insert(category, max_retries);
        self
    }

    /// Override the backoff base delay for a category
    pub fn with_retry_delay(mut self, category: ErrorCategory, delay: Duration) -> Self {
        self.retry_delays.insert(category, delay);
        self
    }

    /// Resolve the strategy for a category
    pub fn strategy_for(&self, category: ErrorCategory) -> ErrorStrategy {
        if let Some(strategy) = self.strategies.get(&category) {
            return *strategy;
        }
        match category {
            ErrorCategory::Authentication => ErrorStrategy::Retry,
            ErrorCategory::Network | ErrorCategory::Timeout => ErrorStrategy::CircuitBreaker,
            ErrorCategory::Validation => ErrorStrategy::Log,
            ErrorCategory::Unknown => ErrorStrategy::Escalate,
            _ => ErrorStrategy::Retry,
        }
    }

    /// Resolve the retry budget for a category
    pub fn max_retries_for(&self, category: ErrorCategory) -> u32 {
        if let Some(max) = self.max_retries.get(&category) {
            return *max;
        }
        match category {
            ErrorCategory::Authentication => 2,
            ErrorCategory::Network | ErrorCategory::Timeout => 3,
            ErrorCategory::Validation => 0,
            ErrorCategory::Unknown => 1,
            _ => 1,
        }
    }

    /// Resolve the backoff base delay for a category
    pub fn retry_delay_for(&self, category: ErrorCategory) -> Duration {
        if let Some(delay) = self.retry_delays.get(&category) {
            return *delay;
        }
        match category {
            ErrorCategory::Authentication => Duration::seconds(2),
            ErrorCategory::Network | ErrorCategory::Timeout => Duration::seconds(1),
            _ => Duration::milliseconds(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolution_table() {
        let config = ErrorHandlingConfig::default();

        assert_eq!(
            config.strategy_for(ErrorCategory::Authentication),
            ErrorStrategy::Retry
        );
        assert_eq!(
            config.strategy_for(ErrorCategory::Network),
            ErrorStrategy::CircuitBreaker
        );
        assert_eq!(
            config.strategy_for(ErrorCategory::Timeout),
            ErrorStrategy::CircuitBreaker
        );
        assert_eq!(
            config.strategy_for(ErrorCategory::Validation),
            ErrorStrategy::Log
        );
        assert_eq!(
            config.strategy_for(ErrorCategory::Unknown),
            ErrorStrategy::Escalate
        );
        assert_eq!(
            config.strategy_for(ErrorCategory::Batch),
            ErrorStrategy::Retry
        );

        assert_eq!(config.max_retries_for(ErrorCategory::Authentication), 2);
        assert_eq!(config.max_retries_for(ErrorCategory::Network), 3);
        assert_eq!(config.max_retries_for(ErrorCategory::Validation), 0);
        assert_eq!(config.max_retries_for(ErrorCategory::Unknown), 1);
        assert_eq!(config.max_retries_for(ErrorCategory::Permission), 1);

        assert_eq!(
            config.retry_delay_for(ErrorCategory::Authentication),
            Duration::seconds(2)
        );
        assert_eq!(
            config.retry_delay_for(ErrorCategory::Timeout),
            Duration::seconds(1)
        );
        assert_eq!(
            config.retry_delay_for(ErrorCategory::Batch),
            Duration::milliseconds(500)
        );
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = ErrorHandlingConfig::default()
            .with_strategy(ErrorCategory::Network, ErrorStrategy::Retry)
            .with_max_retries(ErrorCategory::Network, 7)
            .with_retry_delay(ErrorCategory::Network, Duration::milliseconds(10));

        assert_eq!(
            config.strategy_for(ErrorCategory::Network),
            ErrorStrategy::Retry
        );
        assert_eq!(config.max_retries_for(ErrorCategory::Network), 7);
        assert_eq!(
            config.retry_delay_for(ErrorCategory::Network),
            Duration::milliseconds(10)
        );
    }
}
