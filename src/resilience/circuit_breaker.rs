//! Circuit breaker for per-category failure gating
//!
//! Tracks consecutive failures per error category and blocks new
//! operations in that category once a threshold is reached, admitting a
//! probe after the configured timeout to test recovery.

use crate::error::{ResilienceError, Result};
use crate::resilience::classifier::ErrorCategory;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation
    Closed,
    /// Operations blocked until the timeout elapses
    Open,
    /// Probing whether the category has recovered
    HalfOpen,
}

/// Point-in-time view of a breaker, exposed through statistics queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
}

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    next_attempt_time: Option<DateTime<Utc>>,
}

/// Consecutive-failure circuit breaker
pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    timeout: Duration,
    inner: Arc<RwLock<BreakerInner>>,
}

impl CircuitBreaker {
    /// Create a new breaker in the closed state
    pub fn new(name: impl Into<String>, threshold: u32, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            threshold,
            timeout,
            inner: Arc::new(RwLock::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_time: None,
                next_attempt_time: None,
            })),
        }
    }

    /// Breaker name (the category it gates)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gate check: may this operation proceed?
    ///
    /// Open breakers reject until `next_attempt_time`, at which point the
    /// state flips to half-open as a side effect of the check and the call
    /// proceeds as a probe. Half-open never rejects, so concurrent callers
    /// may all probe at once; a single-probe gate is a documented possible
    /// tightening of these semantics.
    pub async fn check(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let due = inner
                    .next_attempt_time
                    .map(|t| Utc::now() >= t)
                    .unwrap_or(true);
                if due {
                    inner.state = BreakerState::HalfOpen;
                    info!(breaker = %self.name, "circuit breaker half-open, admitting probe");
                    Ok(())
                } else {
                    debug!(breaker = %self.name, "circuit breaker open, rejecting request");
                    Err(ResilienceError::circuit_open(&self.name))
                }
            }
        }
    }

    /// Record a successful operation: reset and close
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        if inner.state != BreakerState::Closed {
            info!(breaker = %self.name, "circuit breaker closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.next_attempt_time = None;
    }

    /// Record a failed operation
    ///
    /// Counts only while closed or half-open. Closing the threshold gap
    /// opens the breaker and arms `next_attempt_time`; any half-open
    /// failure re-opens immediately.
    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(now);
                if inner.failure_count >= self.threshold {
                    inner.state = BreakerState::Open;
                    inner.next_attempt_time = Some(now + self.timeout);
                    warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "circuit breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(now);
                inner.state = BreakerState::Open;
                inner.next_attempt_time = Some(now + self.timeout);
                warn!(breaker = %self.name, "probe failed, circuit breaker re-opened");
            }
            BreakerState::Open => {
                // Late completion of an operation admitted before the
                // breaker opened; the count stays as-is.
                inner.last_failure_time = Some(now);
            }
        }
    }

    /// Run an operation through the gate, recording the outcome
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.check().await?;
        match operation().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(error) => {
                self.record_failure().await;
                Err(error)
            }
        }
    }

    /// Current state
    pub async fn state(&self) -> BreakerState {
        self.inner.read().await.state
    }

    /// Point-in-time snapshot for statistics
    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.read().await;
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure_time,
            next_attempt_time: inner.next_attempt_time,
        }
    }

    /// Force the breaker back to closed
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
        inner.next_attempt_time = None;
        info!(breaker = %self.name, "circuit breaker reset");
    }
}

/// Fixed registry of per-category breakers
///
/// Built once at handler construction for the categories whose resolved
/// strategy is circuit-breaker; breakers live for the handler's lifetime.
pub struct BreakerRegistry {
    breakers: HashMap<ErrorCategory, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create breakers for the given categories
    pub fn new(
        categories: impl IntoIterator<Item = ErrorCategory>,
        threshold: u32,
        timeout: Duration,
    ) -> Self {
        let breakers = categories
            .into_iter()
            .map(|category| {
                (
                    category,
                    Arc::new(CircuitBreaker::new(category.to_string(), threshold, timeout)),
                )
            })
            .collect();
        Self { breakers }
    }

    /// Breaker for a category, if one is configured
    pub fn get(&self, category: ErrorCategory) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(&category).cloned()
    }

    /// Snapshots of every breaker
    pub async fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots = Vec::with_capacity(self.breakers.len());
        for breaker in self.breakers.values() {
            snapshots.push(breaker.snapshot().await);
        }
        snapshots
    }

    /// Reset every breaker to closed
    pub async fn reset_all(&self) {
        for breaker in self.breakers.values() {
            breaker.reset().await;
        }
    }
}
