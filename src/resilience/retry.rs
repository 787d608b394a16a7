//! Retry attempt tracking and backoff computation
//!
//! Attempt counters are keyed by `(client, category)` and count attempts
//! since the first failure of the current retry sequence. Each counter
//! carries its insertion time so the recovery sweep can expire stale
//! entries individually on a sliding window.

use crate::resilience::classifier::ErrorCategory;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct RetryCounter {
    attempts: u32,
    started_at: DateTime<Utc>,
}

/// Tracks in-flight retry sequences
#[derive(Default)]
pub struct RetryTracker {
    counters: RwLock<HashMap<(String, ErrorCategory), RetryCounter>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts recorded so far for this `(client, category)` sequence
    pub async fn attempts(&self, client_id: &str, category: ErrorCategory) -> u32 {
        self.counters
            .read()
            .await
            .get(&(client_id.to_string(), category))
            .map(|c| c.attempts)
            .unwrap_or(0)
    }

    /// Record one more attempt, creating the counter on first use
    pub async fn increment(&self, client_id: &str, category: ErrorCategory) -> u32 {
        let mut counters = self.counters.write().await;
        let counter = counters
            .entry((client_id.to_string(), category))
            .or_insert_with(|| RetryCounter {
                attempts: 0,
                started_at: Utc::now(),
            });
        counter.attempts += 1;
        counter.attempts
    }

    /// Drop the counter for a finished sequence (success or exhaustion)
    pub async fn remove(&self, client_id: &str, category: ErrorCategory) {
        self.counters
            .write()
            .await
            .remove(&(client_id.to_string(), category));
    }

    /// Number of live retry sequences
    pub async fn active_count(&self) -> usize {
        self.counters.read().await.len()
    }

    /// Expire counters older than `ttl`, returning how many were dropped
    pub async fn expire_older_than(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let mut counters = self.counters.write().await;
        let before = counters.len();
        counters.retain(|_, counter| counter.started_at >= cutoff);
        let expired = before - counters.len();
        if expired > 0 {
            debug!(expired, "expired stale retry counters");
        }
        expired
    }

    /// Drop every counter
    pub async fn clear(&self) {
        self.counters.write().await.clear();
    }
}

/// Exponential backoff delay before the next attempt
///
/// `base * 2^attempts_so_far`, attempts counted from zero; the shift is
/// capped so large attempt counts cannot overflow.
pub fn backoff_delay(base: Duration, attempts_so_far: u32) -> Duration {
    let factor = 1i64 << attempts_so_far.min(20);
    Duration::milliseconds(base.num_milliseconds().saturating_mul(factor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::seconds(1);
        assert_eq!(backoff_delay(base, 0), Duration::seconds(1));
        assert_eq!(backoff_delay(base, 1), Duration::seconds(2));
        assert_eq!(backoff_delay(base, 2), Duration::seconds(4));
        assert_eq!(backoff_delay(Duration::milliseconds(500), 3), Duration::seconds(4));
    }

    #[tokio::test]
    async fn test_counter_lifecycle() {
        let tracker = RetryTracker::new();
        assert_eq!(tracker.attempts("c1", ErrorCategory::Network).await, 0);

        assert_eq!(tracker.increment("c1", ErrorCategory::Network).await, 1);
        assert_eq!(tracker.increment("c1", ErrorCategory::Network).await, 2);
        assert_eq!(tracker.attempts("c1", ErrorCategory::Network).await, 2);

        // Counters are keyed per client and category.
        assert_eq!(tracker.attempts("c1", ErrorCategory::Timeout).await, 0);
        assert_eq!(tracker.attempts("c2", ErrorCategory::Network).await, 0);

        tracker.increment("c2", ErrorCategory::Network).await;
        assert_eq!(tracker.active_count().await, 2);

        tracker.remove("c1", ErrorCategory::Network).await;
        assert_eq!(tracker.attempts("c1", ErrorCategory::Network).await, 0);
        assert_eq!(tracker.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_sliding_window_expiry() {
        let tracker = RetryTracker::new();
        tracker.increment("c1", ErrorCategory::Network).await;
        tracker.increment("c2", ErrorCategory::Timeout).await;

        // Nothing is old enough yet.
        assert_eq!(tracker.expire_older_than(Duration::hours(1)).await, 0);
        assert_eq!(tracker.active_count().await, 2);

        // A zero-age window expires everything.
        assert_eq!(tracker.expire_older_than(Duration::zero()).await, 2);
        assert_eq!(tracker.active_count().await, 0);
    }
}
