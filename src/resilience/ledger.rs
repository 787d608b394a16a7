//! Error history and aggregate statistics
//!
//! Bounded per-client append log of classified error records plus
//! aggregate counters by category and by client. All counters move under
//! one write lock so the totals always reconcile.

use crate::resilience::classifier::{ErrorCategory, ErrorRecord};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

struct LedgerInner {
    history: HashMap<String, VecDeque<ErrorRecord>>,
    errors_by_category: HashMap<ErrorCategory, u64>,
    errors_by_client: HashMap<String, u64>,
    total_errors: u64,
}

/// Bounded error history with aggregate counters
pub struct ErrorLedger {
    max_per_client: usize,
    inner: RwLock<LedgerInner>,
}

impl ErrorLedger {
    /// Create a ledger capping each client's history at `max_per_client`
    pub fn new(max_per_client: usize) -> Self {
        Self {
            max_per_client,
            inner: RwLock::new(LedgerInner {
                history: HashMap::new(),
                errors_by_category: HashMap::new(),
                errors_by_client: HashMap::new(),
                total_errors: 0,
            }),
        }
    }

    /// Append a record and bump the aggregate counters
    ///
    /// Oldest entries are evicted FIFO once the per-client cap is hit.
    pub async fn record(&self, record: &ErrorRecord) {
        let mut inner = self.inner.write().await;

        let entries = inner.history.entry(record.client_id.clone()).or_default();
        entries.push_back(record.clone());
        while entries.len() > self.max_per_client {
            entries.pop_front();
        }

        *inner.errors_by_category.entry(record.category).or_insert(0) += 1;
        *inner
            .errors_by_client
            .entry(record.client_id.clone())
            .or_insert(0) += 1;
        inner.total_errors += 1;
    }

    /// Snapshot of one client's history, oldest first
    pub async fn history(&self, client_id: &str) -> Vec<ErrorRecord> {
        self.inner
            .read()
            .await
            .history
            .get(client_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every client's history
    pub async fn all_history(&self) -> HashMap<String, Vec<ErrorRecord>> {
        self.inner
            .read()
            .await
            .history
            .iter()
            .map(|(client, entries)| (client.clone(), entries.iter().cloned().collect()))
            .collect()
    }

    /// Most recent record for a client
    pub async fn latest_record(&self, client_id: &str) -> Option<ErrorRecord> {
        self.inner
            .read()
            .await
            .history
            .get(client_id)
            .and_then(|entries| entries.back().cloned())
    }

    /// Clear one client's history, or all history
    ///
    /// Aggregate counters are left untouched; calling this twice in a row
    /// is a no-op the second time.
    pub async fn clear_history(&self, client_id: Option<&str>) {
        let mut inner = self.inner.write().await;
        match client_id {
            Some(client) => {
                inner.history.remove(client);
                debug!(client_id = client, "cleared error history");
            }
            None => {
                inner.history.clear();
                debug!("cleared all error history");
            }
        }
    }

    /// Drop all history and reset every aggregate counter
    ///
    /// Used at teardown; `clear_history` is the counter-preserving
    /// operational variant.
    pub async fn clear_all(&self) {
        let mut inner = self.inner.write().await;
        inner.history.clear();
        inner.errors_by_category.clear();
        inner.errors_by_client.clear();
        inner.total_errors = 0;
        debug!("cleared error ledger");
    }

    /// Total errors recorded since construction
    pub async fn total_errors(&self) -> u64 {
        self.inner.read().await.total_errors
    }

    /// Aggregate counters by category
    pub async fn errors_by_category(&self) -> HashMap<ErrorCategory, u64> {
        self.inner.read().await.errors_by_category.clone()
    }

    /// Aggregate counters by client
    pub async fn errors_by_client(&self) -> HashMap<String, u64> {
        self.inner.read().await.errors_by_client.clone()
    }

    /// Clients whose recorded error count exceeds `threshold`
    pub async fn clients_exceeding(&self, threshold: u64) -> Vec<String> {
        self.inner
            .read()
            .await
            .errors_by_client
            .iter()
            .filter(|(_, count)| **count > threshold)
            .map(|(client, _)| client.clone())
            .collect()
    }
}
