//! Resilience orchestrator
//!
//! Wraps a caller-supplied asynchronous operation, consults the circuit
//! breaker gate, and on failure classifies, records, publishes and
//! dispatches the configured per-category strategy. Every failure is
//! eventually re-raised to the caller unless a retry attempt or fallback
//! genuinely produces a successful result.

use crate::config::{ErrorHandlingConfig, ErrorStrategy};
use crate::error::{ResilienceError, Result};
use crate::resilience::circuit_breaker::{BreakerRegistry, BreakerSnapshot, CircuitBreaker};
use crate::resilience::classifier::{
    ErrorCategory, ErrorClassifier, ErrorRecord, ErrorSeverity, SYSTEM_CLIENT,
};
use crate::resilience::ledger::ErrorLedger;
use crate::resilience::recovery::{
    LoggingRecoveryExecutor, RecoveryAction, RecoveryCoordinator, RecoveryExecutor,
};
use crate::resilience::retry::{backoff_delay, RetryTracker};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-call options for [`ErrorHandler::handle_error`]
#[derive(Debug, Clone, Default)]
pub struct HandleOptions {
    /// Owning client; defaults to the `"system"` sentinel
    pub client_id: Option<String>,
    /// Category gated ahead of execution when its strategy is
    /// circuit-breaker
    pub expected_category: Option<ErrorCategory>,
    /// Free-form context merged into the classified record
    pub context: HashMap<String, serde_json::Value>,
}

impl HandleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Self::default()
        }
    }

    pub fn expecting(mut self, category: ErrorCategory) -> Self {
        self.expected_category = Some(category);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Notified when an error escalates
#[async_trait]
pub trait EscalationNotifier: Send + Sync {
    async fn notify(&self, record: &ErrorRecord) -> Result<()>;
}

/// Default notifier: logs the escalation at error level
pub struct LoggingEscalationNotifier;

#[async_trait]
impl EscalationNotifier for LoggingEscalationNotifier {
    async fn notify(&self, record: &ErrorRecord) -> Result<()> {
        error!(
            client_id = %record.client_id,
            category = %record.category,
            code = %record.code,
            "escalated error: {}",
            record.message
        );
        Ok(())
    }
}

/// Aggregate error state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorStatistics {
    pub total_errors: u64,
    pub errors_by_category: HashMap<ErrorCategory, u64>,
    pub errors_by_client: HashMap<String, u64>,
    pub circuit_breakers: Vec<BreakerSnapshot>,
    pub clients_in_recovery: usize,
    pub active_retry_counters: usize,
}

#[derive(Debug, Clone)]
struct CachedValue {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

type FallbackCache = Arc<RwLock<HashMap<(String, ErrorCategory), CachedValue>>>;

/// What the strategy dispatch decided for one failure
enum FailureDispatch {
    /// Re-raise the original failure to the caller
    Reraise,
    /// Wait out the backoff, then re-invoke
    Retry(Duration),
    /// Try the category's alternate paths
    Fallback,
}

/// Builder for [`ErrorHandler`] with injectable collaborator seams
pub struct ErrorHandlerBuilder {
    config: ErrorHandlingConfig,
    recovery_executor: Arc<dyn RecoveryExecutor>,
    escalation: Arc<dyn EscalationNotifier>,
}

impl ErrorHandlerBuilder {
    pub fn new(config: ErrorHandlingConfig) -> Self {
        Self {
            config,
            recovery_executor: Arc::new(LoggingRecoveryExecutor),
            escalation: Arc::new(LoggingEscalationNotifier),
        }
    }

    /// Inject the recovery-action executor
    pub fn recovery_executor(mut self, executor: Arc<dyn RecoveryExecutor>) -> Self {
        self.recovery_executor = executor;
        self
    }

    /// Inject the escalation notifier
    pub fn escalation_notifier(mut self, notifier: Arc<dyn EscalationNotifier>) -> Self {
        self.escalation = notifier;
        self
    }

    pub fn build(self) -> ErrorHandler {
        let cancel = CancellationToken::new();

        let breaker_categories: Vec<ErrorCategory> = if self.config.enable_circuit_breaker {
            ErrorCategory::ALL
                .into_iter()
                .filter(|c| self.config.strategy_for(*c) == ErrorStrategy::CircuitBreaker)
                .collect()
        } else {
            Vec::new()
        };
        let breakers = BreakerRegistry::new(
            breaker_categories,
            self.config.circuit_breaker_threshold,
            self.config.circuit_breaker_timeout,
        );

        let ledger = Arc::new(ErrorLedger::new(self.config.max_history_per_client));
        let retries = Arc::new(RetryTracker::new());
        let recovery = Arc::new(RecoveryCoordinator::new(
            self.recovery_executor,
            self.config.recovery_cooldown,
            cancel.clone(),
        ));
        let fallback_cache: FallbackCache = Arc::new(RwLock::new(HashMap::new()));

        let (events_tx, _) = broadcast::channel(self.config.event_channel_capacity.max(1));

        if self.config.enable_auto_recovery {
            spawn_recovery_sweep(
                &self.config,
                ledger.clone(),
                retries.clone(),
                recovery.clone(),
                fallback_cache.clone(),
                cancel.clone(),
            );
        }

        ErrorHandler {
            config: self.config,
            breakers,
            ledger,
            retries,
            recovery,
            escalation: self.escalation,
            events_tx: RwLock::new(Some(events_tx)),
            fallback_cache,
            cancel,
            disposed: AtomicBool::new(false),
        }
    }
}

/// Resilience orchestrator façade
pub struct ErrorHandler {
    config: ErrorHandlingConfig,
    breakers: BreakerRegistry,
    ledger: Arc<ErrorLedger>,
    retries: Arc<RetryTracker>,
    recovery: Arc<RecoveryCoordinator>,
    escalation: Arc<dyn EscalationNotifier>,
    events_tx: RwLock<Option<broadcast::Sender<ErrorRecord>>>,
    fallback_cache: FallbackCache,
    cancel: CancellationToken,
    disposed: AtomicBool,
}

impl ErrorHandler {
    /// Create a handler with the default collaborator seams
    pub fn new(config: ErrorHandlingConfig) -> Self {
        ErrorHandlerBuilder::new(config).build()
    }

    /// Builder for injecting recovery and escalation collaborators
    pub fn builder(config: ErrorHandlingConfig) -> ErrorHandlerBuilder {
        ErrorHandlerBuilder::new(config)
    }

    /// Supervise an asynchronous operation
    ///
    /// Success passes through untouched. Failures are classified, recorded
    /// and dispatched per the category's configured strategy; retries
    /// re-invoke the operation with exponential backoff. The fallback
    /// strategy is limited to the authentication refresh-and-reinvoke path
    /// here; cached and caller-supplied fallback values need
    /// [`handle_error_with_fallback`](Self::handle_error_with_fallback).
    pub async fn handle_error<F, Fut, T>(&self, operation: F, options: HandleOptions) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ResilienceError::Disposed);
        }

        let client_id = options
            .client_id
            .clone()
            .unwrap_or_else(|| SYSTEM_CLIENT.to_string());
        let gate = self.gate_for(&options);
        let mut retried_category: Option<ErrorCategory> = None;

        loop {
            let error = match self.attempt(&operation, &gate).await {
                Ok(value) => {
                    if let Some(category) = retried_category.take() {
                        self.retries.remove(&client_id, category).await;
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let (record, dispatch) = self
                .dispatch_failure(&error, &client_id, &options.context, gate.as_deref())
                .await;
            match dispatch {
                FailureDispatch::Reraise => return Err(error),
                FailureDispatch::Fallback => {
                    return self
                        .auth_refresh_retry(&operation, &client_id, &record, error)
                        .await;
                }
                FailureDispatch::Retry(delay) => {
                    retried_category = Some(record.category);
                    self.backoff_wait(delay).await?;
                }
            }
        }
    }

    /// Supervise an operation with a caller-supplied fallback value
    ///
    /// The fallback value is served only when the failing category's
    /// strategy is `Fallback` and no better alternate path succeeds.
    /// Successes under a fallback-strategy `expected_category` are cached
    /// so later failures can serve the last known good value.
    pub async fn handle_error_with_fallback<F, Fut, T>(
        &self,
        operation: F,
        options: HandleOptions,
        mut fallback: Option<T>,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
        T: Serialize + DeserializeOwned,
    {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ResilienceError::Disposed);
        }

        let client_id = options
            .client_id
            .clone()
            .unwrap_or_else(|| SYSTEM_CLIENT.to_string());
        let gate = self.gate_for(&options);
        let mut retried_category: Option<ErrorCategory> = None;

        loop {
            let error = match self.attempt(&operation, &gate).await {
                Ok(value) => {
                    if let Some(category) = retried_category.take() {
                        self.retries.remove(&client_id, category).await;
                    }
                    if let Some(category) = options.expected_category {
                        self.cache_success(&client_id, category, &value).await;
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let (record, dispatch) = self
                .dispatch_failure(&error, &client_id, &options.context, gate.as_deref())
                .await;
            match dispatch {
                FailureDispatch::Reraise => return Err(error),
                FailureDispatch::Fallback => {
                    return self
                        .resolve_fallback(&operation, &client_id, &record, fallback.take(), error)
                        .await;
                }
                FailureDispatch::Retry(delay) => {
                    retried_category = Some(record.category);
                    self.backoff_wait(delay).await?;
                }
            }
        }
    }

    /// Breaker consulted ahead of execution, when the caller's expected
    /// category is gated by one
    fn gate_for(&self, options: &HandleOptions) -> Option<Arc<CircuitBreaker>> {
        options
            .expected_category
            .filter(|c| {
                self.config.enable_circuit_breaker
                    && self.config.strategy_for(*c) == ErrorStrategy::CircuitBreaker
            })
            .and_then(|c| self.breakers.get(c))
    }

    /// One invocation through the gate; successes reset the gating breaker
    async fn attempt<F, Fut, T>(
        &self,
        operation: &F,
        gate: &Option<Arc<CircuitBreaker>>,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match gate {
            Some(breaker) => {
                breaker.check().await?;
                let result = operation().await;
                if result.is_ok() {
                    breaker.record_success().await;
                }
                result
            }
            None => operation().await,
        }
    }

    /// Classify, record, publish and dispatch one failure
    ///
    /// Breaker outcomes flow only through the breaker that gated this
    /// call: `failure_count` is a consecutive counter and ungated calls
    /// never report successes, so they must not report failures either.
    /// A circuit-open rejection never advances the count.
    async fn dispatch_failure(
        &self,
        error: &ResilienceError,
        client_id: &str,
        context: &HashMap<String, serde_json::Value>,
        gate: Option<&CircuitBreaker>,
    ) -> (ErrorRecord, FailureDispatch) {
        let record = ErrorClassifier::classify(error, Some(client_id), context);

        if let Some(breaker) = gate {
            if !error.is_circuit_open() {
                breaker.record_failure().await;
            }
        }

        self.ledger.record(&record).await;
        self.publish(record.clone()).await;

        let dispatch = match self.config.strategy_for(record.category) {
            ErrorStrategy::Ignore => {
                debug!(
                    client_id = %record.client_id,
                    category = %record.category,
                    "ignoring error (no retry or escalation): {}",
                    record.message
                );
                FailureDispatch::Reraise
            }
            ErrorStrategy::Log => {
                self.log_record(&record);
                FailureDispatch::Reraise
            }
            ErrorStrategy::CircuitBreaker => {
                // Gated calls already recorded the outcome through their
                // breaker; nothing further to do but surface the failure.
                FailureDispatch::Reraise
            }
            ErrorStrategy::Escalate => {
                if let Err(notify_error) = self.escalation.notify(&record).await {
                    warn!(%notify_error, "escalation notifier failed");
                }
                FailureDispatch::Reraise
            }
            ErrorStrategy::AutoRecover => {
                self.recovery
                    .run_recovery(client_id, &record.recovery_actions)
                    .await;
                FailureDispatch::Reraise
            }
            ErrorStrategy::Fallback => FailureDispatch::Fallback,
            ErrorStrategy::Retry => {
                let attempts = self.retries.attempts(client_id, record.category).await;
                let max_retries = self.config.max_retries_for(record.category);
                if attempts >= max_retries {
                    self.retries.remove(client_id, record.category).await;
                    warn!(
                        client_id = %record.client_id,
                        category = %record.category,
                        attempts,
                        "retries exhausted"
                    );
                    FailureDispatch::Reraise
                } else {
                    self.retries.increment(client_id, record.category).await;
                    let delay =
                        backoff_delay(self.config.retry_delay_for(record.category), attempts);
                    debug!(
                        client_id = %record.client_id,
                        category = %record.category,
                        attempt = attempts + 1,
                        delay_ms = delay.num_milliseconds(),
                        "retrying after backoff"
                    );
                    FailureDispatch::Retry(delay)
                }
            }
        };
        (record, dispatch)
    }

    /// Backoff sleep that disposal can abort
    async fn backoff_wait(&self, delay: Duration) -> Result<()> {
        let sleep_for = delay.to_std().unwrap_or_default();
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ResilienceError::Disposed),
            _ = tokio::time::sleep(sleep_for) => Ok(()),
        }
    }

    /// Authentication fallback: force a token refresh, then re-invoke once
    async fn auth_refresh_retry<F, Fut, T>(
        &self,
        operation: &F,
        client_id: &str,
        record: &ErrorRecord,
        original: ResilienceError,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if record.category == ErrorCategory::Authentication {
            info!(client_id, "forcing token refresh before re-invoking");
            match self
                .recovery
                .execute_action(RecoveryAction::RefreshAuthToken, client_id)
                .await
            {
                Ok(()) => {
                    if let Ok(value) = operation().await {
                        return Ok(value);
                    }
                }
                Err(refresh_error) => {
                    warn!(client_id, %refresh_error, "token refresh failed");
                }
            }
        }
        Err(original)
    }

    /// Category-specific alternate paths, tried in order
    async fn resolve_fallback<F, Fut, T>(
        &self,
        operation: &F,
        client_id: &str,
        record: &ErrorRecord,
        fallback: Option<T>,
        original: ResilienceError,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
        T: DeserializeOwned,
    {
        let original = match self
            .auth_refresh_retry(operation, client_id, record, original)
            .await
        {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if let Some(value) = self.cached_value(client_id, record.category).await {
            info!(client_id, category = %record.category, "serving cached fallback value");
            return Ok(value);
        }

        if let Some(value) = fallback {
            info!(client_id, category = %record.category, "serving caller-supplied fallback");
            return Ok(value);
        }

        Err(original)
    }

    fn log_record(&self, record: &ErrorRecord) {
        match record.severity {
            ErrorSeverity::Low => info!(
                client_id = %record.client_id,
                code = %record.code,
                "{}",
                record.message
            ),
            ErrorSeverity::Medium => warn!(
                client_id = %record.client_id,
                code = %record.code,
                "{}",
                record.message
            ),
            ErrorSeverity::High | ErrorSeverity::Critical => error!(
                client_id = %record.client_id,
                code = %record.code,
                "{}",
                record.message
            ),
        }
    }

    /// Cache a successful value, only for categories a later failure
    /// could actually serve it from
    async fn cache_success<T: Serialize>(
        &self,
        client_id: &str,
        category: ErrorCategory,
        value: &T,
    ) {
        if self.config.strategy_for(category) != ErrorStrategy::Fallback {
            return;
        }
        let json = match serde_json::to_value(value) {
            Ok(json) => json,
            Err(serialize_error) => {
                warn!(%serialize_error, "failed to serialize value for fallback cache");
                return;
            }
        };
        self.fallback_cache.write().await.insert(
            (client_id.to_string(), category),
            CachedValue {
                value: json,
                expires_at: Utc::now() + self.config.fallback_cache_ttl,
            },
        );
    }

    async fn cached_value<T: DeserializeOwned>(
        &self,
        client_id: &str,
        category: ErrorCategory,
    ) -> Option<T> {
        let cache = self.fallback_cache.read().await;
        let cached = cache.get(&(client_id.to_string(), category))?;
        if cached.expires_at <= Utc::now() {
            return None;
        }
        serde_json::from_value(cached.value.clone()).ok()
    }

    async fn publish(&self, record: ErrorRecord) {
        if let Some(tx) = self.events_tx.read().await.as_ref() {
            // Send fails only when no subscriber is listening.
            let _ = tx.send(record);
        }
    }

    /// Subscribe to the error event stream
    ///
    /// One event per classified failure, published before its strategy
    /// dispatch runs, regardless of the eventual outcome. After disposal
    /// the returned receiver is already closed.
    pub async fn subscribe_errors(&self) -> broadcast::Receiver<ErrorRecord> {
        if let Some(tx) = self.events_tx.read().await.as_ref() {
            return tx.subscribe();
        }
        let (tx, rx) = broadcast::channel(1);
        drop(tx);
        rx
    }

    /// Aggregate error state snapshot
    pub async fn error_statistics(&self) -> ErrorStatistics {
        ErrorStatistics {
            total_errors: self.ledger.total_errors().await,
            errors_by_category: self.ledger.errors_by_category().await,
            errors_by_client: self.ledger.errors_by_client().await,
            circuit_breakers: self.breakers.snapshots().await,
            clients_in_recovery: self.recovery.in_recovery_count().await,
            active_retry_counters: self.retries.active_count().await,
        }
    }

    /// One client's error history, oldest first
    pub async fn error_history(&self, client_id: &str) -> Vec<ErrorRecord> {
        self.ledger.history(client_id).await
    }

    /// Every client's error history
    pub async fn all_error_history(&self) -> HashMap<String, Vec<ErrorRecord>> {
        self.ledger.all_history().await
    }

    /// Clear one client's history, or all history
    ///
    /// Aggregate counters and circuit breaker state are untouched.
    pub async fn clear_error_history(&self, client_id: Option<&str>) {
        self.ledger.clear_history(client_id).await;
    }

    /// Trigger recovery for a client immediately
    ///
    /// Uses the client's most recent record's action list; returns whether
    /// recovery actually started.
    pub async fn trigger_recovery(&self, client_id: &str) -> bool {
        if self.disposed.load(Ordering::SeqCst) {
            return false;
        }
        let actions = self
            .ledger
            .latest_record(client_id)
            .await
            .map(|record| record.recovery_actions)
            .unwrap_or_else(|| RecoveryAction::for_category(ErrorCategory::Unknown));
        self.recovery.run_recovery(client_id, &actions).await
    }

    /// Force every circuit breaker back to closed
    pub async fn reset_breakers(&self) {
        self.breakers.reset_all().await;
    }

    /// Tear the handler down
    ///
    /// Cancels the recovery sweep and any pending backoff waits, closes
    /// the event stream and clears all in-memory state, the error ledger
    /// included. Safe to call more than once; further operations fail
    /// fast with `Disposed`.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.events_tx.write().await.take();
        self.retries.clear().await;
        self.recovery.clear().await;
        self.ledger.clear_all().await;
        self.fallback_cache.write().await.clear();
        info!("error handler disposed");
    }
}

impl Drop for ErrorHandler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_recovery_sweep(
    config: &ErrorHandlingConfig,
    ledger: Arc<ErrorLedger>,
    retries: Arc<RetryTracker>,
    recovery: Arc<RecoveryCoordinator>,
    fallback_cache: FallbackCache,
    cancel: CancellationToken,
) {
    let interval = config
        .auto_recovery_interval
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(60))
        .max(std::time::Duration::from_millis(10));
    let threshold = config.auto_recovery_error_threshold;
    let counter_ttl = config.retry_counter_ttl;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so the sweep runs
        // on the configured cadence.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    retries.expire_older_than(counter_ttl).await;

                    let now = Utc::now();
                    fallback_cache
                        .write()
                        .await
                        .retain(|_, cached| cached.expires_at > now);

                    for client in ledger.clients_exceeding(threshold).await {
                        if recovery.is_in_recovery(&client).await {
                            continue;
                        }
                        let actions = ledger
                            .latest_record(&client)
                            .await
                            .map(|record| record.recovery_actions)
                            .unwrap_or_else(|| {
                                RecoveryAction::for_category(ErrorCategory::Unknown)
                            });
                        info!(client_id = %client, "auto-recovery sweep triggering recovery");
                        recovery.run_recovery(&client, &actions).await;
                    }
                }
            }
        }
        debug!("auto-recovery sweep stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn quiet_config() -> ErrorHandlingConfig {
        ErrorHandlingConfig {
            enable_auto_recovery: false,
            ..ErrorHandlingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let handler = ErrorHandler::new(quiet_config());
        let result: Result<i32> = handler
            .handle_error(|| async { Ok(42) }, HandleOptions::for_client("c1"))
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(handler.error_statistics().await.total_errors, 0);
    }

    #[tokio::test]
    async fn test_supervises_non_serializable_results() {
        struct Opaque;

        let handler = ErrorHandler::new(quiet_config());
        let result = handler
            .handle_error(|| async { Ok(Opaque) }, HandleOptions::for_client("c1"))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_log_strategy_reraises() {
        let handler = ErrorHandler::new(quiet_config());
        let result: Result<i32> = handler
            .handle_error(
                || async { Err(ResilienceError::validation("invalid request payload")) },
                HandleOptions::for_client("c1"),
            )
            .await;
        assert!(matches!(
            result.unwrap_err(),
            ResilienceError::Validation(_)
        ));

        let stats = handler.error_statistics().await;
        assert_eq!(stats.total_errors, 1);
        assert_eq!(
            stats.errors_by_category[&ErrorCategory::Validation],
            1
        );
    }

    #[tokio::test]
    async fn test_escalate_notifies_and_reraises() {
        struct CountingNotifier(AtomicU32);

        #[async_trait]
        impl EscalationNotifier for CountingNotifier {
            async fn notify(&self, _record: &ErrorRecord) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let notifier = Arc::new(CountingNotifier(AtomicU32::new(0)));
        let handler = ErrorHandler::builder(quiet_config())
            .escalation_notifier(notifier.clone())
            .build();

        let result: Result<i32> = handler
            .handle_error(
                || async { Err(ResilienceError::internal("mystery failure")) },
                HandleOptions::for_client("c1"),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_value_served() {
        let config = quiet_config()
            .with_strategy(ErrorCategory::Network, ErrorStrategy::Fallback);
        let handler = ErrorHandler::new(config);

        let result = handler
            .handle_error_with_fallback(
                || async { Err::<String, _>(ResilienceError::network("connection refused")) },
                HandleOptions::for_client("c1"),
                Some("cached answer".to_string()),
            )
            .await;
        assert_eq!(result.unwrap(), "cached answer");
    }

    #[tokio::test]
    async fn test_fallback_without_alternative_reraises() {
        let config = quiet_config()
            .with_strategy(ErrorCategory::Network, ErrorStrategy::Fallback);
        let handler = ErrorHandler::new(config);

        let result: Result<String> = handler
            .handle_error(
                || async { Err(ResilienceError::network("connection refused")) },
                HandleOptions::for_client("c1"),
            )
            .await;
        assert!(matches!(result.unwrap_err(), ResilienceError::Network(_)));
    }

    #[tokio::test]
    async fn test_cache_populated_only_for_fallback_categories() {
        let config = quiet_config()
            .with_strategy(ErrorCategory::Batch, ErrorStrategy::Fallback);
        let handler = ErrorHandler::new(config);

        // Network's strategy is circuit-breaker, so its successes are not
        // cacheable: no later failure could serve them.
        let result: Result<i32> = handler
            .handle_error_with_fallback(
                || async { Ok(1) },
                HandleOptions::for_client("c1").expecting(ErrorCategory::Network),
                None,
            )
            .await;
        assert!(result.is_ok());
        assert!(handler.fallback_cache.read().await.is_empty());

        let result: Result<i32> = handler
            .handle_error_with_fallback(
                || async { Ok(2) },
                HandleOptions::for_client("c1").expecting(ErrorCategory::Batch),
                None,
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(handler.fallback_cache.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_prunes_expired_cache_entries() {
        let config = ErrorHandlingConfig {
            enable_auto_recovery: true,
            auto_recovery_interval: Duration::milliseconds(30),
            fallback_cache_ttl: Duration::milliseconds(20),
            ..ErrorHandlingConfig::default()
        }
        .with_strategy(ErrorCategory::Batch, ErrorStrategy::Fallback);
        let handler = ErrorHandler::new(config);

        let result: Result<i32> = handler
            .handle_error_with_fallback(
                || async { Ok(5) },
                HandleOptions::for_client("c1").expecting(ErrorCategory::Batch),
                None,
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(handler.fallback_cache.read().await.len(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        assert!(handler.fallback_cache.read().await.is_empty());

        handler.dispose().await;
    }

    #[tokio::test]
    async fn test_dispose_rejects_new_operations() {
        let handler = ErrorHandler::new(quiet_config());

        let result: Result<i32> = handler
            .handle_error(
                || async { Err(ResilienceError::validation("invalid payload")) },
                HandleOptions::for_client("c1"),
            )
            .await;
        assert!(result.is_err());

        handler.dispose().await;
        handler.dispose().await; // idempotent

        let result: Result<i32> = handler
            .handle_error(|| async { Ok(1) }, HandleOptions::new())
            .await;
        assert!(matches!(result.unwrap_err(), ResilienceError::Disposed));

        // Disposal tears down the ledger with everything else.
        assert!(handler.all_error_history().await.is_empty());
        let stats = handler.error_statistics().await;
        assert_eq!(stats.total_errors, 0);
        assert!(stats.errors_by_client.is_empty());

        // Event stream is closed for new subscribers.
        let mut rx = handler.subscribe_errors().await;
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
