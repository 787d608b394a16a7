//! Recovery actions and the in-recovery coordinator
//!
//! Recovery actions are a closed set of tags mapped to an injected
//! executor, so deployments wire real remediation callbacks while the
//! default build just logs. A client entering recovery is marked for a
//! cooldown window; repeated triggers within the window are ignored.

use crate::error::Result;
use crate::resilience::classifier::ErrorCategory;
use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Suggested remediation for a classified error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    RefreshAuthToken,
    ReauthenticateClient,
    CheckPermissions,
    ContactAdministrator,
    CheckNetworkConnectivity,
    RestartTransport,
    IncreaseTimeout,
    RetryLater,
    ValidateRequestFormat,
    ReduceBatchSize,
    RetryIndividually,
    CollectDiagnostics,
    EscalateToOperator,
}

impl RecoveryAction {
    /// Human-readable description of the suggested remediation
    pub fn description(&self) -> &'static str {
        match self {
            RecoveryAction::RefreshAuthToken => "Refresh the authentication token",
            RecoveryAction::ReauthenticateClient => "Re-authenticate the client session",
            RecoveryAction::CheckPermissions => "Check the client's permission grants",
            RecoveryAction::ContactAdministrator => "Contact the administrator",
            RecoveryAction::CheckNetworkConnectivity => "Check network connectivity",
            RecoveryAction::RestartTransport => "Restart the client transport",
            RecoveryAction::IncreaseTimeout => "Increase the operation timeout",
            RecoveryAction::RetryLater => "Retry after the service recovers",
            RecoveryAction::ValidateRequestFormat => "Validate the request format",
            RecoveryAction::ReduceBatchSize => "Reduce the batch size",
            RecoveryAction::RetryIndividually => "Retry batch entries individually",
            RecoveryAction::CollectDiagnostics => "Collect diagnostics for investigation",
            RecoveryAction::EscalateToOperator => "Escalate to an operator",
        }
    }

    /// Fixed remediation list for a category
    pub fn for_category(category: ErrorCategory) -> Vec<RecoveryAction> {
        match category {
            ErrorCategory::Authentication => vec![
                RecoveryAction::RefreshAuthToken,
                RecoveryAction::ReauthenticateClient,
            ],
            ErrorCategory::Permission => vec![
                RecoveryAction::CheckPermissions,
                RecoveryAction::ContactAdministrator,
            ],
            ErrorCategory::Network => vec![
                RecoveryAction::CheckNetworkConnectivity,
                RecoveryAction::RestartTransport,
            ],
            ErrorCategory::Timeout => {
                vec![RecoveryAction::IncreaseTimeout, RecoveryAction::RetryLater]
            }
            ErrorCategory::Validation => vec![RecoveryAction::ValidateRequestFormat],
            ErrorCategory::Batch => vec![
                RecoveryAction::ReduceBatchSize,
                RecoveryAction::RetryIndividually,
            ],
            _ => vec![
                RecoveryAction::CollectDiagnostics,
                RecoveryAction::EscalateToOperator,
            ],
        }
    }
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Executes recovery actions against the deployment
#[async_trait]
pub trait RecoveryExecutor: Send + Sync {
    async fn execute(&self, action: RecoveryAction, client_id: &str) -> Result<()>;
}

/// Default executor: logs each action without side effects
pub struct LoggingRecoveryExecutor;

#[async_trait]
impl RecoveryExecutor for LoggingRecoveryExecutor {
    async fn execute(&self, action: RecoveryAction, client_id: &str) -> Result<()> {
        info!(client_id, action = %action, "recovery action");
        Ok(())
    }
}

/// Tracks which clients are in recovery and runs their action lists
pub struct RecoveryCoordinator {
    executor: Arc<dyn RecoveryExecutor>,
    in_recovery: Arc<RwLock<HashSet<String>>>,
    cooldown: Duration,
    cancel: CancellationToken,
}

impl RecoveryCoordinator {
    pub fn new(
        executor: Arc<dyn RecoveryExecutor>,
        cooldown: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor,
            in_recovery: Arc::new(RwLock::new(HashSet::new())),
            cooldown,
            cancel,
        }
    }

    /// Run the action list for a client unless it is already in recovery
    ///
    /// Each action runs best-effort: a failing action is logged and does
    /// not abort the rest of the list. Returns whether recovery actually
    /// started. The client leaves the in-recovery set after the cooldown.
    pub async fn run_recovery(&self, client_id: &str, actions: &[RecoveryAction]) -> bool {
        {
            let mut marked = self.in_recovery.write().await;
            if !marked.insert(client_id.to_string()) {
                debug!(client_id, "client already in recovery, skipping");
                return false;
            }
        }

        info!(client_id, actions = actions.len(), "starting recovery");
        for action in actions {
            if let Err(error) = self.executor.execute(*action, client_id).await {
                warn!(client_id, action = %action, %error, "recovery action failed");
            }
        }

        self.schedule_cooldown_removal(client_id.to_string());
        true
    }

    fn schedule_cooldown_removal(&self, client_id: String) {
        let in_recovery = self.in_recovery.clone();
        let cancel = self.cancel.clone();
        let cooldown = self
            .cooldown
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(60));

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(cooldown) => {
                    in_recovery.write().await.remove(&client_id);
                    debug!(client_id, "recovery cooldown elapsed");
                }
            }
        });
    }

    /// Run a single action through the injected executor
    ///
    /// Does not touch the in-recovery set; used for targeted remediation
    /// like a forced token refresh on the fallback path.
    pub async fn execute_action(&self, action: RecoveryAction, client_id: &str) -> Result<()> {
        self.executor.execute(action, client_id).await
    }

    /// Whether a client is currently marked as in recovery
    pub async fn is_in_recovery(&self, client_id: &str) -> bool {
        self.in_recovery.read().await.contains(client_id)
    }

    /// Number of clients currently in recovery
    pub async fn in_recovery_count(&self) -> usize {
        self.in_recovery.read().await.len()
    }

    /// Drop all in-recovery markers
    pub async fn clear(&self) {
        self.in_recovery.write().await.clear();
    }
}
