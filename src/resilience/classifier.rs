//! Error classification
//!
//! Maps raw failures into structured [`ErrorRecord`]s with a category,
//! severity, stable code and suggested recovery actions. Classification is
//! a pure keyword scan over the failure message and never fails: unmatched
//! messages land in [`ErrorCategory::Unknown`].

use crate::error::ResilienceError;
use crate::resilience::recovery::RecoveryAction;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Error categories
///
/// Closed but extensible taxonomy; new categories can be added without
/// breaking downstream matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCategory {
    Authentication,
    Permission,
    Network,
    Timeout,
    Validation,
    Batch,
    Unknown,
}

impl ErrorCategory {
    /// All known categories, in classification priority order
    pub const ALL: [ErrorCategory; 7] = [
        ErrorCategory::Authentication,
        ErrorCategory::Permission,
        ErrorCategory::Timeout,
        ErrorCategory::Network,
        ErrorCategory::Validation,
        ErrorCategory::Batch,
        ErrorCategory::Unknown,
    ];

    /// Stable machine-readable code for the category
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "AUTH_ERROR",
            ErrorCategory::Permission => "PERMISSION_ERROR",
            ErrorCategory::Network => "NETWORK_ERROR",
            ErrorCategory::Timeout => "TIMEOUT_ERROR",
            ErrorCategory::Validation => "VALIDATION_ERROR",
            ErrorCategory::Batch => "BATCH_ERROR",
            ErrorCategory::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Severity derived from the category
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ErrorCategory::Authentication | ErrorCategory::Permission => ErrorSeverity::High,
            ErrorCategory::Network | ErrorCategory::Timeout => ErrorSeverity::Medium,
            ErrorCategory::Validation => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Batch => "batch",
            ErrorCategory::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Structured result of classifying a failure
///
/// Immutable after creation: `id`, `category` and `severity` are set once
/// and never change. Records are shared by reference between the ledger
/// and the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Process-unique identifier
    pub id: String,
    /// Owning client, or `"system"` when no client context exists
    pub client_id: String,
    /// Resolved category
    pub category: ErrorCategory,
    /// Severity derived from the category
    pub severity: ErrorSeverity,
    /// Original failure message
    pub message: String,
    /// Stable category-derived code, e.g. `AUTH_ERROR`
    pub code: String,
    /// Optional additional detail
    pub details: Option<String>,
    /// Open context map merged with handler metadata
    pub context: HashMap<String, serde_json::Value>,
    /// When the failure was classified
    pub timestamp: DateTime<Utc>,
    /// Captured stack trace, when available
    pub stack_trace: Option<String>,
    /// Suggested remediations, fixed per category
    pub recovery_actions: Vec<RecoveryAction>,
}

/// Sentinel client id used when no client context exists
pub const SYSTEM_CLIENT: &str = "system";

/// Stateless failure classifier
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a failure into an [`ErrorRecord`]
    ///
    /// Already-classified failures are returned unchanged rather than
    /// reclassified.
    pub fn classify(
        error: &ResilienceError,
        client_id: Option<&str>,
        context: &HashMap<String, serde_json::Value>,
    ) -> ErrorRecord {
        if let ResilienceError::Classified(record) = error {
            return (**record).clone();
        }

        let message = error.to_string();
        let category = Self::resolve_category(error, &message);
        let timestamp = Utc::now();

        let mut merged_context = context.clone();
        merged_context.insert(
            "handler_version".to_string(),
            serde_json::Value::String(env!("CARGO_PKG_VERSION").to_string()),
        );
        merged_context.insert(
            "classified_at".to_string(),
            serde_json::Value::String(timestamp.to_rfc3339()),
        );

        ErrorRecord {
            id: Self::generate_id(timestamp),
            client_id: client_id.unwrap_or(SYSTEM_CLIENT).to_string(),
            category,
            severity: category.severity(),
            message,
            code: category.code().to_string(),
            details: None,
            context: merged_context,
            timestamp,
            stack_trace: None,
            recovery_actions: RecoveryAction::for_category(category),
        }
    }

    /// Resolve the category for a failure
    ///
    /// Typed variants map directly; everything else goes through the
    /// keyword scan on the message text.
    fn resolve_category(error: &ResilienceError, message: &str) -> ErrorCategory {
        match error {
            ResilienceError::Authentication(_) => ErrorCategory::Authentication,
            ResilienceError::Permission(_) => ErrorCategory::Permission,
            ResilienceError::Timeout(_) => ErrorCategory::Timeout,
            ResilienceError::Network(_) => ErrorCategory::Network,
            ResilienceError::Validation(_) => ErrorCategory::Validation,
            ResilienceError::Batch(_) => ErrorCategory::Batch,
            _ => Self::classify_message(message),
        }
    }

    /// Keyword scan over the message text, first match wins
    ///
    /// The scan order is significant: messages may contain several
    /// keywords (e.g. both "network" and "timeout") and the earlier
    /// keyword set decides the category.
    pub fn classify_message(message: &str) -> ErrorCategory {
        let text = message.to_lowercase();

        if text.contains("auth") || text.contains("token") || text.contains("oauth") {
            ErrorCategory::Authentication
        } else if text.contains("permission") || text.contains("forbidden") {
            ErrorCategory::Permission
        } else if text.contains("timeout") || text.contains("deadline") {
            ErrorCategory::Timeout
        } else if text.contains("network") || text.contains("connection") {
            ErrorCategory::Network
        } else if text.contains("validation") || text.contains("invalid") {
            ErrorCategory::Validation
        } else if text.contains("batch") || text.contains("jsonrpc") {
            ErrorCategory::Batch
        } else {
            ErrorCategory::Unknown
        }
    }

    /// Generate a process-unique record id
    ///
    /// Millisecond timestamp plus a random suffix; unique even for errors
    /// classified within the same millisecond at expected error volumes.
    fn generate_id(timestamp: DateTime<Utc>) -> String {
        let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
        format!("err_{}_{suffix:04}", timestamp.timestamp_millis())
    }
}
