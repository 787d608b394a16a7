//! Resilience and fault-handling core
//!
//! Classification of failures from remote operations, per-category
//! reaction strategies (retry, circuit-break, fallback, escalate,
//! auto-recover), bounded error history with aggregate statistics, and a
//! live error event stream.

pub mod circuit_breaker;
pub mod classifier;
pub mod handler;
pub mod ledger;
pub mod recovery;
pub mod retry;

// Re-export commonly used types
pub use circuit_breaker::{BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use classifier::{ErrorCategory, ErrorClassifier, ErrorRecord, ErrorSeverity, SYSTEM_CLIENT};
pub use handler::{
    ErrorHandler, ErrorHandlerBuilder, ErrorStatistics, EscalationNotifier, HandleOptions,
    LoggingEscalationNotifier,
};
pub use ledger::ErrorLedger;
pub use recovery::{
    LoggingRecoveryExecutor, RecoveryAction, RecoveryCoordinator, RecoveryExecutor,
};
pub use retry::{backoff_delay, RetryTracker};
