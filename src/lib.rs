//! Resilience and fault-handling core for LLM provider calls, tool
//! invocations and MCP client requests
//!
//! This crate supervises caller-supplied asynchronous operations: it
//! classifies failures into structured records, reacts per a configurable
//! per-category strategy (retry with exponential backoff, circuit
//! breaking, fallback, escalation, auto-recovery), keeps bounded
//! per-client error history with aggregate statistics, and publishes
//! every classified failure to a broadcast event stream.
//!
//! # Example
//!
//! ```no_run
//! use llm_resilience::{ErrorHandler, ErrorHandlingConfig, HandleOptions};
//!
//! # async fn example() -> llm_resilience::Result<()> {
//! let handler = ErrorHandler::new(ErrorHandlingConfig::default());
//!
//! let response: String = handler
//!     .handle_error(
//!         || async { Ok("completion".to_string()) },
//!         HandleOptions::for_client("llm-client-1"),
//!     )
//!     .await?;
//!
//! let stats = handler.error_statistics().await;
//! println!("total errors: {}", stats.total_errors);
//! handler.dispose().await;
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod logging;
pub mod resilience;

// Re-export main types for convenience
pub use config::{ErrorHandlingConfig, ErrorStrategy};
pub use error::{ResilienceError, Result};
pub use resilience::{
    BreakerSnapshot, BreakerState, CircuitBreaker, ErrorCategory, ErrorClassifier, ErrorHandler,
    ErrorRecord, ErrorSeverity, ErrorStatistics, EscalationNotifier, HandleOptions,
    RecoveryAction, RecoveryExecutor,
};
