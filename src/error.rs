//! Error types for the resilience core
//!
//! This module provides the crate-wide error enum with helper
//! constructors. Category-level decisions (what retries, what gates) live
//! in the classifier and configuration, not here.

use crate::resilience::classifier::ErrorRecord;
use thiserror::Error;

/// Result type alias for resilience operations
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Failure types surfaced by supervised operations
#[derive(Error, Debug)]
pub enum ResilienceError {
    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Permission errors
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Network errors
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout errors
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Batch / JSON-RPC errors
    #[error("Batch operation error: {0}")]
    Batch(String),

    /// Rejection raised when a circuit breaker gate is open
    #[error("Circuit breaker '{breaker}' is open")]
    CircuitOpen { breaker: String },

    /// Operation attempted after the handler was disposed
    #[error("Error handler has been disposed")]
    Disposed,

    /// A failure that has already been through classification
    #[error("{}", .0.message)]
    Classified(Box<ErrorRecord>),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ResilienceError {
    /// Create an authentication error
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a permission error
    pub fn permission<S: Into<String>>(msg: S) -> Self {
        Self::Permission(msg.into())
    }

    /// Create a network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a batch error
    pub fn batch<S: Into<String>>(msg: S) -> Self {
        Self::Batch(msg.into())
    }

    /// Create a circuit-open rejection for the named breaker
    pub fn circuit_open<S: Into<String>>(breaker: S) -> Self {
        Self::CircuitOpen {
            breaker: breaker.into(),
        }
    }

    /// Create an internal error from a plain message
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    /// Check if this is a circuit breaker rejection
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_constructors() {
        let err = ResilienceError::authentication("token expired");
        assert_eq!(err.to_string(), "Authentication failed: token expired");
        assert!(!err.is_circuit_open());

        let err = ResilienceError::network("connection refused");
        assert_eq!(err.to_string(), "Network error: connection refused");
    }

    #[test]
    fn test_circuit_open_carries_breaker_name() {
        let err = ResilienceError::circuit_open("network");
        assert!(err.is_circuit_open());
        assert_eq!(err.to_string(), "Circuit breaker 'network' is open");
    }
}
