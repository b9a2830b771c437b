//! Error types for store operations.
//!
//! These cover failures at the platform boundary: the store itself, the
//! network path to it, and malformed inputs. Entitlement-level failures
//! (unknown product, duplicate purchase, failed verification) live with the
//! consumer that owns those rules.

use thiserror::Error;

/// Error type for store boundary operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store accepted the request but could not complete it.
    #[error("store error: {0}")]
    Store(String),

    /// Network-level failure reaching the store.
    #[error("network error: {0}")]
    Network(String),

    /// Resource not found (product, transaction, etc.).
    #[error("{resource_type} not found: {identifier}")]
    NotFound {
        /// Type of resource (e.g. "product", "transaction")
        resource_type: String,
        /// Resource identifier
        identifier: String,
    },

    /// Invalid data provided.
    #[error("invalid {field}: {reason}")]
    InvalidData {
        /// Field or parameter name
        field: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Operation not supported by this store adapter.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Internal/unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Create a store error from any error type.
    pub fn store<E: std::error::Error>(err: E) -> Self {
        Self::Store(err.to_string())
    }

    /// Create a network error from any error type.
    pub fn network<E: std::error::Error>(err: E) -> Self {
        Self::Network(err.to_string())
    }

    /// Create a not found error.
    pub fn not_found(resource_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error is potentially recoverable by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::Network("connection refused".to_string());
        assert!(err.to_string().contains("network error"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_helper_constructors() {
        let err = StoreError::not_found("product", "pro.monthly");
        assert_eq!(err.to_string(), "product not found: pro.monthly");

        let err = StoreError::invalid_data("product_ids", "must not be empty");
        assert_eq!(err.to_string(), "invalid product_ids: must not be empty");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Network("timeout".into()).is_retryable());
        assert!(StoreError::Store("busy".into()).is_retryable());
        assert!(!StoreError::not_found("product", "x").is_retryable());
        assert!(!StoreError::Unsupported("sync".into()).is_retryable());
    }
}
