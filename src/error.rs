//! # Error Types
//!
//! Error taxonomy for the dispatch core. Storage, capacity, payload, availability and
//! task failures are kept distinct so callers can decide whether to retry, reject or
//! surface a problem.

use thiserror::Error;

use crate::constants::QueueStatus;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The durable store could not be reached or rejected a statement
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Enqueue refused before persistence because the queue reached its ceiling
    #[error("Offline queue is full ({max_items} active items)")]
    QueueFull { max_items: i64 },

    /// A queued payload could not be serialized or deserialized
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Queue item {id} not found")]
    NotFound { id: i64 },

    /// The item exists but its current status does not permit the operation
    #[error("Queue item {id} is {status}, expected one of {expected}")]
    InvalidState {
        id: i64,
        status: QueueStatus,
        expected: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

impl DispatchError {
    /// Whether the error originated in the storage layer
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<crate::config::ConfigurationError> for DispatchError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let full = DispatchError::QueueFull { max_items: 100 };
        assert_eq!(full.to_string(), "Offline queue is full (100 active items)");

        let invalid = DispatchError::InvalidState {
            id: 7,
            status: QueueStatus::Completed,
            expected: "pending, failed".to_string(),
        };
        assert_eq!(
            invalid.to_string(),
            "Queue item 7 is completed, expected one of pending, failed"
        );
        assert!(!invalid.is_storage());
    }

    #[test]
    fn test_payload_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let dispatch_err: DispatchError = err.into();
        assert!(matches!(dispatch_err, DispatchError::Payload(_)));
    }
}
