//! Error types for Folio cache operations

use thiserror::Error;

/// Backing-store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Read failed for key {key} in {collection}: {reason}")]
    ReadFailed {
        collection: String,
        key: String,
        reason: String,
    },

    #[error("Write failed for key {key} in {collection}: {reason}")]
    WriteFailed {
        collection: String,
        key: String,
        reason: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Work queue errors, surfaced only through the owning job handle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job failed before producing a result")]
    JobFailed,

    #[error("Queue is shut down, job was not accepted")]
    QueueClosed,
}

/// Master error type for all Folio cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FolioError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Not found: {key} in {collection}")]
    NotFound { collection: String, key: String },

    #[error("Concurrency violation on key {key}: {detail}")]
    ConcurrencyViolation { key: String, detail: String },
}

/// Result type alias for Folio cache operations.
pub type FolioResult<T> = Result<T, FolioError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_unavailable() {
        let err = StoreError::Unavailable {
            reason: "env open failed".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Store unavailable"));
        assert!(msg.contains("env open failed"));
    }

    #[test]
    fn test_store_error_display_serialization() {
        let err = StoreError::Serialization {
            key: "b1_v2".to_string(),
            reason: "invalid json".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Serialization failed"));
        assert!(msg.contains("b1_v2"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "max_concurrent_jobs".to_string(),
            value: "0".to_string(),
            reason: "must be greater than 0".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("max_concurrent_jobs"));
        assert!(msg.contains("0"));
        assert!(msg.contains("must be greater than 0"));
    }

    #[test]
    fn test_not_found_display() {
        let err = FolioError::NotFound {
            collection: "content_cache".to_string(),
            key: "b1_v1_c3".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Not found"));
        assert!(msg.contains("b1_v1_c3"));
        assert!(msg.contains("content_cache"));
    }

    #[test]
    fn test_folio_error_from_variants() {
        let store = FolioError::from(StoreError::TransactionFailed {
            reason: "mdb_txn_begin".to_string(),
        });
        assert!(matches!(store, FolioError::Store(_)));

        let config = FolioError::from(ConfigError::InvalidValue {
            field: "default_ttl".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        });
        assert!(matches!(config, FolioError::Config(_)));

        let queue = FolioError::from(QueueError::JobFailed);
        assert!(matches!(queue, FolioError::Queue(_)));
    }
}
