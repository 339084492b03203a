//! Error types for cachet operations

use thiserror::Error;

/// Key-value store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Command {command} failed for key {key}: {reason}")]
    CommandFailed {
        command: String,
        key: String,
        reason: String,
    },

    #[error("Wrong value type at key {key}: expected {expected}")]
    WrongType { key: String, expected: String },

    #[error("Value at key {key} is not an integer")]
    NotAnInteger { key: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Encoding and decoding errors for cached values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to encode value for {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("Failed to decode value at {key}: {reason}")]
    Decode { key: String, reason: String },
}

/// Data-store query failures reported by a query executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Query execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("Query row could not be mapped: {reason}")]
    RowMapping { reason: String },
}

/// Failures reported by a batch lookup or count collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Lookup of {count} ids failed: {reason}")]
    BatchFailed { count: usize, reason: String },

    #[error("Count lookup for id {id} failed: {reason}")]
    CountFailed { id: i64, reason: String },

    #[error("Append step failed: {reason}")]
    AppendFailed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all cachet errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CachetError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CachetError {
    /// Whether the failure came from the key-value store rather than a
    /// collaborator. Callers use this to decide whether to fall back to the
    /// source of truth.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, CachetError::Store(_))
    }
}

/// Result type alias for cachet operations.
pub type CachetResult<T> = Result<T, CachetError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_command_failed() {
        let err = StoreError::CommandFailed {
            command: "MGET".to_string(),
            key: "user:1".to_string(),
            reason: "connection reset".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("MGET"));
        assert!(msg.contains("user:1"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_codec_error_display_decode() {
        let err = CodecError::Decode {
            key: "user:7".to_string(),
            reason: "expected value".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("decode"));
        assert!(msg.contains("user:7"));
    }

    #[test]
    fn test_lookup_error_display_batch_failed() {
        let err = LookupError::BatchFailed {
            count: 200,
            reason: "timeout".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("200"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "entity.root_key".to_string(),
            value: "a:b".to_string(),
            reason: "must not contain ':'".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("entity.root_key"));
        assert!(msg.contains("a:b"));
        assert!(msg.contains("must not contain"));
    }

    #[test]
    fn test_cachet_error_from_variants() {
        let store = CachetError::from(StoreError::LockPoisoned);
        assert!(matches!(store, CachetError::Store(_)));
        assert!(store.is_store_failure());

        let codec = CachetError::from(CodecError::Encode {
            key: "k".to_string(),
            reason: "bad".to_string(),
        });
        assert!(matches!(codec, CachetError::Codec(_)));
        assert!(!codec.is_store_failure());

        let query = CachetError::from(QueryError::ExecutionFailed {
            reason: "syntax".to_string(),
        });
        assert!(matches!(query, CachetError::Query(_)));

        let lookup = CachetError::from(LookupError::AppendFailed {
            reason: "join".to_string(),
        });
        assert!(matches!(lookup, CachetError::Lookup(_)));

        let config = CachetError::from(ConfigError::MissingRequired {
            field: "query.namespace".to_string(),
        });
        assert!(matches!(config, CachetError::Config(_)));
    }

    #[test]
    fn test_store_error_display_lock_poisoned() {
        let msg = format!("{}", StoreError::LockPoisoned);
        assert!(msg.contains("lock poisoned"));
    }
}
