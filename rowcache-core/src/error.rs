//! Error types for rowcache operations

use thiserror::Error;

/// Configuration errors.
///
/// Missing table or primary-key bindings fail fast on the first operation
/// that needs them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Table name is not configured")]
    TableNotConfigured,

    #[error("Primary key column is not configured")]
    PrimaryKeyNotConfigured,

    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },
}

/// Key-value cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// No cache instance and no usable cache configuration.
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    /// The cache client reported a failure.
    #[error("Cache backend error: {reason}")]
    Backend { reason: String },

    #[error("Cache entry serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Relational source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Query on {table} failed: {reason}")]
    QueryFailed { table: String, reason: String },

    #[error("Insert into {table} failed: {reason}")]
    InsertFailed { table: String, reason: String },

    #[error("Update of {table} failed: {reason}")]
    UpdateFailed { table: String, reason: String },

    #[error("Delete from {table} failed: {reason}")]
    DeleteFailed { table: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Source lock poisoned")]
    LockPoisoned,
}

/// Master error type for all rowcache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowcacheError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Result type alias for rowcache operations.
pub type RowcacheResult<T> = Result<T, RowcacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_table() {
        let err = RowcacheError::from(ConfigError::TableNotConfigured);
        let msg = format!("{}", err);
        assert!(msg.contains("Config error"));
        assert!(msg.contains("Table name"));
    }

    #[test]
    fn test_cache_error_display_unavailable() {
        let err = CacheError::Unavailable {
            reason: "no endpoints".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Cache unavailable"));
        assert!(msg.contains("no endpoints"));
    }

    #[test]
    fn test_source_error_display_update_failed() {
        let err = SourceError::UpdateFailed {
            table: "user".to_string(),
            reason: "deadlock".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("user"));
        assert!(msg.contains("deadlock"));
    }

    #[test]
    fn test_master_error_from_conversions() {
        let err: RowcacheError = SourceError::LockPoisoned.into();
        assert!(matches!(err, RowcacheError::Source(SourceError::LockPoisoned)));

        let err: RowcacheError = CacheError::Backend {
            reason: "io".to_string(),
        }
        .into();
        assert!(matches!(err, RowcacheError::Cache(CacheError::Backend { .. })));
    }
}
