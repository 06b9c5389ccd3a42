use thiserror::Error;

/// Storage failures for the scan ledger.
///
/// Every variant is recoverable at the scan level (the engine answers
/// scanner-error for the in-flight scan) but is logged as a warning that
/// needs operator attention. The ledger never retries silently: a retried
/// insert could double-count a cartridge.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Bad database path or options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Stored state value could not be parsed
    #[error("Corrupt state value for {key}: {value}")]
    CorruptState { key: String, value: String },
}

impl From<StorageError> for sortjig_core::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Configuration(msg) => sortjig_core::Error::Configuration(msg),
            other => sortjig_core::Error::Storage(other.to_string()),
        }
    }
}

/// Specialized result type for ledger operations
pub type StorageResult<T> = Result<T, StorageError>;
