//! Storage error types

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity};

/// Error type for the disk tier
#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected input: empty key or value, oversized path, or an operation
    /// incompatible with the configured storage kind
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The manifest database could not be opened
    #[error("database open failed: {0}")]
    Open(String),

    /// The manifest database is closed and the reopen guard refused a new
    /// attempt
    #[error("database is closed")]
    Closed,

    /// Schema initialization failed on a previously working database
    #[error("storage is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for the disk tier
pub type StoreResult<T> = Result<T, StoreError>;

impl ErrorClassification for StoreError {
    /// Check if this error is retryable
    ///
    /// Open failures and transient database locks may clear; the reopen
    /// guard throttles actual reattempts.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Open(_) | Self::Closed => true,
            Self::Sqlite(err) => matches!(
                err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy)
                    | Some(rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidArgument(_) => ErrorSeverity::Error,
            Self::Open(_) => ErrorSeverity::Error,
            Self::Closed => ErrorSeverity::Warning,
            Self::Corrupt(_) => ErrorSeverity::Critical,
            Self::Io(_) => ErrorSeverity::Error,
            Self::Sqlite(_) => ErrorSeverity::Error,
        }
    }
}
