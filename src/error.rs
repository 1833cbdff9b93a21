//! Error types for stock_reconcile

use thiserror::Error;

/// Unified error type for reconciliation and sync operations
///
/// Per-row parse problems never show up here: skipped sheet rows are only
/// counted on the load result. Per-record apply failures are collected into
/// the apply report and only become a `RecordApply` value inside it.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP error status code
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),
    /// Failed to parse or serialize JSON
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// One side of the reconciliation (store or sheet) could not be read
    #[error("Failed to load {source_name}: {message}")]
    LoadFailure {
        source_name: &'static str,
        message: String,
    },
    /// Required configuration is absent (code column, exchange rate)
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),
    /// A single record could not be written to the store
    #[error("Failed to apply record {code}: {message}")]
    RecordApply { code: String, message: String },
    /// Operation is not allowed in the current orchestrator state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl SyncError {
    /// Wraps any error raised while reading one of the two sources
    pub fn load_failure(source_name: &'static str, err: impl std::fmt::Display) -> Self {
        SyncError::LoadFailure {
            source_name,
            message: err.to_string(),
        }
    }
}

/// Result alias for stock_reconcile operations
pub type Result<T> = std::result::Result<T, SyncError>;
