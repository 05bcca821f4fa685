use connectors::error::{ConnectorError, DbError};
use thiserror::Error;

/// Errors surfaced by wrapped operations. Every wrapper in this crate hands
/// the inner operation's error back unchanged.
#[derive(Error, Debug)]
pub enum OperationError {
    /// Malformed input; raised before any I/O and never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectorError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Failure reported by the operation itself.
    #[error("Operation failed: {0}")]
    Failed(String),

    #[error("Unexpected error: {0}")]
    Unexpected(#[from] Box<dyn std::error::Error + Send + Sync>),
}
