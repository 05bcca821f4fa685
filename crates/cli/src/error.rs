use connectors::error::ConnectorError;
use engine_core::error::OperationError;
use engine_processing::error::{SeedError, StreamError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to configure the data source: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Query failed: {0}")]
    Stream(#[from] StreamError),

    #[error("Seeding failed: {0}")]
    Seed(#[from] SeedError),

    #[error("{0}")]
    Operation(#[from] OperationError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}
