use connectors::error::{ConnectorError, DbError};
use engine_core::error::OperationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// Rejected before any connection was opened.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectorError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Column '{column}' holds a non-numeric value: {value}")]
    NonNumeric { column: String, value: String },
}

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing column '{0}' in CSV header")]
    MissingColumn(String),

    #[error("Seeding failed: {0}")]
    Operation(#[from] OperationError),
}

impl From<StreamError> for OperationError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::InvalidArgument(message) => OperationError::InvalidArgument(message),
            StreamError::Connection(e) => OperationError::Connection(e),
            StreamError::Database(e) => OperationError::Database(e),
            // Never retried.
            non_numeric @ StreamError::NonNumeric { .. } => {
                OperationError::InvalidArgument(non_numeric.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{classify::ErrorClassifier, retry::RetryDisposition};

    #[test]
    fn test_stream_errors_keep_their_retry_disposition() {
        let classifier = ErrorClassifier::strict();
        let unreachable = StreamError::Connection(ConnectorError::Unreachable("refused".into()));
        let bad_size = StreamError::InvalidArgument("batch_size must be greater than zero".into());
        let non_numeric = StreamError::NonNumeric {
            column: "age".to_string(),
            value: "old".to_string(),
        };

        assert_eq!(
            classifier.classify(&unreachable.into()),
            RetryDisposition::Retry
        );
        assert_eq!(
            classifier.classify(&bad_size.into()),
            RetryDisposition::Stop
        );
        assert_eq!(
            ErrorClassifier::default().classify(&non_numeric.into()),
            RetryDisposition::Stop
        );
    }
}
