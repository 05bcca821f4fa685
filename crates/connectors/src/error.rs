use thiserror::Error;

/// Errors happening while establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// MySQL pool or handshake failure.
    #[error("MySQL connection failed: {0}")]
    MySql(#[from] mysql_async::Error),

    /// Postgres handshake failure.
    #[error("Postgres connection failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// TLS setup for the Postgres connection failed.
    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] native_tls::Error),

    /// The connection string could not be parsed.
    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    /// The URL scheme does not name a supported driver.
    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    /// The data source refused or could not be reached.
    #[error("Data source unreachable: {0}")]
    Unreachable(String),
}

/// All errors coming from statement execution.
#[derive(Debug, Error)]
pub enum DbError {
    /// Low-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// The backend rejected the statement; the message is the backend's own.
    #[error("Query failed: {0}")]
    Query(String),

    /// A column value could not be converted into a [`model::core::value::Value`].
    #[error("Failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },

    /// COMMIT or ROLLBACK without a preceding BEGIN, or a nested BEGIN.
    #[error("Transaction state error: {0}")]
    TransactionState(String),

    /// The row stream's producer went away before finishing.
    #[error("Row stream closed unexpectedly")]
    StreamClosed,
}
