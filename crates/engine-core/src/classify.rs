use crate::{error::OperationError, retry::RetryDisposition};
use connectors::error::{ConnectorError, DbError};
use mysql_async::Error as MySqlError;
use tokio_postgres::{Error as PgError, error::SqlState};

const TRANSIENT_PATTERNS: &[&str] = &[
    "locked",
    "busy",
    "timeout",
    "timed out",
    "deadlock",
    "connection reset",
    "connection refused",
    "connection failed",
    "network error",
    "temporary failure",
    "disk i/o error",
    "cannot start transaction",
    "too many connections",
];

const PERMANENT_PATTERNS: &[&str] = &[
    "syntax error",
    "sql syntax",
    "no such table",
    "no such column",
    "unique constraint",
    "duplicate key",
    "foreign key constraint",
    "not null constraint",
    "check constraint",
];

/// Decides whether a failed attempt is worth repeating.
///
/// Errors are judged by kind first (driver error codes, I/O failures,
/// invalid arguments), then by message pattern. Whatever matches neither
/// gets the `unknown` disposition.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    transient: Vec<String>,
    permanent: Vec<String>,
    unknown: RetryDisposition,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            transient: TRANSIENT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            permanent: PERMANENT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            unknown: RetryDisposition::Retry,
        }
    }
}

impl ErrorClassifier {
    /// Unrecognised errors are not retried.
    pub fn strict() -> Self {
        Self {
            unknown: RetryDisposition::Stop,
            ..Self::default()
        }
    }

    pub fn with_transient(mut self, pattern: &str) -> Self {
        self.transient.push(pattern.to_lowercase());
        self
    }

    pub fn with_permanent(mut self, pattern: &str) -> Self {
        self.permanent.push(pattern.to_lowercase());
        self
    }

    pub fn classify(&self, err: &OperationError) -> RetryDisposition {
        if let Some(disposition) = classify_kind(err) {
            return disposition;
        }
        self.classify_message(&err.to_string())
    }

    pub fn classify_message(&self, message: &str) -> RetryDisposition {
        let message = message.to_lowercase();
        if self.transient.iter().any(|p| message.contains(p.as_str())) {
            return RetryDisposition::Retry;
        }
        if self.permanent.iter().any(|p| message.contains(p.as_str())) {
            return RetryDisposition::Stop;
        }
        self.unknown
    }
}

fn classify_kind(err: &OperationError) -> Option<RetryDisposition> {
    match err {
        OperationError::InvalidArgument(_) => Some(RetryDisposition::Stop),
        OperationError::Connection(conn_err) => classify_connector_error(conn_err),
        OperationError::Database(db_err) => classify_db_error(db_err),
        OperationError::Failed(_) | OperationError::Unexpected(_) => None,
    }
}

fn classify_connector_error(err: &ConnectorError) -> Option<RetryDisposition> {
    match err {
        ConnectorError::MySql(mysql_err) => classify_mysql_error(mysql_err),
        ConnectorError::Postgres(pg_err) => classify_pg_error(pg_err),
        ConnectorError::TlsConfig(_) | ConnectorError::Unreachable(_) => {
            Some(RetryDisposition::Retry)
        }
        ConnectorError::InvalidUrl(_) | ConnectorError::UnsupportedDriver(_) => {
            Some(RetryDisposition::Stop)
        }
    }
}

fn classify_db_error(err: &DbError) -> Option<RetryDisposition> {
    match err {
        DbError::Io(_) | DbError::StreamClosed => Some(RetryDisposition::Retry),
        DbError::MySql(mysql_err) => classify_mysql_error(mysql_err),
        DbError::Postgres(pg_err) => classify_pg_error(pg_err),
        DbError::Decode { .. } | DbError::TransactionState(_) => Some(RetryDisposition::Stop),
        DbError::Query(_) => None,
    }
}

fn classify_pg_error(err: &PgError) -> Option<RetryDisposition> {
    if err.is_closed() {
        return Some(RetryDisposition::Retry);
    }

    let code = err.code()?;
    if is_retryable_pg_code(code) {
        return Some(RetryDisposition::Retry);
    }
    // Class 23 is integrity violations, class 42 syntax and missing objects.
    let class = code.code().get(..2).unwrap_or_default();
    if class == "23" || class == "42" {
        return Some(RetryDisposition::Stop);
    }
    None
}

fn is_retryable_pg_code(code: &SqlState) -> bool {
    matches!(
        *code,
        SqlState::T_R_SERIALIZATION_FAILURE
            | SqlState::T_R_DEADLOCK_DETECTED
            | SqlState::LOCK_NOT_AVAILABLE
            | SqlState::TOO_MANY_CONNECTIONS
            | SqlState::ADMIN_SHUTDOWN
            | SqlState::CRASH_SHUTDOWN
            | SqlState::CANNOT_CONNECT_NOW
            | SqlState::CONNECTION_FAILURE
            | SqlState::CONNECTION_DOES_NOT_EXIST
            | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
            | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
            | SqlState::CONNECTION_EXCEPTION
            | SqlState::QUERY_CANCELED
            | SqlState::OPERATOR_INTERVENTION
    )
}

fn classify_mysql_error(err: &MySqlError) -> Option<RetryDisposition> {
    match err {
        MySqlError::Io(_) | MySqlError::Driver(_) => Some(RetryDisposition::Retry),
        MySqlError::Server(server_err) => {
            classify_mysql_server_error(server_err.code, server_err.state.as_str())
        }
        MySqlError::Url(_) => Some(RetryDisposition::Stop),
        _ => None,
    }
}

fn classify_mysql_server_error(code: u16, state: &str) -> Option<RetryDisposition> {
    // Lock wait timeout, deadlock, lost/refused connections, too many connections.
    const RETRYABLE_CODES: [u16; 8] = [1205, 1213, 2002, 2003, 2006, 2013, 1040, 1042];
    // Parse error, missing table/column, duplicate key, FK and NOT NULL violations.
    const PERMANENT_CODES: [u16; 7] = [1064, 1146, 1054, 1062, 1451, 1452, 1048];

    if RETRYABLE_CODES.contains(&code) || matches!(state, "40001" | "HYT00" | "08S01") {
        return Some(RetryDisposition::Retry);
    }
    if PERMANENT_CODES.contains(&code) {
        return Some(RetryDisposition::Stop);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_error(message: &str) -> OperationError {
        OperationError::Database(DbError::Query(message.to_string()))
    }

    #[test]
    fn test_transient_messages_retry() {
        let classifier = ErrorClassifier::default();
        for message in [
            "database is locked",
            "Database is BUSY",
            "read timeout after 30s",
            "deadlock detected",
            "connection reset by peer",
        ] {
            assert_eq!(
                classifier.classify(&query_error(message)),
                RetryDisposition::Retry,
                "{message}"
            );
        }
    }

    #[test]
    fn test_permanent_messages_stop() {
        let classifier = ErrorClassifier::default();
        for message in [
            "syntax error at or near \"SELCT\"",
            "no such table: users",
            "no such column: agee",
            "UNIQUE constraint failed: users.email",
        ] {
            assert_eq!(
                classifier.classify(&query_error(message)),
                RetryDisposition::Stop,
                "{message}"
            );
        }
    }

    #[test]
    fn test_invalid_argument_never_retried() {
        let err = OperationError::InvalidArgument("timeout must be positive".to_string());
        assert_eq!(
            ErrorClassifier::default().classify(&err),
            RetryDisposition::Stop
        );
    }

    #[test]
    fn test_unknown_follows_configuration() {
        let err = OperationError::Failed("something odd".to_string());
        assert_eq!(
            ErrorClassifier::default().classify(&err),
            RetryDisposition::Retry
        );
        assert_eq!(
            ErrorClassifier::strict().classify(&err),
            RetryDisposition::Stop
        );
    }

    #[test]
    fn test_unreachable_source_is_transient() {
        let err = OperationError::Connection(ConnectorError::Unreachable("refused".to_string()));
        assert_eq!(
            ErrorClassifier::strict().classify(&err),
            RetryDisposition::Retry
        );
    }

    #[test]
    fn test_custom_patterns() {
        let classifier = ErrorClassifier::strict().with_transient("Try Again");
        assert_eq!(
            classifier.classify_message("server says: try again later"),
            RetryDisposition::Retry
        );
    }

    #[test]
    fn test_mysql_codes() {
        assert_eq!(
            classify_mysql_server_error(1213, "40001"),
            Some(RetryDisposition::Retry)
        );
        assert_eq!(
            classify_mysql_server_error(1064, "42000"),
            Some(RetryDisposition::Stop)
        );
        assert_eq!(classify_mysql_server_error(1234, "HY000"), None);
    }
}
