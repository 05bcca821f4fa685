use crate::{
    error::OperationError,
    operation::{DataOperation, Operation},
};
use async_trait::async_trait;
use connectors::connection::Connector;
use std::{sync::Arc, time::Instant};
use tracing::{debug, error, warn};

/// Scoped connection acquisition: each call opens a connection, hands it to
/// the inner operation and releases it afterwards, whatever the outcome.
pub struct WithConnection<Op> {
    connector: Arc<dyn Connector>,
    inner: Op,
}

impl<Op> WithConnection<Op> {
    pub fn new(connector: Arc<dyn Connector>, inner: Op) -> Self {
        Self { connector, inner }
    }
}

#[async_trait]
impl<Op: DataOperation> Operation for WithConnection<Op> {
    type Args = Op::Args;
    type Output = Op::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn call(&self, args: &Self::Args) -> Result<Self::Output, OperationError> {
        let operation = self.inner.name();
        let mut conn = match self.connector.connect().await {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    operation,
                    source = self.connector.name(),
                    error = %err,
                    "Failed to open connection"
                );
                return Err(err.into());
            }
        };

        let opened = Instant::now();
        debug!(operation, source = self.connector.name(), "Connection opened");

        let result = self.inner.run(conn.as_mut(), args).await;
        if let Err(err) = &result {
            error!(operation, error = %err, "Database operation failed");
        }

        // A failed close is logged; it never masks the operation's outcome.
        if let Err(err) = conn.close().await {
            warn!(operation, error = %err, "Failed to close connection");
        }
        debug!(
            operation,
            elapsed_ms = opened.elapsed().as_millis() as u64,
            "Connection closed"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{DataOperationExt, FnDataOperation};
    use connectors::{
        memory::MemoryDatabase,
        sql::base::requests::FetchRowsRequestBuilder,
    };
    use model::records::row::{Field, Row};

    fn db_with_users() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.insert_rows(
            "users",
            vec![
                Row::new("users", vec![Field::new("id", 1), Field::new("age", 28)]),
                Row::new("users", vec![Field::new("id", 2), Field::new("age", 35)]),
            ],
        );
        db
    }

    #[tokio::test]
    async fn test_releases_connection_on_success() {
        let db = db_with_users();
        let op = FnDataOperation::new("count_users", |conn, _: &()| {
            Box::pin(async move {
                let request = FetchRowsRequestBuilder::new("users").build();
                Ok::<_, OperationError>(conn.count(&request).await?)
            })
        })
        .with_connection(Arc::new(db.clone()));

        assert_eq!(op.call(&()).await.unwrap(), 2);
        let stats = db.stats();
        assert_eq!(stats.connections_opened, 1);
        assert_eq!(stats.connections_closed, 1);
    }

    #[tokio::test]
    async fn test_releases_connection_on_error() {
        let db = db_with_users();
        let op = FnDataOperation::new("broken", |_conn, _: &()| {
            Box::pin(async move { Err::<(), _>(OperationError::Failed("boom".to_string())) })
        })
        .with_connection(Arc::new(db.clone()));

        let err = op.call(&()).await.unwrap_err();
        assert!(matches!(err, OperationError::Failed(ref m) if m == "boom"));
        let stats = db.stats();
        assert_eq!(stats.connections_opened, 1);
        assert_eq!(stats.connections_closed, 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_returned() {
        let db = db_with_users();
        db.set_unreachable(true);
        let op = FnDataOperation::new("noop", |_conn, _: &()| {
            Box::pin(async move { Ok::<_, OperationError>(()) })
        })
        .with_connection(Arc::new(db.clone()));

        assert!(matches!(
            op.call(&()).await,
            Err(OperationError::Connection(_))
        ));
        assert_eq!(db.stats().connections_opened, 0);
    }
}
