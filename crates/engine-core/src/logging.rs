use crate::{
    error::OperationError,
    operation::{DataOperation, Operation},
};
use async_trait::async_trait;
use connectors::connection::Connection;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Logs each call with its arguments before it runs and its duration after.
pub struct WithLogging<Op> {
    inner: Op,
}

impl<Op> WithLogging<Op> {
    pub fn new(inner: Op) -> Self {
        Self { inner }
    }
}

fn render_args<A: Serialize>(args: &A) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| "<unserializable>".to_string())
}

fn log_outcome<T>(operation: &str, started: Instant, result: &Result<T, OperationError>) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(_) => info!(operation, elapsed_ms, "Query finished"),
        Err(err) => warn!(operation, elapsed_ms, error = %err, "Query failed"),
    }
}

#[async_trait]
impl<Op: DataOperation> DataOperation for WithLogging<Op> {
    type Args = Op::Args;
    type Output = Op::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(
        &self,
        conn: &mut dyn Connection,
        args: &Self::Args,
    ) -> Result<Self::Output, OperationError> {
        let operation = self.inner.name();
        info!(operation, args = %render_args(args), "Executing query");
        let started = Instant::now();
        let result = self.inner.run(conn, args).await;
        log_outcome(operation, started, &result);
        result
    }
}

#[async_trait]
impl<Op: Operation> Operation for WithLogging<Op> {
    type Args = Op::Args;
    type Output = Op::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn call(&self, args: &Self::Args) -> Result<Self::Output, OperationError> {
        let operation = self.inner.name();
        info!(operation, args = %render_args(args), "Executing query");
        let started = Instant::now();
        let result = self.inner.call(args).await;
        log_outcome(operation, started, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{FnOperation, OperationExt};
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    async fn test_logs_arguments_and_outcome() {
        let op = FnOperation::new("find_user", |id: &u32| {
            let id = *id;
            Box::pin(async move { Ok::<_, OperationError>(id * 2) })
        })
        .with_logging();

        assert_eq!(op.call(&21).await.unwrap(), 42);
        assert!(logs_contain("Executing query"));
        assert!(logs_contain("find_user"));
        assert!(logs_contain("args=21"));
        assert!(logs_contain("Query finished"));
    }
}
