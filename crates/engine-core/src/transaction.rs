use crate::{error::OperationError, operation::DataOperation};
use async_trait::async_trait;
use connectors::connection::Connection;
use tracing::{debug, error, warn};

/// Runs the inner operation between BEGIN and COMMIT, rolling back when it
/// fails. The caller supplies the connection, usually through
/// [`crate::connection::WithConnection`].
pub struct WithTransaction<Op> {
    inner: Op,
}

impl<Op> WithTransaction<Op> {
    pub fn new(inner: Op) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<Op: DataOperation> DataOperation for WithTransaction<Op> {
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
        conn.begin().await?;
        debug!(operation, "Transaction started");

        match self.inner.run(&mut *conn, args).await {
            Ok(output) => {
                conn.commit().await?;
                debug!(operation, "Transaction committed");
                Ok(output)
            }
            Err(err) => {
                match conn.rollback().await {
                    Ok(()) => warn!(operation, error = %err, "Transaction rolled back"),
                    Err(rollback_err) => error!(
                        operation,
                        error = %err,
                        rollback_error = %rollback_err,
                        "Rollback failed"
                    ),
                }
                Err(err)
            }
        }
    }
}
