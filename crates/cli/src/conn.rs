use crate::error::CliError;
use connectors::connection::Connector;
use engine_core::{
    error::OperationError,
    operation::{DataOperationExt, FnDataOperation, Operation, OperationExt},
    retry::RetryPolicy,
};
use model::records::row::Row;
use std::sync::Arc;
use tracing::{error, info};

const PROBE: &str = "SELECT 1";

/// Opens a connection and runs `SELECT 1`, retrying transient failures.
pub async fn ping(connector: Arc<dyn Connector>, policy: RetryPolicy) -> Result<(), CliError> {
    let source = connector.name().to_string();
    info!(source = %source, "Pinging data source");

    let probe = FnDataOperation::new("ping", |conn, _: &()| {
        Box::pin(async move {
            let rows = conn.query_raw(PROBE).await?;
            Ok::<_, OperationError>(rows)
        })
    })
    .with_connection(connector)
    .with_retry(policy);

    let rows = probe.call(&()).await.inspect_err(|e| {
        error!(source = %source, error = %e, "Ping failed");
    })?;
    check_probe(&rows)?;

    info!(source = %source, "Ping succeeded");
    Ok(())
}

fn check_probe(rows: &[Row]) -> Result<(), CliError> {
    let value = rows
        .first()
        .and_then(|row| row.fields().first())
        .map(|field| field.value.clone())
        .ok_or_else(|| CliError::Unexpected(format!("'{PROBE}' returned no result")))?;

    match value.as_i64() {
        Some(1) => Ok(()),
        _ => Err(CliError::Unexpected(format!(
            "'{PROBE}' returned unexpected result: {value:?}"
        ))),
    }
}
