use crate::error::StreamError;
use connectors::{connection::Connector, sql::base::requests::FetchRowsRequest};
use futures::future::try_join_all;
use model::records::row::Row;
use std::{sync::Arc, time::Instant};
use tracing::{debug, warn};

/// Runs `request` to completion on a connection of its own and closes it.
pub async fn fetch_all(
    connector: &dyn Connector,
    request: &FetchRowsRequest,
) -> Result<Vec<Row>, StreamError> {
    let mut conn = connector.connect().await?;
    let result = conn.fetch(request).await;

    if let Err(err) = conn.close().await {
        warn!(source = connector.name(), error = %err, "Failed to close connection");
    }
    Ok(result?)
}

/// Issues every request at once, each on its own connection, and waits for
/// all of them. Results come back in request order; the first failure
/// cancels the fetches still in flight.
pub async fn fetch_concurrently(
    connector: Arc<dyn Connector>,
    requests: Vec<FetchRowsRequest>,
) -> Result<Vec<Vec<Row>>, StreamError> {
    let started = Instant::now();
    let fetches = requests
        .iter()
        .map(|request| fetch_all(connector.as_ref(), request));
    let results = try_join_all(fetches).await?;

    debug!(
        source = connector.name(),
        queries = results.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Concurrent fetches finished"
    );
    Ok(results)
}
