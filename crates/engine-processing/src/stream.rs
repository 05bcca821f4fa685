use crate::error::StreamError;
use connectors::{connection::Connector, sql::base::requests::FetchRowsRequest};
use futures::{
    Stream, StreamExt,
    stream::{self, BoxStream},
};
use model::records::{batch::Batch, row::Row};
use std::sync::Arc;
use tracing::{debug, warn};

pub type RowResultStream = BoxStream<'static, Result<Row, StreamError>>;
pub type BatchStream = BoxStream<'static, Result<Batch, StreamError>>;

/// Streams the rows of `request` one at a time.
///
/// Nothing happens until the stream is first polled; the connection is
/// opened then and handed to the row stream, which releases it when it is
/// exhausted or dropped. A source that cannot be reached yields a single
/// [`StreamError::Connection`] item instead of an empty stream.
pub fn stream_rows(connector: Arc<dyn Connector>, request: FetchRowsRequest) -> RowResultStream {
    stream::once(async move {
        let source = connector.name().to_string();
        match connector.connect().await {
            Ok(conn) => {
                debug!(source, table = %request.table, "Streaming rows");
                conn.into_row_stream(request)
                    .map(|row| row.map_err(StreamError::from))
                    .boxed()
            }
            Err(err) => {
                warn!(source, error = %err, "Could not open connection for row stream");
                stream::once(async move { Err(StreamError::from(err)) }).boxed()
            }
        }
    })
    .flatten()
    .boxed()
}

// Upper bound on the rows reserved up front for one batch.
const MAX_PREALLOCATED_ROWS: usize = 1024;

/// Groups the rows of `request` into contiguous batches of `batch_size`;
/// the final batch may be shorter. A row error is yielded in place of the
/// batch being assembled and ends the stream.
pub fn stream_batches(
    connector: Arc<dyn Connector>,
    request: FetchRowsRequest,
    batch_size: usize,
) -> Result<BatchStream, StreamError> {
    if batch_size == 0 {
        return Err(StreamError::InvalidArgument(
            "batch_size must be greater than zero".to_string(),
        ));
    }

    let rows = stream_rows(connector, request);
    let batches = stream::unfold(Some(rows), move |state| async move {
        let mut rows = state?;
        let mut buffer = Vec::with_capacity(batch_size.min(MAX_PREALLOCATED_ROWS));

        while buffer.len() < batch_size {
            match rows.next().await {
                Some(Ok(row)) => buffer.push(row),
                Some(Err(err)) => return Some((Err(err), None)),
                None => return Batch::new(buffer).map(|batch| (Ok(batch), None)),
            }
        }
        Batch::new(buffer).map(|batch| (Ok(batch), Some(rows)))
    });

    Ok(batches.boxed())
}

/// Flattens `batches` into the rows accepted by `predicate`, keeping their
/// order. Only the batch currently being filtered is held in memory.
pub fn filter_rows<S, P>(
    batches: S,
    mut predicate: P,
) -> impl Stream<Item = Result<Row, StreamError>>
where
    S: Stream<Item = Result<Batch, StreamError>>,
    P: FnMut(&Row) -> bool,
{
    batches
        .map(move |batch| {
            let items: Vec<Result<Row, StreamError>> = match batch {
                Ok(batch) => batch
                    .into_iter()
                    .filter(|row| predicate(row))
                    .map(Ok)
                    .collect(),
                Err(err) => vec![Err(err)],
            };
            stream::iter(items)
        })
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::{memory::MemoryDatabase, sql::base::requests::FetchRowsRequestBuilder};
    use futures::TryStreamExt;
    use model::{core::value::Value, records::row::Field};

    fn people(n: i64) -> MemoryDatabase {
        let db = MemoryDatabase::new();
        let rows = (1..=n)
            .map(|id| {
                Row::new(
                    "people",
                    vec![Field::new("id", id), Field::new("age", 20 + id)],
                )
            })
            .collect();
        db.insert_rows("people", rows);
        db
    }

    fn by_id() -> FetchRowsRequest {
        FetchRowsRequestBuilder::new("people").order_by("id").build()
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter()
            .filter_map(|r| r.get_value("id").as_i64())
            .collect()
    }

    #[tokio::test]
    async fn test_rows_are_lazy_and_ordered() {
        let db = people(4);
        let stream = stream_rows(Arc::new(db.clone()), by_id());
        assert_eq!(db.stats().connections_opened, 0);

        let rows: Vec<Row> = stream.try_collect().await.unwrap();
        assert_eq!(ids(&rows), vec![1, 2, 3, 4]);
        assert_eq!(db.stats().connections_opened, 1);
        assert_eq!(db.stats().open_connections(), 0);
    }

    #[tokio::test]
    async fn test_early_stop_releases_connection() {
        let db = people(10);
        let mut stream = stream_rows(Arc::new(db.clone()), by_id());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.get_value("id"), Value::Int(1));
        assert_eq!(db.stats().open_connections(), 1);

        drop(stream);
        assert_eq!(db.stats().connections_closed, 1);
    }

    #[tokio::test]
    async fn test_unreachable_source_is_an_error() {
        let db = people(3);
        db.set_unreachable(true);
        let items: Vec<_> = stream_rows(Arc::new(db), by_id()).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(StreamError::Connection(_))));
    }

    #[tokio::test]
    async fn test_batches_partition_rows() {
        let db = people(7);
        let batches: Vec<Batch> = stream_batches(Arc::new(db.clone()), by_id(), 3)
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        let all: Vec<Row> = batches.into_iter().flat_map(Batch::into_rows).collect();
        assert_eq!(ids(&all), (1..=7).collect::<Vec<_>>());
        assert_eq!(db.stats().open_connections(), 0);
    }

    #[tokio::test]
    async fn test_huge_batch_size_yields_one_batch() {
        let db = people(3);
        let batches: Vec<Batch> = stream_batches(Arc::new(db.clone()), by_id(), usize::MAX)
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(batches.len(), 1);
        assert_eq!(ids(batches[0].rows()), vec![1, 2, 3]);
        assert_eq!(db.stats().open_connections(), 0);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected_without_io() {
        let db = people(3);
        let result = stream_batches(Arc::new(db.clone()), by_id(), 0);
        assert!(matches!(result, Err(StreamError::InvalidArgument(_))));
        assert_eq!(db.stats().connections_opened, 0);
    }

    #[tokio::test]
    async fn test_empty_source_yields_no_batches() {
        let db = people(0);
        let batches: Vec<Batch> = stream_batches(Arc::new(db), by_id(), 4)
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(batches.is_empty());
    }

    #[tokio::test]
    async fn test_filter_keeps_order_across_batches() {
        let db = people(9);
        let batches = stream_batches(Arc::new(db), by_id(), 2).unwrap();
        let rows: Vec<Row> = filter_rows(batches, |row| {
            row.get_value("id").as_i64().unwrap_or(0) % 3 == 0
        })
        .try_collect()
        .await
        .unwrap();
        assert_eq!(ids(&rows), vec![3, 6, 9]);
    }
}
