use crate::{connection::RowStream, error::DbError};
use futures_util::{StreamExt, stream};
use model::records::row::Row;
use std::future::Future;
use tokio::sync::mpsc;

pub(crate) type RowSender = mpsc::Sender<Result<Row, DbError>>;

/// Runs `produce` on its own task and exposes what it sends as a stream.
///
/// The channel holds a single row, so the producer never runs more than one
/// row ahead of the consumer. Dropping the stream closes the channel; the
/// producer sees the failed send, stops, and drops whatever connection it
/// owns.
pub(crate) fn channel_stream<F, Fut>(produce: F) -> RowStream
where
    F: FnOnce(RowSender) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(produce(tx));

    stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((item, rx))
    })
    .boxed()
}
