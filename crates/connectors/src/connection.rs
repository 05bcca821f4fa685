use crate::{
    error::{ConnectorError, DbError},
    sql::base::{
        requests::{FetchRowsRequest, WriteRequest},
        schema::TableSchema,
    },
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use model::records::row::Row;

/// Rows produced lazily by a single query. The stream owns the connection
/// it reads from; dropping the stream releases it.
pub type RowStream = BoxStream<'static, Result<Row, DbError>>;

/// Hands out connections to one data source.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectorError>;

    /// Human readable name of the source, used in logs.
    fn name(&self) -> &str;
}

/// A single open session against the data source.
///
/// A connection is released exactly once: either explicitly through
/// [`Connection::close`], by being consumed into a [`RowStream`], or by
/// being dropped.
#[async_trait]
pub trait Connection: Send {
    async fn fetch(&mut self, request: &FetchRowsRequest) -> Result<Vec<Row>, DbError>;

    async fn count(&mut self, request: &FetchRowsRequest) -> Result<u64, DbError>;

    /// Runs a literal SQL statement and collects whatever rows it returns.
    async fn query_raw(&mut self, sql: &str) -> Result<Vec<Row>, DbError>;

    /// Returns the number of affected rows.
    async fn write(&mut self, request: &WriteRequest) -> Result<u64, DbError>;

    async fn create_table(&mut self, schema: &TableSchema) -> Result<(), DbError>;

    async fn begin(&mut self) -> Result<(), DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn rollback(&mut self) -> Result<(), DbError>;

    /// Turns the connection into a stream over the rows of `request`,
    /// yielded in source order without buffering the full result.
    fn into_row_stream(self: Box<Self>, request: FetchRowsRequest) -> RowStream;

    async fn close(self: Box<Self>) -> Result<(), DbError>;
}
