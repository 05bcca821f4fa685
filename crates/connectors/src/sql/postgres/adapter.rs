use crate::{
    connection::{Connection, Connector, RowStream},
    error::{ConnectorError, DbError},
    sql::{
        base::{
            dialect::Postgres,
            query::generator::QueryGenerator,
            requests::{FetchRowsRequest, WriteRequest},
            schema::TableSchema,
            stream::channel_stream,
        },
        postgres::{
            params::PgParamStore,
            row::row_from_pg,
            utils::{connect_client, display_target},
        },
    },
};
use async_trait::async_trait;
use futures_util::{StreamExt, pin_mut};
use model::records::row::Row;
use std::str::FromStr;
use tokio_postgres::{Client, Config};
use tracing::debug;

/// Opens one client per connection request.
#[derive(Clone)]
pub struct PgConnector {
    config: Config,
    name: String,
}

impl PgConnector {
    pub fn new(url: &str) -> Result<Self, ConnectorError> {
        let config =
            Config::from_str(url).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
        let name = display_target(&config);
        Ok(Self { config, name })
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectorError> {
        let client = connect_client(&self.config).await?;
        debug!(target = %self.name, "Opened Postgres connection");
        Ok(Box::new(PgConnection {
            client,
            in_transaction: false,
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub struct PgConnection {
    client: Client,
    in_transaction: bool,
}

impl PgConnection {
    async fn query_rows(
        &self,
        entity: &str,
        sql: &str,
        store: &PgParamStore,
    ) -> Result<Vec<Row>, DbError> {
        let rows = self.client.query(sql, &store.as_refs()).await?;
        rows.iter().map(|row| row_from_pg(entity, row)).collect()
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn fetch(&mut self, request: &FetchRowsRequest) -> Result<Vec<Row>, DbError> {
        let (sql, params) = QueryGenerator::new(&Postgres).select(request);
        debug!(%sql, "Fetching rows");
        let store = PgParamStore::from_values(params);
        self.query_rows(&request.table, &sql, &store).await
    }

    async fn count(&mut self, request: &FetchRowsRequest) -> Result<u64, DbError> {
        let (sql, params) = QueryGenerator::new(&Postgres).count(request);
        let store = PgParamStore::from_values(params);
        let row = self.client.query_one(sql.as_str(), &store.as_refs()).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn query_raw(&mut self, sql: &str) -> Result<Vec<Row>, DbError> {
        debug!(%sql, "Running raw query");
        self.query_rows("query", sql, &PgParamStore::from_values(Vec::new()))
            .await
    }

    async fn write(&mut self, request: &WriteRequest) -> Result<u64, DbError> {
        let (sql, params) = QueryGenerator::new(&Postgres).write(request);
        debug!(%sql, "Executing write");
        let store = PgParamStore::from_values(params);
        Ok(self.client.execute(sql.as_str(), &store.as_refs()).await?)
    }

    async fn create_table(&mut self, schema: &TableSchema) -> Result<(), DbError> {
        let sql = QueryGenerator::new(&Postgres).create_table(schema);
        debug!(%sql, "Creating table");
        self.client.batch_execute(&sql).await?;
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        if self.in_transaction {
            return Err(DbError::TransactionState(
                "transaction already active".to_string(),
            ));
        }
        self.client.batch_execute("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::TransactionState("no active transaction".to_string()));
        }
        self.in_transaction = false;
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::TransactionState("no active transaction".to_string()));
        }
        self.in_transaction = false;
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    fn into_row_stream(self: Box<Self>, request: FetchRowsRequest) -> RowStream {
        let client = self.client;
        channel_stream(move |tx| async move {
            let (sql, params) = QueryGenerator::new(&Postgres).select(&request);
            debug!(%sql, "Streaming rows");
            let store = PgParamStore::from_values(params);

            let rows = match client.query_raw(sql.as_str(), &store.params).await {
                Ok(rows) => rows,
                Err(err) => {
                    let _ = tx.send(Err(err.into())).await;
                    return;
                }
            };

            pin_mut!(rows);
            while let Some(item) = rows.next().await {
                let item = item
                    .map_err(DbError::from)
                    .and_then(|row| row_from_pg(&request.table, &row));
                if tx.send(item).await.is_err() {
                    debug!(table = %request.table, "Row stream dropped by consumer");
                    break;
                }
            }
            // `client` drops here, which ends the server session.
        })
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        let mut this = *self;
        if this.in_transaction {
            this.rollback().await?;
        }
        debug!("Closed Postgres connection");
        Ok(())
    }
}
