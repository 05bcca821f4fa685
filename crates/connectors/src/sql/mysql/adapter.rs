use crate::{
    connection::{Connection, Connector, RowStream},
    error::{ConnectorError, DbError},
    sql::{
        base::{
            dialect::MySql,
            query::generator::QueryGenerator,
            requests::{FetchRowsRequest, WriteRequest},
            schema::TableSchema,
            stream::channel_stream,
        },
        mysql::{params::positional, row::row_from_mysql},
    },
};
use async_trait::async_trait;
use futures_util::{StreamExt, pin_mut};
use model::records::row::Row;
use mysql_async::{Conn, Opts, Pool, Row as MySqlRow, prelude::Queryable};
use tracing::debug;

/// Hands out connections from a shared `mysql_async` pool.
#[derive(Clone)]
pub struct MySqlConnector {
    pool: Pool,
    name: String,
}

impl MySqlConnector {
    pub fn new(url: &str) -> Result<Self, ConnectorError> {
        let opts = Opts::from_url(url).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
        let name = format!(
            "mysql://{}:{}/{}",
            opts.ip_or_hostname(),
            opts.tcp_port(),
            opts.db_name().unwrap_or_default()
        );
        Ok(Self {
            pool: Pool::new(opts),
            name,
        })
    }

    /// Waits for every pooled connection to be returned and closes them.
    pub async fn disconnect(self) -> Result<(), ConnectorError> {
        self.pool.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectorError> {
        let conn = self.pool.get_conn().await?;
        debug!(target = %self.name, "Opened MySQL connection");
        Ok(Box::new(MySqlConnection {
            conn,
            in_transaction: false,
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub struct MySqlConnection {
    conn: Conn,
    in_transaction: bool,
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn fetch(&mut self, request: &FetchRowsRequest) -> Result<Vec<Row>, DbError> {
        let (sql, params) = QueryGenerator::new(&MySql).select(request);
        debug!(%sql, "Fetching rows");
        let params = positional(&params);
        let rows: Vec<MySqlRow> = self.conn.exec(sql, params).await?;
        rows.iter()
            .map(|row| row_from_mysql(&request.table, row))
            .collect()
    }

    async fn count(&mut self, request: &FetchRowsRequest) -> Result<u64, DbError> {
        let (sql, params) = QueryGenerator::new(&MySql).count(request);
        let params = positional(&params);
        let count: Option<u64> = self.conn.exec_first(sql, params).await?;
        Ok(count.unwrap_or(0))
    }

    async fn query_raw(&mut self, sql: &str) -> Result<Vec<Row>, DbError> {
        debug!(%sql, "Running raw query");
        let rows: Vec<MySqlRow> = self.conn.query(sql).await?;
        rows.iter().map(|row| row_from_mysql("query", row)).collect()
    }

    async fn write(&mut self, request: &WriteRequest) -> Result<u64, DbError> {
        let (sql, params) = QueryGenerator::new(&MySql).write(request);
        debug!(%sql, "Executing write");
        let params = positional(&params);
        self.conn.exec_drop(sql, params).await?;
        Ok(self.conn.affected_rows())
    }

    async fn create_table(&mut self, schema: &TableSchema) -> Result<(), DbError> {
        let sql = QueryGenerator::new(&MySql).create_table(schema);
        debug!(%sql, "Creating table");
        self.conn.query_drop(sql).await?;
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        if self.in_transaction {
            return Err(DbError::TransactionState(
                "transaction already active".to_string(),
            ));
        }
        self.conn.query_drop("START TRANSACTION").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::TransactionState("no active transaction".to_string()));
        }
        self.in_transaction = false;
        self.conn.query_drop("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::TransactionState("no active transaction".to_string()));
        }
        self.in_transaction = false;
        self.conn.query_drop("ROLLBACK").await?;
        Ok(())
    }

    fn into_row_stream(self: Box<Self>, request: FetchRowsRequest) -> RowStream {
        let mut conn = self.conn;
        channel_stream(move |tx| async move {
            let (sql, params) = QueryGenerator::new(&MySql).select(&request);
            debug!(%sql, "Streaming rows");
            let params = positional(&params);

            let rows = match conn.exec_stream::<MySqlRow, _, _>(sql, params).await {
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
                    .and_then(|row| row_from_mysql(&request.table, &row));
                if tx.send(item).await.is_err() {
                    debug!(table = %request.table, "Row stream dropped by consumer");
                    break;
                }
            }
        })
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        let mut this = *self;
        if this.in_transaction {
            this.rollback().await?;
        }
        // Returning the handle to the pool happens on drop.
        drop(this.conn);
        debug!("Closed MySQL connection");
        Ok(())
    }
}
