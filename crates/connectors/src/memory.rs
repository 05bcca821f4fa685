//! An in-process relational store backing the test suites.
//!
//! Requests are evaluated directly against per-table row vectors. A
//! transaction stages a private copy of the tables until commit. Every
//! connection opened and released is counted in [`MemoryStats`].

use crate::{
    connection::{Connection, Connector, RowStream},
    error::{ConnectorError, DbError},
    sql::base::{
        requests::{CompareOp, Condition, FetchRowsRequest, WriteRequest},
        schema::TableSchema,
    },
};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use model::{
    core::value::Value,
    records::row::{Field, Row},
};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, VecDeque},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering as AtomicOrdering},
    },
};
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<String>,
    primary_key: Option<String>,
    rows: Vec<Row>,
}

type Tables = BTreeMap<String, MemoryTable>;

/// Counters describing what the store has been asked to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub fetches: u64,
    pub writes: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

impl MemoryStats {
    pub fn open_connections(&self) -> u64 {
        self.connections_opened - self.connections_closed
    }
}

#[derive(Default)]
struct MemoryState {
    tables: Tables,
    stats: MemoryStats,
    unreachable: bool,
    connect_failures: VecDeque<String>,
    statement_failures: VecDeque<String>,
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates `table` if needed and appends `rows` to it.
    pub fn insert_rows(&self, table: &str, rows: Vec<Row>) {
        let mut state = self.lock();
        let entry = state.tables.entry(table.to_string()).or_default();
        if entry.columns.is_empty() {
            if let Some(first) = rows.first() {
                entry.columns = first.columns().map(String::from).collect();
            }
        }
        entry.rows.extend(rows);
    }

    pub fn create_table(&self, schema: &TableSchema) {
        let mut state = self.lock();
        state
            .tables
            .entry(schema.name.clone())
            .or_insert_with(|| table_from_schema(schema));
    }

    /// Committed rows of `table`, or `None` when it does not exist.
    pub fn rows(&self, table: &str) -> Option<Vec<Row>> {
        self.lock().tables.get(table).map(|t| t.rows.clone())
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.lock().tables.contains_key(table)
    }

    pub fn stats(&self) -> MemoryStats {
        self.lock().stats
    }

    /// While set, every `connect` fails with [`ConnectorError::Unreachable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Makes the next `connect` call fail with `message`. Calls queue up.
    pub fn fail_next_connect(&self, message: &str) {
        self.lock().connect_failures.push_back(message.to_string());
    }

    /// Makes the next statement on any connection fail with `message`.
    /// Calls queue up, one failure per statement.
    pub fn fail_next_statement(&self, message: &str) {
        self.lock().statement_failures.push_back(message.to_string());
    }

    fn take_statement_failure(&self) -> Result<(), DbError> {
        match self.lock().statement_failures.pop_front() {
            Some(message) => Err(DbError::Query(message)),
            None => Ok(()),
        }
    }

    fn record_closed(&self) {
        self.lock().stats.connections_closed += 1;
    }
}

fn table_from_schema(schema: &TableSchema) -> MemoryTable {
    MemoryTable {
        columns: schema.columns.iter().map(|c| c.name.clone()).collect(),
        primary_key: schema.primary_key().map(|c| c.name.clone()),
        rows: Vec::new(),
    }
}

#[async_trait]
impl Connector for MemoryDatabase {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectorError> {
        let mut state = self.lock();
        if state.unreachable {
            return Err(ConnectorError::Unreachable(
                "connection refused".to_string(),
            ));
        }
        if let Some(message) = state.connect_failures.pop_front() {
            return Err(ConnectorError::Unreachable(message));
        }
        state.stats.connections_opened += 1;
        drop(state);

        debug!("Opened in-memory connection");
        Ok(Box::new(MemoryConnection {
            db: self.clone(),
            staged: None,
            released: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

pub struct MemoryConnection {
    db: MemoryDatabase,
    /// Private copy of the tables while a transaction is open.
    staged: Option<Tables>,
    released: AtomicBool,
}

impl MemoryConnection {
    fn with_tables<R>(&mut self, f: impl FnOnce(&mut Tables) -> R) -> R {
        match self.staged.as_mut() {
            Some(staged) => f(staged),
            None => f(&mut self.db.lock().tables),
        }
    }

    fn select(&mut self, request: &FetchRowsRequest) -> Result<Vec<Row>, DbError> {
        self.db.take_statement_failure()?;
        self.db.lock().stats.fetches += 1;
        self.with_tables(|tables| evaluate(tables, request))
    }

    fn release(&self) {
        if !self.released.swap(true, AtomicOrdering::SeqCst) {
            self.db.record_closed();
            debug!("Released in-memory connection");
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}

fn lookup<'a>(tables: &'a Tables, name: &str) -> Result<&'a MemoryTable, DbError> {
    tables
        .get(name)
        .ok_or_else(|| DbError::Query(format!("no such table: {name}")))
}

fn lookup_mut<'a>(tables: &'a mut Tables, name: &str) -> Result<&'a mut MemoryTable, DbError> {
    tables
        .get_mut(name)
        .ok_or_else(|| DbError::Query(format!("no such table: {name}")))
}

fn column_value<'a>(row: &'a Row, column: &str) -> Result<&'a Value, DbError> {
    row.get(column)
        .ok_or_else(|| DbError::Query(format!("no such column: {column}")))
}

fn row_matches(row: &Row, conditions: &[Condition]) -> Result<bool, DbError> {
    for cond in conditions {
        let value = column_value(row, &cond.column)?;
        // SQL semantics: any comparison involving NULL is not true.
        let Some(ordering) = value.compare(&cond.value) else {
            return Ok(false);
        };
        let holds = match cond.op {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

fn filtered(table: &MemoryTable, conditions: &[Condition]) -> Result<Vec<Row>, DbError> {
    let mut rows = Vec::new();
    for row in &table.rows {
        if row_matches(row, conditions)? {
            rows.push(row.clone());
        }
    }
    Ok(rows)
}

fn evaluate(tables: &Tables, request: &FetchRowsRequest) -> Result<Vec<Row>, DbError> {
    let table = lookup(tables, &request.table)?;
    let mut rows = filtered(table, &request.conditions)?;

    if let Some(order_by) = &request.order_by {
        if let Some(first) = rows.first() {
            column_value(first, order_by)?;
        }
        // NULLs sort first, as in MySQL.
        rows.sort_by(|a, b| match (a.get(order_by), b.get(order_by)) {
            (Some(a), Some(b)) => match (a.is_null(), b.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
            },
            _ => Ordering::Equal,
        });
    }

    let offset = request.offset.unwrap_or(0);
    let limit = request.limit.unwrap_or(usize::MAX);
    let rows = rows.into_iter().skip(offset).take(limit);

    if request.columns.is_empty() {
        return Ok(rows.collect());
    }

    rows.map(|row| {
        for column in &request.columns {
            column_value(&row, column)?;
        }
        Ok(row.project(&request.columns))
    })
    .collect()
}

fn apply_write(tables: &mut Tables, request: &WriteRequest) -> Result<u64, DbError> {
    match request {
        WriteRequest::Insert { table, values } => {
            let target = lookup_mut(tables, table)?;

            if let Some(pk) = &target.primary_key {
                let key = values
                    .iter()
                    .find(|(column, _)| column.eq_ignore_ascii_case(pk))
                    .map(|(_, value)| value);
                if let Some(key) = key {
                    let duplicate = target.rows.iter().any(|row| {
                        row.get(pk)
                            .and_then(|existing| existing.compare(key))
                            .is_some_and(|ordering| ordering == Ordering::Equal)
                    });
                    if duplicate {
                        return Err(DbError::Query(format!(
                            "duplicate key value violates unique constraint on {table}.{pk}"
                        )));
                    }
                }
            }

            let fields = if target.columns.is_empty() {
                values
                    .iter()
                    .map(|(column, value)| Field::new(column, value.clone()))
                    .collect()
            } else {
                for (column, _) in values {
                    if !target.columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                        return Err(DbError::Query(format!("no such column: {column}")));
                    }
                }
                target
                    .columns
                    .iter()
                    .map(|column| {
                        let value = values
                            .iter()
                            .find(|(c, _)| c.eq_ignore_ascii_case(column))
                            .map(|(_, v)| v.clone())
                            .unwrap_or(Value::Null);
                        Field::new(column, value)
                    })
                    .collect()
            };

            target.rows.push(Row::new(table, fields));
            Ok(1)
        }
        WriteRequest::Update {
            table,
            set,
            conditions,
        } => {
            let target = lookup_mut(tables, table)?;
            let mut affected = 0;
            for row in target.rows.iter_mut() {
                if !row_matches(row, conditions)? {
                    continue;
                }
                let fields = row
                    .fields()
                    .iter()
                    .map(|field| {
                        let value = set
                            .iter()
                            .find(|(c, _)| c.eq_ignore_ascii_case(&field.name))
                            .map(|(_, v)| v.clone())
                            .unwrap_or_else(|| field.value.clone());
                        Field::new(&field.name, value)
                    })
                    .collect();
                *row = Row::new(table, fields);
                affected += 1;
            }
            Ok(affected)
        }
        WriteRequest::Delete { table, conditions } => {
            let target = lookup_mut(tables, table)?;
            let before = target.rows.len();
            let mut kept = Vec::with_capacity(before);
            for row in target.rows.drain(..) {
                if !row_matches(&row, conditions)? {
                    kept.push(row);
                }
            }
            target.rows = kept;
            Ok((before - target.rows.len()) as u64)
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn fetch(&mut self, request: &FetchRowsRequest) -> Result<Vec<Row>, DbError> {
        self.select(request)
    }

    async fn count(&mut self, request: &FetchRowsRequest) -> Result<u64, DbError> {
        self.db.take_statement_failure()?;
        self.with_tables(|tables| {
            let table = lookup(tables, &request.table)?;
            Ok(filtered(table, &request.conditions)?.len() as u64)
        })
    }

    async fn query_raw(&mut self, _sql: &str) -> Result<Vec<Row>, DbError> {
        Err(DbError::Query(
            "raw SQL is not supported by the in-memory store".to_string(),
        ))
    }

    async fn write(&mut self, request: &WriteRequest) -> Result<u64, DbError> {
        self.db.take_statement_failure()?;
        self.db.lock().stats.writes += 1;
        self.with_tables(|tables| apply_write(tables, request))
    }

    async fn create_table(&mut self, schema: &TableSchema) -> Result<(), DbError> {
        self.db.take_statement_failure()?;
        self.with_tables(|tables| {
            tables
                .entry(schema.name.clone())
                .or_insert_with(|| table_from_schema(schema));
        });
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        if self.staged.is_some() {
            return Err(DbError::TransactionState(
                "transaction already active".to_string(),
            ));
        }
        self.db.take_statement_failure()?;
        self.staged = Some(self.db.lock().tables.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        let Some(staged) = self.staged.take() else {
            return Err(DbError::TransactionState("no active transaction".to_string()));
        };
        self.db.take_statement_failure()?;
        let mut state = self.db.lock();
        state.tables = staged;
        state.stats.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        if self.staged.take().is_none() {
            return Err(DbError::TransactionState("no active transaction".to_string()));
        }
        self.db.lock().stats.rollbacks += 1;
        Ok(())
    }

    fn into_row_stream(mut self: Box<Self>, request: FetchRowsRequest) -> RowStream {
        match self.select(&request) {
            // The connection rides along in the stream state and is dropped
            // with it, after the last row or when the consumer stops.
            Ok(rows) => stream::unfold((self, rows.into_iter()), |(conn, mut rows)| async move {
                rows.next().map(|row| (Ok(row), (conn, rows)))
            })
            .boxed(),
            Err(err) => stream::once(async move { Err(err) }).boxed(),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        self.release();
        Ok(())
    }
}
