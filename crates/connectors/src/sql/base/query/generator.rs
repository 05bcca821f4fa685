use crate::sql::base::{
    dialect::Dialect,
    requests::{Condition, FetchRowsRequest, WriteRequest},
    schema::TableSchema,
};
use model::core::value::Value;

/// Largest row count MySQL accepts in `LIMIT`; used when only an offset is given.
const MYSQL_MAX_LIMIT: &str = "18446744073709551615";

/// Renders requests into parameterised SQL for one dialect.
pub struct QueryGenerator<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Generates a SQL SELECT statement and its parameters.
    pub fn select(&self, request: &FetchRowsRequest) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let columns = if request.columns.is_empty() {
            "*".to_string()
        } else {
            self.column_list(&request.columns)
        };

        let mut sql = format!(
            "SELECT {} FROM {}",
            columns,
            self.dialect.quote_identifier(&request.table)
        );

        self.push_where(&mut sql, &mut params, &request.conditions);

        if let Some(order_by) = &request.order_by {
            sql.push_str(&format!(
                " ORDER BY {}",
                self.dialect.quote_identifier(order_by)
            ));
        }

        match (request.limit, request.offset) {
            (Some(limit), offset) => {
                sql.push_str(&format!(" LIMIT {}", self.bind(&mut params, limit)));
                if let Some(offset) = offset {
                    sql.push_str(&format!(" OFFSET {}", self.bind(&mut params, offset)));
                }
            }
            (None, Some(offset)) => {
                if self.dialect.requires_limit_for_offset() {
                    sql.push_str(&format!(" LIMIT {MYSQL_MAX_LIMIT}"));
                }
                sql.push_str(&format!(" OFFSET {}", self.bind(&mut params, offset)));
            }
            (None, None) => {}
        }

        (sql, params)
    }

    pub fn count(&self, request: &FetchRowsRequest) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT COUNT(*) AS {} FROM {}",
            self.dialect.quote_identifier("count"),
            self.dialect.quote_identifier(&request.table)
        );
        self.push_where(&mut sql, &mut params, &request.conditions);
        (sql, params)
    }

    pub fn write(&self, request: &WriteRequest) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = match request {
            WriteRequest::Insert { table, values } => {
                let columns = values.iter().map(|(c, _)| c.clone()).collect::<Vec<_>>();
                let placeholders = values
                    .iter()
                    .map(|(_, v)| self.bind(&mut params, v.clone()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    self.dialect.quote_identifier(table),
                    self.column_list(&columns),
                    placeholders
                )
            }
            WriteRequest::Update {
                table,
                set,
                conditions,
            } => {
                let assignments = set
                    .iter()
                    .map(|(c, v)| {
                        format!(
                            "{} = {}",
                            self.dialect.quote_identifier(c),
                            self.bind(&mut params, v.clone())
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut sql = format!(
                    "UPDATE {} SET {}",
                    self.dialect.quote_identifier(table),
                    assignments
                );
                self.push_where(&mut sql, &mut params, conditions);
                sql
            }
            WriteRequest::Delete { table, conditions } => {
                let mut sql = format!("DELETE FROM {}", self.dialect.quote_identifier(table));
                self.push_where(&mut sql, &mut params, conditions);
                sql
            }
        };

        (sql, params)
    }

    pub fn create_table(&self, schema: &TableSchema) -> String {
        let mut definitions = schema
            .columns
            .iter()
            .map(|col| {
                let null = if col.nullable { "" } else { " NOT NULL" };
                format!(
                    "{} {}{}",
                    self.dialect.quote_identifier(&col.name),
                    self.dialect.render_column_type(&col.column_type),
                    null
                )
            })
            .collect::<Vec<_>>();

        if let Some(pk) = schema.primary_key() {
            definitions.push(format!(
                "PRIMARY KEY ({})",
                self.dialect.quote_identifier(&pk.name)
            ));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.dialect.quote_identifier(&schema.name),
            definitions.join(", ")
        )
    }

    fn push_where(&self, sql: &mut String, params: &mut Vec<Value>, conditions: &[Condition]) {
        if conditions.is_empty() {
            return;
        }

        let clauses = conditions
            .iter()
            .map(|cond| {
                format!(
                    "{} {} {}",
                    self.dialect.quote_identifier(&cond.column),
                    cond.op,
                    self.bind(params, cond.value.clone())
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");

        sql.push_str(" WHERE ");
        sql.push_str(&clauses);
    }

    fn bind(&self, params: &mut Vec<Value>, value: impl Into<BindValue>) -> String {
        let placeholder = self.dialect.placeholder(params.len());
        params.push(value.into().0);
        placeholder
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

struct BindValue(Value);

impl From<Value> for BindValue {
    fn from(value: Value) -> Self {
        BindValue(value)
    }
}

/// Limits and offsets beyond `i64::MAX` are clamped; no table is that large.
impl From<usize> for BindValue {
    fn from(value: usize) -> Self {
        BindValue(Value::Int(i64::try_from(value).unwrap_or(i64::MAX)))
    }
}
