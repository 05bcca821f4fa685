//! Database-specific pieces of SQL syntax.

use crate::sql::base::schema::ColumnType;

pub trait Dialect: Send + Sync {
    /// Wraps an identifier (like a table or column name) in the correct
    /// quotation marks for the dialect.
    ///
    /// - PostgreSQL uses double quotes: `"my_column"`
    /// - MySQL uses backticks: `` `my_column` ``
    fn quote_identifier(&self, ident: &str) -> String;

    /// Returns the placeholder for the zero-based parameter `index`.
    ///
    /// - PostgreSQL uses `$1`, `$2`, etc.
    /// - MySQL uses `?`
    fn placeholder(&self, index: usize) -> String;

    fn render_column_type(&self, column_type: &ColumnType) -> String;

    /// Whether `OFFSET` is only valid after a `LIMIT` clause.
    fn requires_limit_for_offset(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index + 1)
    }

    fn render_column_type(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::Char(len) => format!("CHAR({len})"),
            ColumnType::VarChar(len) => format!("VARCHAR({len})"),
            ColumnType::Integer => "BIGINT".to_string(),
            ColumnType::Decimal { precision, scale } => format!("NUMERIC({precision},{scale})"),
        }
    }

    fn name(&self) -> &'static str {
        "PostgreSQL"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl Dialect for MySql {
    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn render_column_type(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::Char(len) => format!("CHAR({len})"),
            ColumnType::VarChar(len) => format!("VARCHAR({len})"),
            ColumnType::Integer => "BIGINT".to_string(),
            ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
        }
    }

    fn requires_limit_for_offset(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "MySQL"
    }
}
