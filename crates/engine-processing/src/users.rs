//! The `user_data` table and the queries run against it.

use crate::{
    aggregate::stream_average,
    error::StreamError,
    paginate::{PageStream, lazy_paginate},
    stream::{RowResultStream, filter_rows, stream_batches, stream_rows},
};
use bigdecimal::BigDecimal;
use connectors::{
    connection::Connector,
    sql::base::{
        requests::{CompareOp, Condition, FetchRowsRequest, FetchRowsRequestBuilder, WriteRequest},
        schema::{ColumnDef, ColumnType, TableSchema},
    },
};
use futures::StreamExt;
use model::{core::value::Value, records::row::Row};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, sync::Arc};
use uuid::Uuid;

pub const USER_TABLE: &str = "user_data";

pub fn user_data_schema() -> TableSchema {
    TableSchema::new(
        USER_TABLE,
        vec![
            ColumnDef::new("user_id", ColumnType::Char(36)).primary_key(),
            ColumnDef::new("name", ColumnType::VarChar(255)),
            ColumnDef::new("email", ColumnType::VarChar(255)),
            ColumnDef::new(
                "age",
                ColumnType::Decimal {
                    precision: 3,
                    scale: 0,
                },
            ),
        ],
    )
}

/// Every user, in primary key order.
pub fn all_users() -> FetchRowsRequest {
    FetchRowsRequestBuilder::new(USER_TABLE)
        .order_by("user_id")
        .build()
}

/// Users strictly older than `min_age`, filtered by the database.
pub fn users_older_than(min_age: i64) -> FetchRowsRequest {
    FetchRowsRequestBuilder::new(USER_TABLE)
        .filter(Condition::new("age", CompareOp::Gt, min_age))
        .order_by("user_id")
        .build()
}

fn ages() -> FetchRowsRequest {
    FetchRowsRequestBuilder::new(USER_TABLE)
        .columns(&["age"])
        .order_by("user_id")
        .build()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub age: BigDecimal,
}

impl UserRecord {
    /// A record with a freshly generated id.
    pub fn new(name: &str, email: &str, age: impl Into<BigDecimal>) -> Self {
        Self {
            user_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            age: age.into(),
        }
    }

    pub fn from_row(row: &Row) -> Result<Self, StreamError> {
        let text = |column: &str| {
            row.get_value(column).as_string().ok_or_else(|| {
                StreamError::InvalidArgument(format!("user row has no '{column}' value"))
            })
        };
        let age = row.get_value("age");
        let age = age.as_decimal().ok_or_else(|| StreamError::NonNumeric {
            column: "age".to_string(),
            value: age.as_string().unwrap_or_default(),
        })?;

        Ok(Self {
            user_id: text("user_id")?,
            name: text("name")?,
            email: text("email")?,
            age,
        })
    }

    pub fn insert_request(&self) -> WriteRequest {
        WriteRequest::insert(
            USER_TABLE,
            vec![
                ("user_id", Value::String(self.user_id.clone())),
                ("name", Value::String(self.name.clone())),
                ("email", Value::String(self.email.clone())),
                ("age", Value::Decimal(self.age.clone())),
            ],
        )
    }
}

pub fn stream_users(connector: Arc<dyn Connector>) -> RowResultStream {
    stream_rows(connector, all_users())
}

/// Streams users older than `min_age`, reading the table `batch_size` rows
/// at a time and filtering each batch as it arrives.
pub fn batch_processing(
    connector: Arc<dyn Connector>,
    batch_size: usize,
    min_age: i64,
) -> Result<RowResultStream, StreamError> {
    let threshold = Value::Int(min_age);
    let batches = stream_batches(connector, all_users(), batch_size)?;
    let older = filter_rows(batches, move |row| {
        row.get("age")
            .and_then(|age| age.compare(&threshold))
            .is_some_and(|ordering| ordering == Ordering::Greater)
    });
    Ok(older.boxed())
}

pub fn paginate_users(
    connector: Arc<dyn Connector>,
    page_size: usize,
) -> Result<PageStream, StreamError> {
    lazy_paginate(connector, all_users(), page_size)
}

pub async fn calculate_average_age(connector: Arc<dyn Connector>) -> Result<f64, StreamError> {
    stream_average(connector, ages(), "age").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::memory::MemoryDatabase;
    use futures::TryStreamExt;
    use model::records::row::Field;

    fn populated(ages: &[i64]) -> Arc<MemoryDatabase> {
        let db = MemoryDatabase::new();
        db.create_table(&user_data_schema());
        let rows = ages
            .iter()
            .enumerate()
            .map(|(i, age)| {
                let mut user = UserRecord::new(&format!("user{i}"), "u@example.com", *age);
                // Zero-padded so primary key order matches insertion order.
                user.user_id = format!("00000000-0000-4000-8000-{i:012}");
                Row::new(
                    USER_TABLE,
                    vec![
                        Field::new("user_id", user.user_id),
                        Field::new("name", user.name),
                        Field::new("email", user.email),
                        Field::new("age", Value::Decimal(user.age)),
                    ],
                )
            })
            .collect();
        db.insert_rows(USER_TABLE, rows);
        Arc::new(db)
    }

    #[tokio::test]
    async fn test_average_age() {
        let db = populated(&[28, 35, 42, 29, 33]);
        assert_eq!(calculate_average_age(db).await.unwrap(), 33.4);
    }

    #[tokio::test]
    async fn test_batch_processing_keeps_older_users() {
        let db = populated(&[20, 26, 25, 40, 31]);
        let rows: Vec<Row> = batch_processing(db.clone(), 2, 25)
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let names: Vec<String> = rows
            .iter()
            .filter_map(|r| r.get_value("name").as_string())
            .collect();
        assert_eq!(names, vec!["user1", "user3", "user4"]);
        assert_eq!(db.stats().open_connections(), 0);
    }

    #[tokio::test]
    async fn test_record_round_trips_through_row() {
        let db = populated(&[51]);
        let rows: Vec<Row> = stream_users(db).try_collect().await.unwrap();
        let user = UserRecord::from_row(&rows[0]).unwrap();
        assert_eq!(user.name, "user0");
        assert_eq!(user.age, BigDecimal::from(51));
        assert!(Uuid::parse_str(&user.user_id).is_ok());
    }

    #[tokio::test]
    async fn test_older_than_request_filters_in_database() {
        let db = populated(&[18, 60]);
        let rows = crate::concurrent::fetch_all(&*db, &users_older_than(30))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
