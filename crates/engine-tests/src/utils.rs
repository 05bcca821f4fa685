#![allow(dead_code)]

use connectors::{connection::Connector, memory::MemoryDatabase};
use engine_processing::users::{USER_TABLE, user_data_schema};
use model::{
    core::value::Value,
    records::row::{Field, Row},
};
use std::sync::Arc;

/// The ages used throughout the aggregation tests; their mean is 33.4.
pub const SAMPLE_AGES: [i64; 5] = [28, 35, 42, 29, 33];

/// A `user_data` table holding one user per entry of `ages`. User ids are
/// zero-padded so primary key order is insertion order.
pub fn users_db(ages: &[i64]) -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.create_table(&user_data_schema());
    let rows = ages
        .iter()
        .enumerate()
        .map(|(i, age)| {
            Row::new(
                USER_TABLE,
                vec![
                    Field::new("user_id", format!("00000000-0000-4000-8000-{i:012}")),
                    Field::new("name", format!("user{i}")),
                    Field::new("email", format!("user{i}@example.com")),
                    Field::new("age", Value::Int(*age)),
                ],
            )
        })
        .collect();
    db.insert_rows(USER_TABLE, rows);
    db
}

/// `table` with an `id` column holding `1..=n`.
pub fn numbered_db(table: &str, n: i64) -> MemoryDatabase {
    let db = MemoryDatabase::new();
    let rows = (1..=n)
        .map(|id| Row::new(table, vec![Field::new("id", id)]))
        .collect();
    db.insert_rows(table, rows);
    db
}

pub fn connector(db: &MemoryDatabase) -> Arc<dyn Connector> {
    Arc::new(db.clone())
}

pub fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .filter_map(|r| r.get_value("id").as_i64())
        .collect()
}

/// Every connection the store handed out has been released.
pub fn assert_no_open_connections(db: &MemoryDatabase) {
    let stats = db.stats();
    assert_eq!(
        stats.connections_opened, stats.connections_closed,
        "opened {} connections but closed {}",
        stats.connections_opened, stats.connections_closed
    );
}
