//! Loads `user_data` from a CSV file with `user_id,name,email,age` columns.

use crate::{
    error::SeedError,
    users::{UserRecord, all_users, user_data_schema},
};
use bigdecimal::BigDecimal;
use connectors::connection::Connector;
use engine_core::{
    error::OperationError,
    operation::{DataOperationExt, FnDataOperation, Operation},
};
use serde::Serialize;
use std::{collections::HashSet, io, path::Path, str::FromStr, sync::Arc};
use tracing::{info, warn};
use uuid::Uuid;

const REQUIRED_COLUMNS: [&str; 4] = ["user_id", "name", "email", "age"];
const MAX_AGE: i64 = 150;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub inserted: usize,
    /// CSV rows rejected by validation.
    pub skipped: usize,
    /// Rows already present; non-zero means nothing was inserted.
    pub existing: u64,
}

/// Valid records of a CSV source plus the number of rejected rows. Rows with
/// a blank field, a malformed UUID, an age outside `0..=150` or a repeated
/// `user_id` are skipped.
pub fn read_users<R: io::Read>(reader: R) -> Result<(Vec<UserRecord>, usize), SeedError> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers = csv.headers()?.clone();

    let mut positions = [0usize; 4];
    for (slot, column) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| SeedError::MissingColumn(column.to_string()))?;
    }

    let mut users = Vec::new();
    let mut seen = HashSet::new();
    let mut skipped = 0;

    for (line, record) in csv.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(line = line + 2, error = %err, "Unreadable CSV row, skipping");
                skipped += 1;
                continue;
            }
        };

        let field = |i: usize| record.get(positions[i]).map(str::trim).unwrap_or_default();
        match validate(field(0), field(1), field(2), field(3)) {
            Ok(user) if seen.insert(user.user_id.clone()) => users.push(user),
            Ok(user) => {
                warn!(line = line + 2, user_id = %user.user_id, "Duplicate user_id, skipping");
                skipped += 1;
            }
            Err(reason) => {
                warn!(line = line + 2, reason = %reason, "Invalid CSV row, skipping");
                skipped += 1;
            }
        }
    }

    Ok((users, skipped))
}

fn validate(user_id: &str, name: &str, email: &str, age: &str) -> Result<UserRecord, String> {
    if [user_id, name, email, age].iter().any(|v| v.is_empty()) {
        return Err("blank field".to_string());
    }
    let user_id = Uuid::parse_str(user_id)
        .map_err(|_| format!("invalid UUID format: {user_id}"))?
        .to_string();
    let age = BigDecimal::from_str(age).map_err(|_| format!("invalid age format: {age}"))?;
    if age < BigDecimal::from(0) || age > BigDecimal::from(MAX_AGE) {
        return Err(format!("invalid age: {age}"));
    }

    Ok(UserRecord {
        user_id,
        name: name.to_string(),
        email: email.to_string(),
        age,
    })
}

/// Creates `user_data` if needed and fills it from `csv_path`, all rows in
/// one transaction. A table that already holds rows is left untouched.
pub async fn seed_users(
    connector: Arc<dyn Connector>,
    csv_path: &Path,
) -> Result<SeedReport, SeedError> {
    let prepare = FnDataOperation::new("prepare_user_table", |conn, _: &()| {
        Box::pin(async move {
            conn.create_table(&user_data_schema()).await?;
            Ok::<_, OperationError>(conn.count(&all_users()).await?)
        })
    })
    .with_connection(connector.clone());

    let existing = prepare.call(&()).await?;
    if existing > 0 {
        info!(existing, "Table already contains users, skipping insertion");
        return Ok(SeedReport {
            existing,
            ..SeedReport::default()
        });
    }

    let file = std::fs::File::open(csv_path)?;
    let (users, skipped) = read_users(file)?;

    let insert = FnDataOperation::new("insert_users", |conn, users: &Vec<UserRecord>| {
        Box::pin(async move {
            for user in users {
                conn.write(&user.insert_request()).await?;
            }
            Ok::<_, OperationError>(users.len())
        })
    })
    .with_transaction()
    .with_connection(connector);

    let inserted = insert.call(&users).await?;
    info!(inserted, skipped, path = %csv_path.display(), "Seeded user_data");

    Ok(SeedReport {
        inserted,
        skipped,
        existing: 0,
    })
}
