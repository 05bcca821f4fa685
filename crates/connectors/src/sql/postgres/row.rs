use crate::error::DbError;
use bigdecimal::BigDecimal;
use model::{
    core::value::Value,
    records::row::{Field, Row},
};
use rust_decimal::Decimal as RustDecimal;
use std::str::FromStr;
use tokio_postgres::{Row as PgRow, types::Type};
use tracing::warn;

pub(crate) fn row_from_pg(entity: &str, row: &PgRow) -> Result<Row, DbError> {
    let fields = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = column_value(row, idx, column.type_()).map_err(|e| DbError::Decode {
                column: column.name().to_string(),
                message: e.to_string(),
            })?;
            Ok(Field::new(column.name(), value))
        })
        .collect::<Result<Vec<_>, DbError>>()?;

    Ok(Row::new(entity, fields))
}

fn column_value(row: &PgRow, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?
            .map(|v| Value::Int(v as i64))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?
            .map(|v| Value::Int(v as i64))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(Value::Int)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(v as f64))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?.map(Value::Float)
    } else if *ty == Type::NUMERIC {
        row.try_get::<_, Option<RustDecimal>>(idx)?
            .and_then(|d| BigDecimal::from_str(&d.to_string()).ok())
            .map(Value::Decimal)
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.map(Value::Boolean)
    } else {
        match row.try_get::<_, Option<String>>(idx) {
            Ok(text) => text.map(Value::String),
            Err(_) => {
                warn!(column = idx, r#type = %ty, "Unsupported Postgres type, reading as NULL");
                None
            }
        }
    };

    Ok(value.unwrap_or(Value::Null))
}
