use crate::error::DbError;
use bigdecimal::BigDecimal;
use model::{
    core::value::Value,
    records::row::{Field, Row},
};
use mysql_async::{Row as MySqlRow, Value as MySqlValue, consts::ColumnType};
use std::str::FromStr;

pub(crate) fn row_from_mysql(entity: &str, row: &MySqlRow) -> Result<Row, DbError> {
    let fields = row
        .columns_ref()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let name = column.name_str().into_owned();
            let value = match row.as_ref(idx) {
                Some(raw) => convert_value(&name, column.column_type(), raw)?,
                None => Value::Null,
            };
            Ok(Field { name, value })
        })
        .collect::<Result<Vec<_>, DbError>>()?;

    Ok(Row::new(entity, fields))
}

fn convert_value(
    column: &str,
    column_type: ColumnType,
    raw: &MySqlValue,
) -> Result<Value, DbError> {
    let decode_err = |message: String| DbError::Decode {
        column: column.to_string(),
        message,
    };

    let value = match raw {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Int(v) => Value::Int(*v),
        MySqlValue::UInt(v) => match i64::try_from(*v) {
            Ok(v) => Value::Int(v),
            Err(_) => Value::Decimal(BigDecimal::from(*v)),
        },
        MySqlValue::Float(v) => Value::Float(*v as f64),
        MySqlValue::Double(v) => Value::Float(*v),
        // Text protocol results and DECIMAL columns arrive as bytes.
        MySqlValue::Bytes(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            match column_type {
                ColumnType::MYSQL_TYPE_NEWDECIMAL | ColumnType::MYSQL_TYPE_DECIMAL => {
                    BigDecimal::from_str(&text)
                        .map(Value::Decimal)
                        .map_err(|e| decode_err(e.to_string()))?
                }
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_YEAR => text
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|e| decode_err(e.to_string()))?,
                ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => text
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|e| decode_err(e.to_string()))?,
                _ => Value::String(text.into_owned()),
            }
        }
        MySqlValue::Date(year, month, day, hour, minute, second, micros) => {
            let mut text =
                format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}");
            if *micros > 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            Value::String(text)
        }
        MySqlValue::Time(negative, days, hours, minutes, seconds, _) => {
            let sign = if *negative { "-" } else { "" };
            let hours = *days as u64 * 24 + *hours as u64;
            Value::String(format!("{sign}{hours:02}:{minutes:02}:{seconds:02}"))
        }
    };

    Ok(value)
}
