use model::core::value::Value;
use mysql_async::Value as MySqlValue;
use mysql_common::params::Params;

/// Decimals travel as text so no precision is lost on the way in.
fn to_mysql(value: &Value) -> MySqlValue {
    match value {
        Value::Int(i) => MySqlValue::Int(*i),
        Value::Float(f) => MySqlValue::Double(*f),
        Value::Decimal(d) => MySqlValue::Bytes(d.to_string().into_bytes()),
        Value::String(s) => MySqlValue::Bytes(s.as_bytes().to_vec()),
        Value::Boolean(b) => MySqlValue::Int(i64::from(*b)),
        Value::Null => MySqlValue::NULL,
    }
}

/// Positional parameters for the `?` placeholders of a rendered statement.
pub fn positional(values: &[Value]) -> Params {
    if values.is_empty() {
        return Params::Empty;
    }
    Params::Positional(values.iter().map(to_mysql).collect())
}
