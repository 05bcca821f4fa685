use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, str::FromStr};

/// A single scalar cell read from (or written to) a tabular source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    String(String),
    Boolean(bool),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Exact numeric view of the value. Strings are parsed, floats are
    /// converted through their shortest decimal representation.
    pub fn as_decimal(&self) -> Option<BigDecimal> {
        match self {
            Value::Int(v) => Some(BigDecimal::from(*v)),
            Value::Float(v) => BigDecimal::from_f64(*v),
            Value::Decimal(v) => Some(v.clone()),
            Value::String(v) => BigDecimal::from_str(v.trim()).ok(),
            Value::Boolean(v) => Some(BigDecimal::from(*v as i64)),
            Value::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Decimal(v) => v.to_f64(),
            Value::String(v) => v.trim().parse::<f64>().ok(),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) => Some(*v as i64),
            Value::Decimal(v) => v.to_i64(),
            Value::String(v) => v.trim().parse::<i64>().ok(),
            Value::Boolean(v) => Some(*v as i64),
            Value::Null => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Decimal(v) => Some(v.normalized().to_string()),
            Value::String(v) => Some(v.clone()),
            Value::Boolean(v) => Some(v.to_string()),
            Value::Null => None,
        }
    }

    /// Orders two values when they are comparable. Numeric kinds compare
    /// across representations, so `Int(30)` equals `Decimal(30)`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Null, _) | (_, Null) => None,
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Float(_), _) | (_, Float(_)) => self.as_f64()?.partial_cmp(&other.as_f64()?),
            _ => Some(self.as_decimal()?.cmp(&other.as_decimal()?)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Value::from(*v),
            Value::Decimal(v) => v
                .to_i64()
                .filter(|_| v.is_integer())
                .map(serde_json::Value::from)
                .or_else(|| v.to_f64().map(serde_json::Value::from))
                .unwrap_or(serde_json::Value::Null),
            Value::String(v) => serde_json::Value::String(v.clone()),
            Value::Boolean(v) => serde_json::Value::Bool(*v),
            Value::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{}", v.normalized()),
            Value::String(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<BigDecimal> for Value {
    fn from(v: BigDecimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_compare_across_kinds() {
        let int = Value::Int(30);
        let dec = Value::Decimal(BigDecimal::from(30));
        let float = Value::Float(29.5);

        assert_eq!(int.compare(&dec), Some(Ordering::Equal));
        assert_eq!(float.compare(&int), Some(Ordering::Less));
        assert_eq!(Value::from("31").compare(&int), Some(Ordering::Greater));
        assert_eq!(Value::Null.compare(&int), None);
    }

    #[test]
    fn test_as_decimal() {
        assert_eq!(
            Value::from("42").as_decimal(),
            Some(BigDecimal::from(42))
        );
        assert_eq!(Value::from("forty-two").as_decimal(), None);
        assert_eq!(Value::Null.as_decimal(), None);
    }

    #[test]
    fn test_decimal_to_json_keeps_integers_integral() {
        let age = Value::Decimal(BigDecimal::from(28));
        assert_eq!(age.to_json(), serde_json::json!(28));

        let ratio = Value::Decimal(BigDecimal::from_str("1.5").unwrap());
        assert_eq!(ratio.to_json(), serde_json::json!(1.5));
    }

    #[test]
    fn test_display_escapes_strings() {
        assert_eq!(Value::from("O'Hara").to_string(), "'O''Hara'");
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
