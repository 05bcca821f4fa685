use bigdecimal::{BigDecimal, ToPrimitive};
use bytes::BytesMut;
use model::core::value::Value;
use rust_decimal::{Decimal as RustDecimal, prelude::FromPrimitive};
use std::{error::Error, str::FromStr};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

/// A bound parameter that adapts itself to the column type the server
/// inferred for its placeholder, so `25` can be compared against an
/// `INT4`, a `NUMERIC` or a `BIGINT` column alike.
#[derive(Debug, Clone)]
pub struct PgParam(Value);

impl PgParam {
    pub fn from_value(value: Value) -> Self {
        PgParam(value)
    }
}

fn to_rust_decimal(value: &BigDecimal) -> Option<RustDecimal> {
    RustDecimal::from_str(&value.to_string())
        .ok()
        .or_else(|| value.to_f64().and_then(RustDecimal::from_f64))
}

fn is_text(ty: &Type) -> bool {
    *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
}

impl ToSql for PgParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match &self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Int(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*v as f64).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    RustDecimal::from(*v).to_sql(ty, out)
                } else if is_text(ty) {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    RustDecimal::from_f64(*v)
                        .ok_or_else(|| format!("{v} does not fit NUMERIC"))?
                        .to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Decimal(v) => {
                if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 {
                    let int = v
                        .to_i64()
                        .ok_or_else(|| format!("{v} is not an integer"))?;
                    PgParam(Value::Int(int)).to_sql(ty, out)
                } else if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
                    let float = v.to_f64().ok_or_else(|| format!("{v} is not a float"))?;
                    PgParam(Value::Float(float)).to_sql(ty, out)
                } else if is_text(ty) {
                    v.to_string().to_sql(ty, out)
                } else {
                    to_rust_decimal(v)
                        .ok_or_else(|| format!("{v} does not fit NUMERIC"))?
                        .to_sql(ty, out)
                }
            }
            Value::String(v) => v.to_sql(ty, out),
            Value::Boolean(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

pub struct PgParamStore {
    pub params: Vec<PgParam>,
}

impl PgParamStore {
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            params: values.into_iter().map(PgParam::from_value).collect(),
        }
    }

    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|param| param as &(dyn ToSql + Sync))
            .collect::<Vec<_>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_narrows_to_int4() {
        let mut out = BytesMut::new();
        let param = PgParam::from_value(Value::Int(25));
        let result = param.to_sql(&Type::INT4, &mut out).unwrap();
        assert!(matches!(result, IsNull::No));
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_int_overflowing_int2_fails() {
        let mut out = BytesMut::new();
        let param = PgParam::from_value(Value::Int(100_000));
        assert!(param.to_sql(&Type::INT2, &mut out).is_err());
    }

    #[test]
    fn test_null_is_null() {
        let mut out = BytesMut::new();
        let param = PgParam::from_value(Value::Null);
        assert!(matches!(
            param.to_sql(&Type::TEXT, &mut out).unwrap(),
            IsNull::Yes
        ));
    }
}
