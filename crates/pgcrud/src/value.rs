//! Bound parameter values.
//!
//! Requests arrive as JSON, so a value's Rust type says little about the column
//! it lands in (`28` may target `int2`, `numeric` or `text`). [`SqlValue`] keeps
//! the JSON shape and picks the binary encoding from the parameter type Postgres
//! inferred for the placeholder.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::error::Error;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

/// A single bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Object or array payload; bound as JSON text or json/jsonb.
    Json(Value),
}

impl SqlValue {
    /// Convert a JSON value into a bound parameter.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else if n.is_u64() {
                    // Above i64::MAX: keep the exact digits, let the target parse them.
                    SqlValue::Text(n.to_string())
                } else if let Some(f) = n.as_f64() {
                    SqlValue::Float(f)
                } else {
                    SqlValue::Text(n.to_string())
                }
            }
            Value::String(s) => SqlValue::Text(s),
            v @ (Value::Array(_) | Value::Object(_)) => SqlValue::Json(v),
        }
    }

    /// Whether this is a SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Text form used when the value lands in a text column or serves as a salt.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(b.to_string()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::Float(f) => Some(f.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Json(v) => Some(v.to_string()),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(i) => Value::from(*i),
            SqlValue::Float(f) => Value::from(*f),
            SqlValue::Text(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
            SqlValue::Json(v) => v.clone(),
        }
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        SqlValue::from_json(value)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Int(i)
    }
}

impl From<i32> for SqlValue {
    fn from(i: i32) -> Self {
        SqlValue::Int(i64::from(i))
    }
}

impl From<f64> for SqlValue {
    fn from(f: f64) -> Self {
        SqlValue::Float(f)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

/// Enums travel as their label text in the binary protocol too.
fn is_text_like(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    ) || ty.name() == "citext"
        || matches!(ty.kind(), Kind::Enum(_))
}

fn mismatch(value: &SqlValue, ty: &Type) -> BoxError {
    format!("cannot bind {value:?} to a parameter of type {ty}").into()
}

fn encode_int(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT8 => i.to_sql(ty, out),
        Type::OID => u32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        _ => Err(mismatch(&SqlValue::Int(i), ty)),
    }
}

fn encode_float(f: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::FLOAT8 => f.to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(f)?.to_sql(ty, out),
        // `i64::MAX as f64` rounds up to 2^63, hence the strict upper bound.
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
        {
            encode_int(f as i64, ty, out)
        }
        _ => Err(mismatch(&SqlValue::Float(f), ty)),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let value = || SqlValue::Text(s.to_string());
    match *ty {
        Type::BOOL => parse_bool(s)
            .ok_or_else(|| mismatch(&value(), ty))?
            .to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => {
            encode_int(s.trim().parse::<i64>()?, ty, out)
        }
        Type::FLOAT4 | Type::FLOAT8 => encode_float(s.trim().parse::<f64>()?, ty, out),
        Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s.trim())?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME => ["%H:%M:%S%.f", "%H:%M"]
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(s.trim(), fmt).ok())
            .ok_or_else(|| mismatch(&value(), ty))?
            .to_sql(ty, out),
        Type::TIMESTAMP => parse_naive_datetime(s.trim())
            .ok_or_else(|| mismatch(&value(), ty))?
            .to_sql(ty, out),
        Type::TIMESTAMPTZ => {
            let ts = match DateTime::parse_from_rfc3339(s.trim()) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(_) => parse_naive_datetime(s.trim())
                    .ok_or_else(|| mismatch(&value(), ty))?
                    .and_utc(),
            };
            ts.to_sql(ty, out)
        }
        _ => Err(mismatch(&value(), ty)),
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }
        if let Kind::Domain(base) = ty.kind() {
            return self.to_sql(base, out);
        }
        if is_text_like(ty) {
            let text = self.to_text().unwrap_or_default();
            return text.as_str().to_sql(&Type::TEXT, out);
        }
        if matches!(*ty, Type::JSON | Type::JSONB) {
            return self.to_json().to_sql(ty, out);
        }

        match self {
            SqlValue::Bool(b) if *ty == Type::BOOL => b.to_sql(ty, out),
            SqlValue::Int(i) => encode_int(*i, ty, out),
            SqlValue::Float(f) => encode_float(*f, ty, out),
            SqlValue::Text(s) => encode_text(s, ty, out),
            other => Err(mismatch(other, ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(value: SqlValue, ty: Type) -> Result<(IsNull, BytesMut), BoxError> {
        let mut out = BytesMut::new();
        let is_null = value.to_sql(&ty, &mut out)?;
        Ok((is_null, out))
    }

    #[test]
    fn from_json_shapes() {
        assert_eq!(SqlValue::from_json(json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from_json(json!(28)), SqlValue::Int(28));
        assert_eq!(SqlValue::from_json(json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(SqlValue::from_json(json!("Jane")), SqlValue::Text("Jane".into()));
        assert_eq!(
            SqlValue::from_json(json!({"a": [1, 2]})),
            SqlValue::Json(json!({"a": [1, 2]}))
        );
    }

    #[test]
    fn int_follows_target_width() {
        let (_, out) = encode(SqlValue::Int(28), Type::INT4).unwrap();
        assert_eq!(&out[..], &28i32.to_be_bytes());

        let (_, out) = encode(SqlValue::Int(28), Type::INT8).unwrap();
        assert_eq!(&out[..], &28i64.to_be_bytes());

        assert!(encode(SqlValue::Int(70_000), Type::INT2).is_err());
    }

    #[test]
    fn text_target_takes_any_scalar() {
        let (_, out) = encode(SqlValue::Int(7), Type::TEXT).unwrap();
        assert_eq!(&out[..], b"7");

        let (_, out) = encode(SqlValue::Json(json!({"k": 1})), Type::VARCHAR).unwrap();
        assert_eq!(&out[..], br#"{"k":1}"#);
    }

    #[test]
    fn text_parses_into_typed_targets() {
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let (_, out) = encode(SqlValue::from(id), Type::UUID).unwrap();
        assert_eq!(out.len(), 16);

        assert!(encode(SqlValue::from("2024-02-29"), Type::DATE).is_ok());
        assert!(encode(SqlValue::from("2024-02-29T10:00:00Z"), Type::TIMESTAMPTZ).is_ok());
        assert!(encode(SqlValue::from("2024-02-29 10:00:00"), Type::TIMESTAMP).is_ok());
        assert!(encode(SqlValue::from("12.50"), Type::NUMERIC).is_ok());
        assert!(encode(SqlValue::from("not-a-date"), Type::DATE).is_err());
    }

    #[test]
    fn enum_and_domain_targets_take_text() {
        let mood = Type::new(
            "mood".into(),
            90_000,
            Kind::Enum(vec!["active".into(), "idle".into()]),
            "public".into(),
        );
        let (_, out) = encode(SqlValue::from("active"), mood).unwrap();
        assert_eq!(&out[..], b"active");

        let email = Type::new("email".into(), 90_001, Kind::Domain(Type::TEXT), "public".into());
        let (_, out) = encode(SqlValue::from("a@x.com"), email).unwrap();
        assert_eq!(&out[..], b"a@x.com");

        let positive = Type::new("positive".into(), 90_002, Kind::Domain(Type::INT4), "public".into());
        let (_, out) = encode(SqlValue::Int(5), positive).unwrap();
        assert_eq!(&out[..], &5i32.to_be_bytes());
    }

    #[test]
    fn integers_above_i64_are_never_saturated() {
        let big = SqlValue::from_json(json!(u64::MAX));
        assert_eq!(big, SqlValue::Text("18446744073709551615".into()));
        assert!(encode(big.clone(), Type::INT8).is_err());

        let (_, out) = encode(big.clone(), Type::TEXT).unwrap();
        assert_eq!(&out[..], b"18446744073709551615");

        let mut expected = BytesMut::new();
        "18446744073709551615"
            .parse::<Decimal>()
            .unwrap()
            .to_sql(&Type::NUMERIC, &mut expected)
            .unwrap();
        let (_, out) = encode(big, Type::NUMERIC).unwrap();
        assert_eq!(out, expected);

        assert!(encode(SqlValue::Float(1.8446744073709552e19), Type::INT8).is_err());
        assert!(encode(SqlValue::Float(9.223372036854775807e18), Type::INT8).is_err());
        let (_, out) = encode(SqlValue::Float(42.0), Type::INT8).unwrap();
        assert_eq!(&out[..], &42i64.to_be_bytes());
    }

    #[test]
    fn null_binds_as_null() {
        let (is_null, out) = encode(SqlValue::Null, Type::INT4).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn json_targets_get_jsonb_encoding() {
        let (_, out) = encode(SqlValue::Json(json!([1, 2])), Type::JSONB).unwrap();
        // jsonb binary format: version byte then the text.
        assert_eq!(out[0], 1);
        assert_eq!(&out[1..], b"[1,2]");
    }
}
