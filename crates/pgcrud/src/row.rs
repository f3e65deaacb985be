//! Row mapping traits and utilities

use crate::error::{CrudError, CrudResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::error::Error;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Kind, Type};

type BoxError = Box<dyn Error + Sync + Send>;

/// Trait for converting a database row into a Rust struct.
pub trait FromRow: Sized {
    /// Convert a database row into Self
    fn from_row(row: &Row) -> CrudResult<Self>;
}

/// Extension trait for Row to provide typed and JSON access
pub trait RowExt {
    /// Try to get a column value, returning CrudError::Decode on failure
    fn try_get_column<T>(&self, column: &str) -> CrudResult<T>
    where
        T: for<'a> FromSql<'a>;

    /// Convert the row into a JSON object keyed by column name.
    fn to_json(&self) -> CrudResult<Map<String, Value>>;
}

impl RowExt for Row {
    fn try_get_column<T>(&self, column: &str) -> CrudResult<T>
    where
        T: for<'a> FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| CrudError::decode(column, e.to_string()))
    }

    fn to_json(&self) -> CrudResult<Map<String, Value>> {
        let mut out = Map::with_capacity(self.len());
        for (idx, column) in self.columns().iter().enumerate() {
            let cell: JsonCell = self
                .try_get(idx)
                .map_err(|e| CrudError::decode(column.name(), e.to_string()))?;
            out.insert(column.name().to_string(), cell.0);
        }
        Ok(out)
    }
}

/// Convert rows into JSON objects.
pub fn rows_to_json(rows: &[Row]) -> CrudResult<Vec<Value>> {
    rows.iter()
        .map(|row| row.to_json().map(Value::Object))
        .collect()
}

/// A column value decoded into its JSON form.
///
/// Timestamps become ISO-8601 strings, numerics become numbers, `json`/`jsonb`
/// are embedded as-is, arrays become JSON arrays and anything else with a text
/// representation (enums, citext, ...) becomes a string.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonCell(pub Value);

fn decimal_to_json(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Ok(i) = i64::try_from(d) {
            return Value::from(i);
        }
    }
    match f64::try_from(d) {
        Ok(f) => Value::from(f),
        Err(_) => Value::String(d.to_string()),
    }
}

fn text_or_hex(raw: &[u8]) -> Value {
    match std::str::from_utf8(raw) {
        Ok(s) => Value::String(s.to_string()),
        Err(_) => Value::String(format!("\\x{}", hex::encode(raw))),
    }
}

impl<'a> FromSql<'a> for JsonCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::from(i16::from_sql(ty, raw)?),
            Type::INT4 => Value::from(i32::from_sql(ty, raw)?),
            Type::INT8 => Value::from(i64::from_sql(ty, raw)?),
            Type::OID => Value::from(u32::from_sql(ty, raw)?),
            Type::FLOAT4 => Value::from(f64::from(f32::from_sql(ty, raw)?)),
            Type::FLOAT8 => Value::from(f64::from_sql(ty, raw)?),
            Type::NUMERIC => decimal_to_json(Decimal::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => Value::from_sql(ty, raw)?,
            Type::UUID => Value::String(uuid::Uuid::from_sql(ty, raw)?.to_string()),
            Type::DATE => Value::String(NaiveDate::from_sql(ty, raw)?.to_string()),
            Type::TIME => Value::String(NaiveTime::from_sql(ty, raw)?.format("%H:%M:%S%.f").to_string()),
            Type::TIMESTAMP => Value::String(
                NaiveDateTime::from_sql(ty, raw)?
                    .format("%Y-%m-%dT%H:%M:%S%.f")
                    .to_string(),
            ),
            Type::TIMESTAMPTZ => Value::String(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339()),
            Type::BYTEA => Value::String(format!("\\x{}", hex::encode(raw))),
            _ => match ty.kind() {
                Kind::Array(_) => Value::Array(
                    Vec::<JsonCell>::from_sql(ty, raw)?
                        .into_iter()
                        .map(|c| c.0)
                        .collect(),
                ),
                _ => text_or_hex(raw),
            },
        };
        Ok(JsonCell(value))
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(JsonCell(Value::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}
