//! JSON filter grammar.
//!
//! A filter is an object mapping column names to one of:
//!
//! ```json
//! {
//!   "status": "active",                 // column = $n
//!   "deleted_at": null,                 // column IS NULL
//!   "role": ["admin", "owner"],         // column IN ($n, ...)
//!   "age": {"gte": 18, "lt": 65},       // column >= $n AND column < $m
//!   "name": {"$ilike": "%jane%"}        // `$`-prefixed operator keys are accepted
//! }
//! ```
//!
//! Entries compile in the object's insertion order, which fixes placeholder order.
//! Parsing happens up front, so unknown operators never reach SQL emission.

use crate::compile::builder::SqlBuilder;
use crate::error::{CompileError, CompileResult};
use crate::ident::Ident;
use crate::value::SqlValue;
use serde_json::{Map, Value};
use std::fmt;

/// Raw filter object as it arrives in a request.
pub type Filters = Map<String, Value>;

/// Comparison operators allowed inside an operator object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
    Like,
    Ilike,
}

impl Operator {
    /// Parse an operator key (`gt`, `$gt`, ...).
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.strip_prefix('$').unwrap_or(key);
        match key {
            "gt" => Some(Operator::Gt),
            "gte" => Some(Operator::Gte),
            "lt" => Some(Operator::Lt),
            "lte" => Some(Operator::Lte),
            "ne" => Some(Operator::Ne),
            "like" => Some(Operator::Like),
            "ilike" => Some(Operator::Ilike),
            _ => None,
        }
    }

    /// SQL spelling of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Ne => "<>",
            Operator::Like => "LIKE",
            Operator::Ilike => "ILIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// The condition attached to one column.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// `column IS NULL`
    Null,
    /// `column = $n`
    Scalar(SqlValue),
    /// `column IN (...)`; empty matches nothing.
    Set(Vec<SqlValue>),
    /// `column OP $n AND ...`
    Operators(Vec<(Operator, SqlValue)>),
}

impl FilterValue {
    fn parse(column: &str, value: &Value) -> CompileResult<Self> {
        match value {
            Value::Null => Ok(FilterValue::Null),
            Value::Array(items) => items
                .iter()
                .map(|item| scalar_operand(column, item))
                .collect::<CompileResult<Vec<_>>>()
                .map(FilterValue::Set),
            Value::Object(ops) => {
                if ops.is_empty() {
                    return Err(CompileError::InvalidFilterValue {
                        column: column.to_string(),
                        message: "empty operator object".to_string(),
                    });
                }
                let mut parsed = Vec::with_capacity(ops.len());
                for (key, operand) in ops {
                    let op = Operator::parse(key).ok_or_else(|| CompileError::InvalidOperator {
                        column: column.to_string(),
                        operator: key.clone(),
                    })?;
                    parsed.push((op, scalar_operand(column, operand)?));
                }
                Ok(FilterValue::Operators(parsed))
            }
            scalar => Ok(FilterValue::Scalar(SqlValue::from_json(scalar.clone()))),
        }
    }
}

fn scalar_operand(column: &str, value: &Value) -> CompileResult<SqlValue> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(CompileError::InvalidFilterValue {
            column: column.to_string(),
            message: "operands must be scalars".to_string(),
        }),
        Value::Null => Err(CompileError::InvalidFilterValue {
            column: column.to_string(),
            message: "null operand (use a plain null for IS NULL)".to_string(),
        }),
        v => Ok(SqlValue::from_json(v.clone())),
    }
}

/// A parsed filter: validated columns with their conditions, in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpression {
    entries: Vec<(Ident, FilterValue)>,
}

impl FilterExpression {
    /// Create an empty filter (matches every row).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON filter object.
    pub fn parse(filters: &Filters) -> CompileResult<Self> {
        let mut entries = Vec::with_capacity(filters.len());
        for (column, value) in filters {
            let ident = Ident::parse(column, column)?;
            entries.push((ident, FilterValue::parse(column, value)?));
        }
        Ok(Self { entries })
    }

    /// Add a condition on a column.
    pub fn with(mut self, column: &str, value: FilterValue) -> CompileResult<Self> {
        self.entries.push((Ident::parse(column, column)?, value));
        Ok(self)
    }

    /// Add an equality condition on a column.
    pub fn eq(self, column: &str, value: impl Into<SqlValue>) -> CompileResult<Self> {
        self.with(column, FilterValue::Scalar(value.into()))
    }

    /// Check if the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of filtered columns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append ` WHERE ...` (nothing when empty).
    pub(crate) fn write_where(&self, b: &mut SqlBuilder) {
        if self.entries.is_empty() {
            return;
        }
        b.push(" WHERE ");
        self.write_conditions(b);
    }

    /// Append the AND-joined conditions without the `WHERE` keyword.
    pub(crate) fn write_conditions(&self, b: &mut SqlBuilder) {
        let mut first = true;
        let mut sep = |b: &mut SqlBuilder| {
            if !first {
                b.push(" AND ");
            }
            first = false;
        };

        for (column, value) in &self.entries {
            match value {
                FilterValue::Null => {
                    sep(b);
                    b.push_ident(column).push(" IS NULL");
                }
                FilterValue::Scalar(v) => {
                    sep(b);
                    b.push_ident(column).push(" = ").push_bind(v.clone());
                }
                FilterValue::Set(values) if values.is_empty() => {
                    sep(b);
                    b.push("1=0");
                }
                FilterValue::Set(values) => {
                    sep(b);
                    b.push_ident(column)
                        .push(" IN (")
                        .push_bind_list(values.iter().cloned())
                        .push(")");
                }
                FilterValue::Operators(ops) => {
                    for (op, v) in ops {
                        sep(b);
                        b.push_ident(column)
                            .push(" ")
                            .push(op.as_sql())
                            .push(" ")
                            .push_bind(v.clone());
                    }
                }
            }
        }
    }
}
