//! Placeholder-numbering SQL accumulator shared by the compilers.

use crate::ident::{Ident, SelectItem};
use crate::statement::{CompiledStatement, StatementKind};
use crate::value::SqlValue;
use std::fmt::Write;

/// Stores SQL text and bound values side by side, emitting `$1, $2, ...` in the
/// order values are pushed.
#[derive(Debug, Default)]
pub(crate) struct SqlBuilder {
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlBuilder {
    pub(crate) fn new(initial_sql: &str) -> Self {
        Self {
            sql: initial_sql.to_string(),
            params: Vec::new(),
        }
    }

    /// Append raw SQL (no parameters).
    pub(crate) fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a validated identifier.
    pub(crate) fn push_ident(&mut self, ident: &Ident) -> &mut Self {
        ident.write_sql(&mut self.sql);
        self
    }

    /// Append one SELECT list entry.
    pub(crate) fn push_select_item(&mut self, item: &SelectItem) -> &mut Self {
        item.write_sql(&mut self.sql);
        self
    }

    /// Append a placeholder and bind its value.
    pub(crate) fn push_bind(&mut self, value: SqlValue) -> &mut Self {
        self.params.push(value);
        let _ = write!(&mut self.sql, "${}", self.params.len());
        self
    }

    /// Append a comma-separated list of placeholders and bind all values.
    pub(crate) fn push_bind_list(&mut self, values: impl IntoIterator<Item = SqlValue>) -> &mut Self {
        for (i, v) in values.into_iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push_bind(v);
        }
        self
    }

    /// Append an integer literal (LIMIT/OFFSET).
    pub(crate) fn push_u64(&mut self, n: u64) -> &mut Self {
        let _ = write!(&mut self.sql, "{n}");
        self
    }

    pub(crate) fn param_count(&self) -> usize {
        self.params.len()
    }

    pub(crate) fn finish(self, kind: StatementKind) -> CompiledStatement {
        CompiledStatement::new(kind, self.sql, self.params)
    }
}
