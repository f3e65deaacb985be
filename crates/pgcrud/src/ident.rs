//! Safe SQL identifier handling.
//!
//! Identifiers cannot be bound as parameters, so every schema, table and column
//! name that reaches SQL text goes through [`Ident::parse`] first.
//!
//! - Each part must match `[A-Za-z_][A-Za-z0-9_]*`
//! - At most two parts separated by a single `.` (`table.column`, `schema.table`)
//! - Rendered double-quoted: `"public"."users"`
//!
//! # Example
//! ```ignore
//! use pgcrud::Ident;
//!
//! let t = Ident::parse("table", "users")?;
//! assert_eq!(t.to_sql(), r#""users""#);
//! # Ok::<(), pgcrud::CompileError>(())
//! ```

use crate::error::{CompileError, CompileResult};

const MAX_PARTS: usize = 2;

/// A validated SQL identifier (column, table, or schema name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    parts: Vec<String>,
}

impl Ident {
    /// Parse and validate an identifier.
    ///
    /// `field` names the request field the identifier came from and is reported
    /// back in [`CompileError::InvalidIdentifier`].
    pub fn parse(field: &str, s: &str) -> CompileResult<Self> {
        let invalid = || CompileError::invalid_identifier(field, s);

        if s.is_empty() {
            return Err(invalid());
        }

        let mut parts = Vec::with_capacity(MAX_PARTS);
        for seg in s.split('.') {
            if !is_valid_part(seg) {
                return Err(invalid());
            }
            parts.push(seg.to_string());
        }
        if parts.len() > MAX_PARTS {
            return Err(invalid());
        }

        Ok(Self { parts })
    }

    /// Build `schema.name`, unless `name` is already qualified.
    pub fn qualified(field: &str, schema: &Ident, name: &str) -> CompileResult<Self> {
        let name = Ident::parse(field, name)?;
        if name.parts.len() > 1 {
            return Ok(name);
        }
        if schema.parts.len() + name.parts.len() > MAX_PARTS {
            return Err(CompileError::invalid_identifier(
                field,
                format!("{schema}.{name}"),
            ));
        }
        let mut parts = schema.parts.clone();
        parts.extend(name.parts);
        Ok(Self { parts })
    }

    /// Whether the identifier is a single unqualified part.
    pub fn is_simple(&self) -> bool {
        self.parts.len() == 1
    }

    /// Last part of the identifier (the column or table name).
    pub fn name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Render the identifier as quoted SQL.
    pub fn to_sql(&self) -> String {
        let cap = self.parts.iter().map(|p| p.len() + 3).sum();
        let mut out = String::with_capacity(cap);
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            // Allow-listed parts never contain `"`, so no escaping is needed.
            out.push('"');
            out.push_str(part);
            out.push('"');
        }
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.parts.join("."))
    }
}

/// Parts are always emitted quoted, so a leading digit is allowed.
fn is_valid_part(seg: &str) -> bool {
    !seg.is_empty() && seg.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// One entry of a SELECT list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectItem {
    /// `*`
    All,
    /// `"table".*`
    AllOf(Ident),
    /// `"col"` or `"col" AS "alias"`
    Column { column: Ident, alias: Option<Ident> },
}

impl SelectItem {
    /// Parse a select entry: `*`, `table.*`, `column` or `column AS alias`.
    pub fn parse(field: &str, s: &str) -> CompileResult<Self> {
        let trimmed = s.trim();
        if trimmed == "*" {
            return Ok(SelectItem::All);
        }
        if let Some(table) = trimmed.strip_suffix(".*") {
            let table = Ident::parse(field, table)?;
            if !table.is_simple() {
                return Err(CompileError::invalid_identifier(field, s));
            }
            return Ok(SelectItem::AllOf(table));
        }

        let words: Vec<&str> = trimmed.split_whitespace().collect();
        match words.as_slice() {
            [column] => Ok(SelectItem::Column {
                column: Ident::parse(field, column)?,
                alias: None,
            }),
            [column, kw, alias] if kw.eq_ignore_ascii_case("as") => {
                let alias = Ident::parse(field, alias)?;
                if !alias.is_simple() {
                    return Err(CompileError::invalid_identifier(field, s));
                }
                Ok(SelectItem::Column {
                    column: Ident::parse(field, column)?,
                    alias: Some(alias),
                })
            }
            _ => Err(CompileError::invalid_identifier(field, s)),
        }
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        match self {
            SelectItem::All => out.push('*'),
            SelectItem::AllOf(table) => {
                table.write_sql(out);
                out.push_str(".*");
            }
            SelectItem::Column { column, alias } => {
                column.write_sql(out);
                if let Some(alias) = alias {
                    out.push_str(" AS ");
                    alias.write_sql(out);
                }
            }
        }
    }
}
