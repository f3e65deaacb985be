//! Compiled statements: SQL text plus the ordered values bound to `$1..$n`.

use crate::value::SqlValue;
use std::fmt;
use tokio_postgres::types::ToSql;

/// The operation a statement was compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Read,
    JoinRead,
    Create,
    Update,
    Delete,
    Raw,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Read => "read",
            StatementKind::JoinRead => "join-read",
            StatementKind::Create => "create",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Raw => "raw",
        }
    }

    /// Whether the statement modifies data.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            StatementKind::Create | StatementKind::Update | StatementKind::Delete
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL text with positional placeholders and the values bound to them.
///
/// Built once per request and consumed once by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub kind: StatementKind,
    /// Set for UPDATE/DELETE compiled without any filter.
    pub affects_all_rows: bool,
    /// Schema to set as `search_path` before running (raw queries).
    pub search_path: Option<String>,
}

impl CompiledStatement {
    pub(crate) fn new(kind: StatementKind, sql: String, params: Vec<SqlValue>) -> Self {
        Self {
            sql,
            params,
            kind,
            affects_all_rows: false,
            search_path: None,
        }
    }

    /// Whether this is an UPDATE or DELETE with no WHERE clause.
    pub fn is_unfiltered_mutation(&self) -> bool {
        self.affects_all_rows
    }

    /// Parameter refs compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect()
    }

    /// Number of `$n` placeholders in the SQL text.
    pub fn placeholder_count(&self) -> usize {
        count_placeholders(&self.sql)
    }
}

/// Highest `$n` placeholder outside quoted text and comments.
pub(crate) fn count_placeholders(sql: &str) -> usize {
    scan_placeholders(sql).1
}

#[derive(PartialEq)]
enum LexState {
    Code,
    Literal,
    Ident,
    LineComment,
    BlockComment,
}

/// Rewrite `?` / `%s` to `$n` and report the highest placeholder index.
///
/// Quoted literals, quoted identifiers and comments are copied untouched and
/// never counted. `$n` already present in the code counts as placeholder `n`.
pub(crate) fn scan_placeholders(sql: &str) -> (String, usize) {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut next = 0usize;
    let mut max = 0usize;
    let mut chars = sql.chars().peekable();
    let mut state = LexState::Code;

    while let Some(ch) = chars.next() {
        match state {
            LexState::Code => match ch {
                '\'' => {
                    state = LexState::Literal;
                    out.push(ch);
                }
                '"' => {
                    state = LexState::Ident;
                    out.push(ch);
                }
                '-' if chars.peek() == Some(&'-') => {
                    state = LexState::LineComment;
                    out.push(ch);
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = LexState::BlockComment;
                    out.push(ch);
                }
                '?' => {
                    next += 1;
                    max = max.max(next);
                    out.push('$');
                    out.push_str(&next.to_string());
                }
                '%' if chars.peek() == Some(&'s') => {
                    chars.next();
                    next += 1;
                    max = max.max(next);
                    out.push('$');
                    out.push_str(&next.to_string());
                }
                '$' => {
                    out.push(ch);
                    let mut digits = String::new();
                    while let Some(&d) = chars.peek() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        digits.push(d);
                        chars.next();
                    }
                    out.push_str(&digits);
                    if let Ok(idx) = digits.parse::<usize>() {
                        max = max.max(idx);
                    }
                }
                _ => out.push(ch),
            },
            LexState::Literal => {
                out.push(ch);
                if ch == '\'' {
                    state = LexState::Code;
                }
            }
            LexState::Ident => {
                out.push(ch);
                if ch == '"' {
                    state = LexState::Code;
                }
            }
            LexState::LineComment => {
                out.push(ch);
                if ch == '\n' {
                    state = LexState::Code;
                }
            }
            LexState::BlockComment => {
                out.push(ch);
                if ch == '*' && chars.peek() == Some(&'/') {
                    if let Some(slash) = chars.next() {
                        out.push(slash);
                    }
                    state = LexState::Code;
                }
            }
        }
    }
    (out, max)
}
