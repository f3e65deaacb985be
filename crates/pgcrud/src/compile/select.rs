use super::builder::SqlBuilder;
use super::{MAX_LIMIT, column_ident, table_ident};
use crate::error::{CompileError, CompileResult};
use crate::filter::FilterExpression;
use crate::ident::{Ident, SelectItem};
use crate::spec::{JoinSpec, QuerySpec, VerifyPasswordSpec};
use crate::statement::{CompiledStatement, StatementKind};
use crate::value::SqlValue;

/// Compile a read request.
///
/// `columns` is the table's resolved column list, required only when the
/// request uses `exclude_fields`. Requests carrying joins compile as join-reads.
pub fn read(spec: &QuerySpec, columns: Option<&[String]>) -> CompileResult<CompiledStatement> {
    let kind = if spec.joins.is_empty() {
        StatementKind::Read
    } else {
        StatementKind::JoinRead
    };
    build_select(spec, columns, kind)
}

/// Compile a join-read request.
pub fn join_read(spec: &QuerySpec, columns: Option<&[String]>) -> CompileResult<CompiledStatement> {
    build_select(spec, columns, StatementKind::JoinRead)
}

/// Fetch the stored digest and salt for one identifier.
///
/// `SELECT "password", "salt" FROM t WHERE "identifier" = $1 LIMIT 1`
pub fn verify_lookup(spec: &VerifyPasswordSpec) -> CompileResult<CompiledStatement> {
    let table = table_ident(&spec.schema, &spec.table)?;
    let password = column_ident("password_field", &spec.password_field)?;
    let salt = column_ident("salt_field", spec.salt_field())?;
    let identifier = column_ident("identifier_field", &spec.identifier_field)?;

    let mut b = SqlBuilder::new("SELECT ");
    b.push_ident(&password)
        .push(", ")
        .push_ident(&salt)
        .push(" FROM ")
        .push_ident(&table)
        .push(" WHERE ")
        .push_ident(&identifier)
        .push(" = ")
        .push_bind(SqlValue::Text(spec.identifier_value.clone()))
        .push(" LIMIT 1");
    Ok(b.finish(StatementKind::Read))
}

fn build_select(
    spec: &QuerySpec,
    columns: Option<&[String]>,
    kind: StatementKind,
) -> CompileResult<CompiledStatement> {
    let table = table_ident(&spec.schema, &spec.table)?;
    let filter = FilterExpression::parse(&spec.filters)?;
    let select = select_list(spec, columns)?;
    let joins = spec
        .joins
        .iter()
        .map(|j| CompiledJoin::parse(&spec.schema, j))
        .collect::<CompileResult<Vec<_>>>()?;

    if let Some(limit) = spec.limit {
        if limit == 0 || limit > MAX_LIMIT {
            return Err(CompileError::InvalidPagination {
                field: "limit".to_string(),
                message: format!("must be between 1 and {MAX_LIMIT}, got {limit}"),
            });
        }
    }
    let sort_by = spec
        .sort_by
        .as_deref()
        .map(|s| Ident::parse("sort_by", s))
        .transpose()?;

    let mut b = SqlBuilder::new("SELECT ");
    for (i, item) in select.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push_select_item(item);
    }
    b.push(" FROM ").push_ident(&table);

    for join in &joins {
        b.push(" ")
            .push(join.keyword)
            .push(" ")
            .push_ident(&join.table)
            .push(" ON ")
            .push(&join.on);
    }

    filter.write_where(&mut b);

    if let Some(sort_by) = &sort_by {
        b.push(" ORDER BY ")
            .push_ident(sort_by)
            .push(" ")
            .push(spec.sort_dir.as_sql());
    }
    if let Some(limit) = spec.limit {
        b.push(" LIMIT ").push_u64(limit);
    }
    if let Some(offset) = spec.offset {
        b.push(" OFFSET ").push_u64(offset);
    }

    Ok(b.finish(kind))
}

fn non_empty(fields: &Option<Vec<String>>) -> Option<&[String]> {
    fields.as_deref().filter(|f| !f.is_empty())
}

/// Resolve the SELECT list: `select_fields`, then `include_fields`, then
/// `exclude_fields`, else `*`.
fn select_list(spec: &QuerySpec, columns: Option<&[String]>) -> CompileResult<Vec<SelectItem>> {
    let include = non_empty(&spec.include_fields);
    let exclude = non_empty(&spec.exclude_fields);
    if include.is_some() && exclude.is_some() {
        return Err(CompileError::AmbiguousFieldSelection);
    }

    if let Some(fields) = non_empty(&spec.select_fields) {
        return fields
            .iter()
            .map(|f| SelectItem::parse("select_fields", f))
            .collect();
    }

    if let Some(fields) = include {
        return fields
            .iter()
            .map(|f| {
                Ok(SelectItem::Column {
                    column: Ident::parse("include_fields", f)?,
                    alias: None,
                })
            })
            .collect();
    }

    if let Some(fields) = exclude {
        for f in fields {
            Ident::parse("exclude_fields", f)?;
        }
        let columns = columns.ok_or_else(|| CompileError::ColumnsUnresolved {
            table: spec.table.clone(),
        })?;
        let remaining = columns
            .iter()
            .filter(|c| !fields.contains(*c))
            .map(|c| {
                Ok(SelectItem::Column {
                    column: column_ident("columns", c)?,
                    alias: None,
                })
            })
            .collect::<CompileResult<Vec<_>>>()?;
        if remaining.is_empty() {
            return Err(CompileError::EmptySelection {
                table: spec.table.clone(),
            });
        }
        return Ok(remaining);
    }

    Ok(vec![SelectItem::All])
}

struct CompiledJoin {
    keyword: &'static str,
    table: Ident,
    on: String,
}

impl CompiledJoin {
    fn parse(schema: &str, join: &JoinSpec) -> CompileResult<Self> {
        let normalized = join
            .join_type
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let keyword = match normalized.as_str() {
            "INNER" => "INNER JOIN",
            "LEFT" | "LEFT OUTER" => "LEFT JOIN",
            "RIGHT" | "RIGHT OUTER" => "RIGHT JOIN",
            "FULL" | "FULL OUTER" => "FULL OUTER JOIN",
            _ => {
                return Err(CompileError::UnsupportedJoinType {
                    table: join.table.clone(),
                    join_type: join.join_type.clone(),
                });
            }
        };

        let schema = super::schema_ident(schema)?;
        let table = Ident::qualified("joins.table", &schema, &join.table)?;
        check_join_condition(join)?;

        Ok(Self {
            keyword,
            table,
            on: join.on.trim().to_string(),
        })
    }
}

/// Relaxed character check for join conditions.
///
/// The condition is trusted structural SQL; this only stops obvious mistakes
/// such as literals, statement separators and comments.
fn check_join_condition(join: &JoinSpec) -> CompileResult<()> {
    let on = join.on.trim();
    let allowed = |c: char| {
        c.is_ascii_alphanumeric()
            || c.is_whitespace()
            || matches!(c, '_' | '.' | '"' | '=' | '<' | '>' | '!' | '(' | ')')
    };
    if on.is_empty() || on.contains("--") || !on.chars().all(allowed) {
        return Err(CompileError::InvalidJoinCondition {
            table: join.table.clone(),
            on: join.on.clone(),
        });
    }
    Ok(())
}
