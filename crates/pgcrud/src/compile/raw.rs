use super::schema_ident;
use crate::error::{CompileError, CompileResult};
use crate::spec::RawSpec;
use crate::statement::{CompiledStatement, StatementKind, scan_placeholders};
use crate::value::SqlValue;

/// Leading keywords refused when `read_only` is set.
const WRITE_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE"];

/// Compile a raw query.
///
/// `?` (and `%s`) placeholders outside quoted text are rewritten to `$1..$n`;
/// templates already using `$n` pass through. The schema is returned as the
/// statement's `search_path`.
///
/// The `read_only` gate only looks at the first keyword. A data-modifying CTE
/// such as `WITH d AS (DELETE ...) SELECT ...` is not detected.
pub fn raw(spec: &RawSpec) -> CompileResult<CompiledStatement> {
    let schema = schema_ident(&spec.schema)?;

    if spec.read_only {
        let keyword = leading_keyword(&spec.query);
        if WRITE_KEYWORDS.contains(&keyword.as_str()) {
            return Err(CompileError::ReadOnlyViolation { keyword });
        }
    }

    let (sql, placeholders) = scan_placeholders(&spec.query);
    if placeholders != spec.params.len() {
        return Err(CompileError::ParameterCountMismatch {
            placeholders,
            params: spec.params.len(),
        });
    }

    let params = spec.params.iter().cloned().map(SqlValue::from_json).collect();
    let mut stmt = CompiledStatement::new(StatementKind::Raw, sql, params);
    stmt.search_path = Some(schema.name().to_string());
    Ok(stmt)
}

/// First keyword of a statement, upper-cased.
///
/// Leading whitespace, comments and opening parentheses are skipped.
pub fn leading_keyword(sql: &str) -> String {
    strip_sql_prefix(sql)
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase()
}

fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            match s.find('\n') {
                Some(pos) => {
                    s = &s[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => {
                    s = &s[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            break;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rewrites_question_marks() {
        let spec = RawSpec::new("public", "SELECT * FROM users WHERE age > ? AND name = ?")
            .params(vec![json!(18), json!("Jane")]);
        let stmt = raw(&spec).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM users WHERE age > $1 AND name = $2");
        assert_eq!(stmt.params, vec![SqlValue::Int(18), SqlValue::from("Jane")]);
        assert_eq!(stmt.search_path.as_deref(), Some("public"));
        assert_eq!(stmt.kind, StatementKind::Raw);
    }

    #[test]
    fn positional_and_percent_styles() {
        let stmt = raw(&RawSpec::new("s", "SELECT $1::int + $2::int").params(vec![json!(1), json!(2)]))
            .unwrap();
        assert_eq!(stmt.sql, "SELECT $1::int + $2::int");

        let stmt = raw(&RawSpec::new("s", "SELECT * FROM t WHERE a = %s").params(vec![json!(1)]))
            .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE a = $1");
    }

    #[test]
    fn quoted_text_is_untouched() {
        let spec = RawSpec::new(
            "s",
            "SELECT '?', \"wh?\" FROM t -- what?\nWHERE a = ? /* ? */",
        )
        .params(vec![json!(1)]);
        let stmt = raw(&spec).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT '?', \"wh?\" FROM t -- what?\nWHERE a = $1 /* ? */"
        );
    }

    #[test]
    fn dollar_placeholders_in_comments_are_not_counted() {
        let spec = RawSpec::new("s", "SELECT * FROM t WHERE a = ? -- was $2 before")
            .params(vec![json!(1)]);
        let stmt = raw(&spec).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE a = $1 -- was $2 before");

        let spec = RawSpec::new("s", "SELECT $1::int /* $3 */").params(vec![json!(1)]);
        assert!(raw(&spec).is_ok());
    }

    #[test]
    fn parameter_count_must_match() {
        let err = raw(&RawSpec::new("s", "SELECT ?, ?").params(vec![json!(1)])).unwrap_err();
        assert_eq!(
            err,
            CompileError::ParameterCountMismatch {
                placeholders: 2,
                params: 1
            }
        );
    }

    #[test]
    fn read_only_rejects_leading_writes() {
        for sql in [
            "DELETE FROM users",
            "  insert into users values (1)",
            "-- note\n/* x */ (UPDATE users SET a = 1)",
            "drop table users",
            "Truncate users",
            "ALTER TABLE users ADD c int",
        ] {
            let err = raw(&RawSpec::new("public", sql)).unwrap_err();
            assert!(
                matches!(err, CompileError::ReadOnlyViolation { .. }),
                "{sql:?} should be rejected"
            );
        }

        assert!(raw(&RawSpec::new("public", "DELETE FROM users").read_only(false)).is_ok());
    }

    #[test]
    fn read_only_gate_is_prefix_only() {
        // A data-modifying CTE passes the advisory check.
        let sql = "WITH d AS (DELETE FROM users RETURNING *) SELECT * FROM d";
        assert!(raw(&RawSpec::new("public", sql)).is_ok());
    }

    #[test]
    fn schema_is_validated() {
        assert!(matches!(
            raw(&RawSpec::new("public; drop", "SELECT 1")).unwrap_err(),
            CompileError::InvalidIdentifier { .. }
        ));
    }

    #[test]
    fn leading_keyword_skips_noise() {
        assert_eq!(leading_keyword("  /* c */ -- x\n ((select 1))"), "SELECT");
        assert_eq!(leading_keyword("with x as (select 1) select * from x"), "WITH");
        assert_eq!(leading_keyword("-- only a comment"), "");
    }
}
