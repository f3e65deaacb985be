//! Request → SQL compilation.
//!
//! Every function here is pure: it validates the request, renders identifiers
//! into the SQL text and collects values as bound parameters. Nothing touches a
//! connection, so compilation can run anywhere and is safe to call concurrently.
//!
//! | Request        | Compiler                          |
//! |----------------|-----------------------------------|
//! | read           | [`read`]                          |
//! | join-read      | [`join_read`]                     |
//! | create         | [`create`]                        |
//! | update         | [`salt_lookup`] then [`update`]   |
//! | delete         | [`delete`]                        |
//! | raw            | [`raw`]                           |
//! | verify-password| [`verify_lookup`]                 |

pub(crate) mod builder;
mod mutation;
mod raw;
mod select;

pub use mutation::{create, delete, salt_lookup, update};
pub use raw::{leading_keyword, raw};
pub use select::{join_read, read, verify_lookup};

use crate::error::{CompileError, CompileResult};
use crate::ident::Ident;

/// Largest accepted `limit`.
pub const MAX_LIMIT: u64 = 10_000;

/// Resolve `schema` + `table` into a qualified identifier.
pub(crate) fn table_ident(schema: &str, table: &str) -> CompileResult<Ident> {
    let schema = schema_ident(schema)?;
    Ident::qualified("table", &schema, table)
}

pub(crate) fn schema_ident(schema: &str) -> CompileResult<Ident> {
    let ident = Ident::parse("schema", schema)?;
    if !ident.is_simple() {
        return Err(CompileError::invalid_identifier("schema", schema));
    }
    Ok(ident)
}

/// Parse a column name that must not be qualified (INSERT/UPDATE targets).
pub(crate) fn column_ident(field: &str, column: &str) -> CompileResult<Ident> {
    let ident = Ident::parse(field, column)?;
    if !ident.is_simple() {
        return Err(CompileError::invalid_identifier(field, column));
    }
    Ok(ident)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_schema_qualified() {
        assert_eq!(table_ident("public", "users").unwrap().to_sql(), r#""public"."users""#);
        assert_eq!(table_ident("public", "audit.log").unwrap().to_sql(), r#""audit"."log""#);
    }

    #[test]
    fn schema_must_be_simple() {
        assert!(table_ident("a.b", "users").is_err());
        assert_eq!(
            table_ident("public", "users; --").unwrap_err(),
            CompileError::invalid_identifier("table", "users; --")
        );
    }

    #[test]
    fn target_columns_are_unqualified() {
        assert!(column_ident("data", "name").is_ok());
        assert!(column_ident("data", "users.name").is_err());
    }
}
