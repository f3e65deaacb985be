//! # pgcrud
//!
//! Validated CRUD requests compiled to parameterized Postgres SQL.
//!
//! ## Features
//!
//! - **Identifiers are validated, values are bound**: table, column and schema
//!   names pass a strict grammar before being quoted into the SQL text; every
//!   user value becomes a `$n` parameter.
//! - **Pure compiler**: [`compile`] turns a request into a [`CompiledStatement`]
//!   without touching a connection.
//! - **Pooled execution**: [`CrudService`] runs requests on a `deadpool-postgres`
//!   pool, with mutations wrapped in a transaction.
//! - **Safe defaults**: DELETE without filters is rejected, UPDATE without
//!   filters is logged (see [`SafetyConfig`]).
//! - **SQL logging**: statements are traced before execution, never with values.
//!
//! ## Compiling
//!
//! ```ignore
//! use pgcrud::{QuerySpec, SortDir, compile};
//! use serde_json::json;
//!
//! let spec = QuerySpec::new("public", "users")
//!     .filters(json!({"age": {"$gte": 18}, "status": "active"}).as_object().unwrap().clone())
//!     .sort("created_at", SortDir::Desc)
//!     .limit(10);
//!
//! let stmt = compile::read(&spec, None)?;
//! assert_eq!(
//!     stmt.sql,
//!     r#"SELECT * FROM "public"."users" WHERE "age" >= $1 AND "status" = $2 ORDER BY "created_at" DESC LIMIT 10"#
//! );
//! ```
//!
//! ## Executing
//!
//! ```ignore
//! let service = pgcrud::CrudService::from_config(pgcrud::CrudConfig::from_env()?)?;
//! let request: pgcrud::Request = serde_json::from_str(body)?;
//! let result = service.execute(&request).await?;
//! ```

pub mod client;
pub mod compile;
pub mod config;
pub mod error;
pub mod filter;
pub mod ident;
pub mod introspect;
pub mod logging;
pub mod password;
pub mod row;
pub mod spec;
pub mod statement;
pub mod value;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub mod service;

pub use client::GenericClient;
pub use config::{CrudConfig, DatabaseConfig, SafetyConfig, SafetyPolicy};
pub use error::{CompileError, CompileResult, CrudError, CrudResult, ErrorClass};
pub use filter::{FilterExpression, FilterValue, Filters, Operator};
pub use ident::{Ident, SelectItem};
pub use introspect::{ColumnInfo, RelationKind, TableInfo};
pub use logging::SqlLogger;
pub use password::{hash_password, verify_password};
pub use row::{FromRow, JsonCell, RowExt, rows_to_json};
pub use spec::{
    BulkOperation, BulkSpec, BulkStep, CreateSpec, CredentialOptions, DeleteSpec, JoinSpec,
    Payload, QuerySpec, RawSpec, Record, Request, SortDir, UpdateSpec, VerifyPasswordSpec,
};
pub use statement::{CompiledStatement, StatementKind};
pub use value::SqlValue;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_from_config, create_pool_with_tls};

#[cfg(feature = "pool")]
pub use service::CrudService;
