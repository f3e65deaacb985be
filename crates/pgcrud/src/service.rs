//! Pooled execution of compiled requests.
//!
//! [`CrudService`] owns a `deadpool_postgres::Pool` and a [`CrudConfig`]. Each
//! call checks out one connection, compiles the request, runs it and returns a
//! JSON result:
//!
//! | Call              | Result                                  |
//! |-------------------|-----------------------------------------|
//! | `read`/`join_read`| `{"count": n, "data": [...]}`           |
//! | `create`          | `{"count": n, "data": [...]}`           |
//! | `update`          | `{"count": n, "data": [...]}` (capped)  |
//! | `delete`          | `{"count": n}`                          |
//! | `raw`             | rows, or `{"count": n}` for writes      |
//! | `verify_password` | `{"verified": bool, "found": bool}`     |
//! | `bulk`            | `{"operation", "count", "results"}`     |
//!
//! Mutations run inside one transaction that rolls back on any error.

use crate::client::GenericClient;
use crate::compile;
use crate::config::CrudConfig;
use crate::error::{CompileResult, CrudError, CrudResult};
use crate::ident::Ident;
use crate::introspect::{self, ColumnInfo, TableInfo};
use crate::password::{salt_text, verify_password};
use crate::pool::create_pool_from_config;
use crate::row::{JsonCell, rows_to_json};
use crate::spec::{
    BulkOperation, BulkSpec, BulkStep, CreateSpec, DeleteSpec, QuerySpec, RawSpec, Request,
    UpdateSpec, VerifyPasswordSpec,
};
use crate::statement::CompiledStatement;
use deadpool_postgres::Pool;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_postgres::Row;

/// Leading keywords of raw statements that return rows.
const ROW_RETURNING_KEYWORDS: &[&str] = &["SELECT", "WITH", "VALUES", "SHOW", "EXPLAIN", "TABLE"];

/// Executes requests against a connection pool.
///
/// Cloning is cheap; clones share the pool and the configuration.
#[derive(Clone)]
pub struct CrudService {
    pool: Pool,
    config: Arc<CrudConfig>,
}

impl CrudService {
    pub fn new(pool: Pool, config: CrudConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }

    /// Build the pool from `config.database`.
    pub fn from_config(config: CrudConfig) -> CrudResult<Self> {
        let pool = create_pool_from_config(&config.database)?;
        Ok(Self::new(pool, config))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn config(&self) -> &CrudConfig {
        &self.config
    }

    /// Dispatch any request.
    pub async fn execute(&self, request: &Request) -> CrudResult<Value> {
        match request {
            Request::Read(spec) => self.read(spec).await,
            Request::JoinRead(spec) => self.join_read(spec).await,
            Request::Create(spec) => self.create(spec).await,
            Request::Update(spec) => self.update(spec).await,
            Request::Delete(spec) => self.delete(spec).await,
            Request::Raw(spec) => self.raw(spec).await,
            Request::VerifyPassword(spec) => self.verify_password(spec).await,
            Request::Bulk(spec) => self.bulk(spec).await,
        }
    }

    pub async fn read(&self, spec: &QuerySpec) -> CrudResult<Value> {
        self.select(spec, compile::read).await
    }

    pub async fn join_read(&self, spec: &QuerySpec) -> CrudResult<Value> {
        self.select(spec, compile::join_read).await
    }

    pub async fn create(&self, spec: &CreateSpec) -> CrudResult<Value> {
        let stmt = compile::create(spec)?;
        let mut client = self.pool.get().await?;
        let rows = crate::transaction!(&mut client, tx, {
            self.run_query(&tx, &stmt).await
        })?;
        rows_response(&rows)
    }

    pub async fn update(&self, spec: &UpdateSpec) -> CrudResult<Value> {
        let mut client = self.pool.get().await?;
        let rows = crate::transaction!(&mut client, tx, { self.update_in(&tx, spec).await })?;
        let count = rows.len();
        if count > self.config.update_return_cap {
            return Ok(json!({ "count": count }));
        }
        Ok(json!({ "count": count, "data": rows_to_json(&rows)? }))
    }

    pub async fn delete(&self, spec: &DeleteSpec) -> CrudResult<Value> {
        let stmt = compile::delete(spec)?;
        self.config.safety.check(&stmt)?;
        let mut client = self.pool.get().await?;
        let count = crate::transaction!(&mut client, tx, {
            self.run_execute(&tx, &stmt).await
        })?;
        Ok(json!({ "count": count }))
    }

    /// Run a raw SQL template with `search_path` set to the request schema.
    ///
    /// The setting is transaction-local, so it never leaks to the next checkout
    /// of the same connection.
    pub async fn raw(&self, spec: &RawSpec) -> CrudResult<Value> {
        let stmt = compile::raw(spec)?;
        let returns_rows = spec.read_only
            || ROW_RETURNING_KEYWORDS.contains(&compile::leading_keyword(&stmt.sql).as_str());
        let search_path = match stmt.search_path.as_deref() {
            Some(schema) => Some(format!(
                "SET LOCAL search_path TO {}",
                Ident::parse("schema", schema)?.to_sql()
            )),
            None => None,
        };

        let mut client = self.pool.get().await?;
        crate::transaction!(&mut client, tx, {
            if let Some(set) = &search_path {
                tx.batch_execute(set).await?;
            }
            if returns_rows {
                let rows = self.run_query(&tx, &stmt).await?;
                rows_response(&rows)
            } else {
                let count = self.run_execute(&tx, &stmt).await?;
                Ok(json!({ "count": count }))
            }
        })
    }

    /// Check a plaintext password against the stored digest.
    ///
    /// `found` is false when no row matches the identifier; `verified` is false
    /// then as well as when the stored digest or salt is missing.
    pub async fn verify_password(&self, spec: &VerifyPasswordSpec) -> CrudResult<Value> {
        let stmt = compile::verify_lookup(spec)?;
        let client = self.pool.get().await?;
        let Some(row) = self.run_query_opt(&client, &stmt).await? else {
            return Ok(json!({ "verified": false, "found": false }));
        };

        let stored = cell_text(&row, 0, &spec.password_field)?;
        let salt = cell_text(&row, 1, spec.salt_field())?;
        let verified = match (stored, salt) {
            (Some(stored), Some(salt)) => verify_password(&spec.password, &salt, &stored),
            _ => false,
        };
        Ok(json!({ "verified": verified, "found": true }))
    }

    /// Run every record of a bulk request inside one transaction.
    pub async fn bulk(&self, spec: &BulkSpec) -> CrudResult<Value> {
        let steps = spec.steps()?;
        let mut client = self.pool.get().await?;
        let results = crate::transaction!(&mut client, tx, {
            let mut results = Vec::with_capacity(steps.len());
            for step in &steps {
                let count = match step {
                    BulkStep::Create(create) => {
                        let stmt = compile::create(create)?;
                        self.run_execute(&tx, &stmt).await?
                    }
                    BulkStep::Update(update) => self.update_in(&tx, update).await?.len() as u64,
                    BulkStep::Delete(delete) => {
                        let stmt = compile::delete(delete)?;
                        self.config.safety.check(&stmt)?;
                        self.run_execute(&tx, &stmt).await?
                    }
                };
                results.push(count);
            }
            Ok(results)
        })?;

        let operation = match spec.operation {
            BulkOperation::Create => "create",
            BulkOperation::Update => "update",
            BulkOperation::Delete => "delete",
        };
        let count: u64 = results.iter().sum();
        Ok(json!({ "operation": operation, "count": count, "results": results }))
    }

    pub async fn list_tables(&self, schema: &str) -> CrudResult<Vec<TableInfo>> {
        let client = self.pool.get().await?;
        self.with_timeout(introspect::list_tables(&client, schema)).await
    }

    pub async fn table_columns(&self, schema: &str, table: &str) -> CrudResult<Vec<ColumnInfo>> {
        let client = self.pool.get().await?;
        self.with_timeout(introspect::table_columns(&client, schema, table))
            .await
    }

    /// Check out a connection and run `SELECT 1`.
    pub async fn health(&self) -> CrudResult<()> {
        let client = self.pool.get().await?;
        self.with_timeout(client.batch_execute("SELECT 1")).await
    }

    /// Salt lookup, password transform and UPDATE on one client.
    async fn update_in<C: GenericClient>(&self, client: &C, spec: &UpdateSpec) -> CrudResult<Vec<Row>> {
        let looked_up = match compile::salt_lookup(spec)? {
            Some(lookup) => {
                match self.run_query_opt(client, &lookup).await? {
                    Some(row) => cell_text(&row, 0, &spec.credentials.salt_field)?,
                    None => None,
                }
            }
            None => None,
        };
        let stmt = compile::update(spec, looked_up.as_deref())?;
        self.config.safety.check(&stmt)?;
        self.run_query(client, &stmt).await
    }

    /// Compile before checkout unless the selection needs the column list.
    async fn select(
        &self,
        spec: &QuerySpec,
        compile_select: fn(&QuerySpec, Option<&[String]>) -> CompileResult<CompiledStatement>,
    ) -> CrudResult<Value> {
        let spec = self.with_default_limit(spec);
        let compiled = if spec.needs_columns() {
            None
        } else {
            Some(compile_select(&spec, None)?)
        };

        let client = self.pool.get().await?;
        let stmt = match compiled {
            Some(stmt) => stmt,
            None => {
                let columns = self
                    .with_timeout(introspect::column_names(&client, &spec.schema, &spec.table))
                    .await?;
                compile_select(&spec, Some(columns.as_slice()))?
            }
        };
        let rows = self.run_query(&client, &stmt).await?;
        rows_response(&rows)
    }

    fn with_default_limit(&self, spec: &QuerySpec) -> QuerySpec {
        let mut spec = spec.clone();
        if spec.limit.is_none() {
            spec.limit = Some(self.config.default_limit);
        }
        spec
    }

    async fn run_query<C: GenericClient>(
        &self,
        client: &C,
        stmt: &CompiledStatement,
    ) -> CrudResult<Vec<Row>> {
        let logger = &self.config.sql_logger;
        logger.before(stmt);
        let params = stmt.params_ref();
        let start = Instant::now();
        match self.with_timeout(client.query(&stmt.sql, &params)).await {
            Ok(rows) => {
                logger.after(stmt, start.elapsed(), rows.len() as u64);
                Ok(rows)
            }
            Err(err) => Err(log_failure(stmt, err)),
        }
    }

    /// Single-row lookups (`... LIMIT 1`).
    async fn run_query_opt<C: GenericClient>(
        &self,
        client: &C,
        stmt: &CompiledStatement,
    ) -> CrudResult<Option<Row>> {
        let logger = &self.config.sql_logger;
        logger.before(stmt);
        let params = stmt.params_ref();
        let start = Instant::now();
        match self.with_timeout(client.query_opt(&stmt.sql, &params)).await {
            Ok(row) => {
                logger.after(stmt, start.elapsed(), u64::from(row.is_some()));
                Ok(row)
            }
            Err(err) => Err(log_failure(stmt, err)),
        }
    }

    async fn run_execute<C: GenericClient>(
        &self,
        client: &C,
        stmt: &CompiledStatement,
    ) -> CrudResult<u64> {
        let logger = &self.config.sql_logger;
        logger.before(stmt);
        let params = stmt.params_ref();
        let start = Instant::now();
        match self.with_timeout(client.execute(&stmt.sql, &params)).await {
            Ok(count) => {
                logger.after(stmt, start.elapsed(), count);
                Ok(count)
            }
            Err(err) => Err(log_failure(stmt, err)),
        }
    }

    async fn with_timeout<T, F>(&self, future: F) -> CrudResult<T>
    where
        F: Future<Output = CrudResult<T>>,
    {
        match self.config.statement_timeout {
            Some(timeout) => tokio::time::timeout(timeout, future)
                .await
                .map_err(|_| CrudError::Timeout(timeout))?,
            None => future.await,
        }
    }
}

impl std::fmt::Debug for CrudService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudService")
            .field("pool", &self.pool.status())
            .field("config", &self.config)
            .finish()
    }
}

fn log_failure(stmt: &CompiledStatement, err: CrudError) -> CrudError {
    tracing::error!(
        target: crate::logging::SQL_TARGET,
        kind = %stmt.kind,
        error = %err,
        "statement failed",
    );
    err
}

fn rows_response(rows: &[Row]) -> CrudResult<Value> {
    Ok(json!({ "count": rows.len(), "data": rows_to_json(rows)? }))
}

/// Text form of one cell, whatever its column type.
fn cell_text(row: &Row, idx: usize, column: &str) -> CrudResult<Option<String>> {
    let cell: JsonCell = row
        .try_get(idx)
        .map_err(|e| CrudError::decode(column, e.to_string()))?;
    Ok(salt_text(&cell.0))
}
