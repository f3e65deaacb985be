//! Generic client trait for unified database access.

use crate::error::{CrudError, CrudResult};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// A trait that unifies database clients and transactions.
///
/// The service runs compiled statements through this trait, so the same code
/// path works on a pooled connection, a plain `tokio_postgres::Client`, or a
/// transaction.
pub trait GenericClient: Send + Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = CrudResult<Vec<Row>>> + Send;

    /// Execute a query and return the first row, if any.
    fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = CrudResult<Option<Row>>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            Ok(rows.into_iter().next())
        }
    }

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = CrudResult<u64>> + Send;

    /// Run one or more parameterless statements (session settings).
    fn batch_execute(&self, sql: &str) -> impl std::future::Future<Output = CrudResult<()>> + Send;
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> CrudResult<Vec<Row>> {
        tokio_postgres::Client::query(self, sql, params)
            .await
            .map_err(CrudError::from_db_error)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> CrudResult<u64> {
        tokio_postgres::Client::execute(self, sql, params)
            .await
            .map_err(CrudError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> CrudResult<()> {
        tokio_postgres::Client::batch_execute(self, sql)
            .await
            .map_err(CrudError::from_db_error)
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> CrudResult<Vec<Row>> {
        tokio_postgres::Transaction::query(self, sql, params)
            .await
            .map_err(CrudError::from_db_error)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> CrudResult<u64> {
        tokio_postgres::Transaction::execute(self, sql, params)
            .await
            .map_err(CrudError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> CrudResult<()> {
        tokio_postgres::Transaction::batch_execute(self, sql)
            .await
            .map_err(CrudError::from_db_error)
    }
}

// ===== deadpool-postgres support =====

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> CrudResult<Vec<Row>> {
        // Delegate to the deref target (ClientWrapper / tokio_postgres::Client).
        GenericClient::query(&**self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> CrudResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> CrudResult<()> {
        GenericClient::batch_execute(&**self, sql).await
    }
}

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::ClientWrapper {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> CrudResult<Vec<Row>> {
        GenericClient::query(&**self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> CrudResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> CrudResult<()> {
        GenericClient::batch_execute(&**self, sql).await
    }
}

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> CrudResult<Vec<Row>> {
        GenericClient::query(&**self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> CrudResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> CrudResult<()> {
        GenericClient::batch_execute(&**self, sql).await
    }
}

/// Runs the given block inside a database transaction.
///
/// - Begins a transaction via `$client.transaction().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `pgcrud::CrudResult<T>`.
///
/// ```ignore
/// let mut client = pool.get().await?;
/// let n = pgcrud::transaction!(&mut client, tx, {
///     let n = tx.execute("DELETE FROM sessions WHERE expired", &[]).await?;
///     Ok(n)
/// })?;
/// ```
#[macro_export]
macro_rules! transaction {
    ($client:expr, $tx:ident, $body:block) => {{
        let $tx = ($client)
            .transaction()
            .await
            .map_err($crate::CrudError::from_db_error)?;

        let __pgcrud_tx_body_result: $crate::CrudResult<_> = async { $body }.await;
        match __pgcrud_tx_body_result {
            Ok(value) => {
                $tx.commit()
                    .await
                    .map_err($crate::CrudError::from_db_error)?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::CrudError::Connection(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns no rows and records the SQL it was given.
    #[derive(Default)]
    struct EmptyClient {
        seen: Mutex<Vec<String>>,
    }

    impl GenericClient for EmptyClient {
        async fn query(&self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> CrudResult<Vec<Row>> {
            self.seen.lock().unwrap().push(sql.to_string());
            Ok(Vec::new())
        }

        async fn execute(&self, _sql: &str, _params: &[&(dyn ToSql + Sync)]) -> CrudResult<u64> {
            Ok(0)
        }

        async fn batch_execute(&self, _sql: &str) -> CrudResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn query_opt_is_none_without_rows() {
        let client = EmptyClient::default();
        let row = client
            .query_opt(r#"SELECT "salt" FROM "public"."users" LIMIT 1"#, &[])
            .await
            .unwrap();
        assert!(row.is_none());
        assert_eq!(
            client.seen.lock().unwrap().as_slice(),
            [r#"SELECT "salt" FROM "public"."users" LIMIT 1"#.to_string()]
        );
    }
}
