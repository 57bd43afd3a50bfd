//! Connection and transaction wrappers.

use deadpool_postgres::Object;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::error::PgResult;

/// A pooled PostgreSQL connection.
pub struct PgConnection {
    client: Object,
}

impl PgConnection {
    pub(crate) fn new(client: Object) -> Self {
        Self { client }
    }

    /// Execute a query and return all rows.
    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> PgResult<Vec<Row>> {
        debug!(sql = %sql, "executing query");
        Ok(self.client.query(sql, params).await?)
    }

    /// Execute a query and return exactly one row.
    pub async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> PgResult<Row> {
        debug!(sql = %sql, "executing query_one");
        Ok(self.client.query_one(sql, params).await?)
    }

    /// Execute a query and return zero or one row.
    pub async fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> PgResult<Option<Row>> {
        debug!(sql = %sql, "executing query_opt");
        Ok(self.client.query_opt(sql, params).await?)
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> PgResult<u64> {
        debug!(sql = %sql, "executing statement");
        Ok(self.client.execute(sql, params).await?)
    }

    /// Begin a transaction.
    pub async fn transaction(&mut self) -> PgResult<PgTransaction<'_>> {
        debug!("beginning transaction");
        let txn = self.client.transaction().await?;
        Ok(PgTransaction { txn })
    }
}

/// An open transaction.
///
/// Dropping the transaction without committing rolls it back at the driver
/// level; the probe engine still issues its explicit rollbacks on top.
pub struct PgTransaction<'a> {
    txn: deadpool_postgres::Transaction<'a>,
}

impl PgTransaction<'_> {
    /// Execute a query and return all rows.
    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> PgResult<Vec<Row>> {
        debug!(sql = %sql, "executing query in transaction");
        Ok(self.txn.query(sql, params).await?)
    }

    /// Execute a query and return zero or one row.
    pub async fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> PgResult<Option<Row>> {
        Ok(self.txn.query_opt(sql, params).await?)
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> PgResult<u64> {
        debug!(sql = %sql, "executing statement in transaction");
        Ok(self.txn.execute(sql, params).await?)
    }

    /// Execute raw SQL without preparing a statement.
    pub async fn batch_execute(&self, sql: &str) -> PgResult<()> {
        debug!(sql = %sql, "executing batch in transaction");
        Ok(self.txn.batch_execute(sql).await?)
    }

    /// Create a savepoint.
    pub async fn savepoint(&self, name: &str) -> PgResult<()> {
        debug!(name = %name, "creating savepoint");
        self.txn.batch_execute(&format!("SAVEPOINT {}", name)).await?;
        Ok(())
    }

    /// Rollback to a savepoint, keeping the transaction open.
    pub async fn rollback_to(&self, name: &str) -> PgResult<()> {
        debug!(name = %name, "rolling back to savepoint");
        self.txn
            .batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", name))
            .await?;
        Ok(())
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> PgResult<()> {
        debug!("rolling back transaction");
        self.txn.rollback().await?;
        Ok(())
    }
}
