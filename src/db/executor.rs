//! Statement execution engine.
//!
//! This module runs parameterized statements on a pool with support for:
//! - Per-statement timeouts
//! - Ordered statement lists inside one transaction
//! - Row normalization into [`ResultSet`]
//!
//! # Architecture
//!
//! The executor uses engine-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific fetch and write operations
//! - `postgres`: PostgreSQL-specific fetch and write operations
//! - `sqlite`: SQLite-specific fetch and write operations
//! - `mssql`: glue over the tiberius pool in [`crate::db::mssql`]
//!
//! The sqlx submodules are generic over `sqlx::Executor`, so the same code
//! runs against a pool or against an open transaction.

use crate::db::mssql::{self as tds, MssqlClient, MssqlConnection, MssqlPool};
use crate::db::pool::DbPool;
use crate::db::types::rows_to_result_set;
use crate::error::{DbError, DbResult};
use crate::models::{ExecOutcome, QueryParam, ResultSet, Statement};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// A statement list that failed part-way, with everything rolled back.
#[derive(Debug)]
pub struct BatchFailure {
    /// Index of the failing statement; `len` when the commit itself failed
    pub index: usize,
    pub error: DbError,
}

impl BatchFailure {
    fn new(index: usize, error: DbError) -> Self {
        Self { index, error }
    }
}

/// Executes statements with a deadline.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    statement_timeout: Duration,
}

impl QueryExecutor {
    /// Create a new query executor with default settings.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_STATEMENT_TIMEOUT)
    }

    pub fn with_timeout(statement_timeout: Duration) -> Self {
        Self { statement_timeout }
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    /// Run a row-returning statement.
    pub async fn fetch(&self, pool: &DbPool, stmt: &Statement) -> DbResult<ResultSet> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "Executing query");
        match pool {
            DbPool::MySql(p) => {
                let rows = self.bounded(pool, "query execution", mysql::fetch(p, stmt)).await?;
                Ok(rows_to_result_set(&rows))
            }
            DbPool::Postgres(p) => {
                let rows = self
                    .bounded(pool, "query execution", postgres::fetch(p, stmt))
                    .await?;
                Ok(rows_to_result_set(&rows))
            }
            DbPool::SQLite(p) => {
                let rows = self.bounded(pool, "query execution", sqlite::fetch(p, stmt)).await?;
                Ok(rows_to_result_set(&rows))
            }
            DbPool::SqlServer(p) => {
                self.bounded_tds("query execution", mssql::fetch(p, stmt))
                    .await
            }
        }
    }

    /// Run a write statement and report affected rows.
    pub async fn execute(&self, pool: &DbPool, stmt: &Statement) -> DbResult<ExecOutcome> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "Executing write operation");
        match pool {
            DbPool::MySql(p) => self.bounded(pool, "write operation", mysql::execute(p, stmt)).await,
            DbPool::Postgres(p) => {
                self.bounded(pool, "write operation", postgres::execute(p, stmt))
                    .await
            }
            DbPool::SQLite(p) => {
                self.bounded(pool, "write operation", sqlite::execute(p, stmt))
                    .await
            }
            DbPool::SqlServer(p) => {
                self.bounded_tds("write operation", mssql::execute(p, stmt))
                    .await
            }
        }
    }

    /// Run write statements in order inside one transaction.
    ///
    /// The first failure rolls everything back and reports its index.
    pub async fn execute_in_transaction(
        &self,
        pool: &DbPool,
        stmts: &[Statement],
    ) -> Result<Vec<ExecOutcome>, BatchFailure> {
        self.transaction::<ExecOutcome>(pool, stmts, true).await
    }

    /// Run one write statement inside a transaction that is rolled back.
    ///
    /// Reports what the statement would affect without persisting it.
    pub async fn execute_and_rollback(&self, pool: &DbPool, stmt: &Statement) -> DbResult<ExecOutcome> {
        let mut results = self
            .transaction::<ExecOutcome>(pool, std::slice::from_ref(stmt), false)
            .await
            .map_err(|f| f.error)?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Run a row-returning statement inside a transaction that is rolled back.
    ///
    /// Used for writes with RETURNING/OUTPUT clauses that must not persist.
    pub async fn fetch_and_rollback(&self, pool: &DbPool, stmt: &Statement) -> DbResult<ResultSet> {
        let mut results = self
            .transaction::<ResultSet>(pool, std::slice::from_ref(stmt), false)
            .await
            .map_err(|f| f.error)?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Run a row-returning statement inside a committed transaction.
    pub async fn fetch_in_transaction(&self, pool: &DbPool, stmt: &Statement) -> DbResult<ResultSet> {
        let mut results = self
            .transaction::<ResultSet>(pool, std::slice::from_ref(stmt), true)
            .await
            .map_err(|f| f.error)?;
        Ok(results.pop().unwrap_or_default())
    }

    async fn transaction<T: TxWork>(
        &self,
        pool: &DbPool,
        stmts: &[Statement],
        commit: bool,
    ) -> Result<Vec<T>, BatchFailure> {
        debug!(statements = stmts.len(), commit, "Executing transaction");
        match pool {
            DbPool::MySql(p) => self.sqlx_transaction(pool, p, stmts, commit, T::mysql).await,
            DbPool::Postgres(p) => {
                self.sqlx_transaction(pool, p, stmts, commit, T::postgres)
                    .await
            }
            DbPool::SQLite(p) => self.sqlx_transaction(pool, p, stmts, commit, T::sqlite).await,
            DbPool::SqlServer(p) => self.tds_transaction(p, stmts, commit).await,
        }
    }

    async fn sqlx_transaction<DB, T, F>(
        &self,
        pool: &DbPool,
        sqlx_pool: &sqlx::Pool<DB>,
        stmts: &[Statement],
        commit: bool,
        run: F,
    ) -> Result<Vec<T>, BatchFailure>
    where
        DB: sqlx::Database,
        F: for<'c> Fn(&'c mut DB::Connection, &'c Statement) -> BoxFuture<'c, Result<T, sqlx::Error>>,
    {
        let mut tx = self
            .bounded(pool, "begin transaction", sqlx_pool.begin())
            .await
            .map_err(|e| BatchFailure::new(0, e))?;

        let mut results = Vec::with_capacity(stmts.len());
        for (index, stmt) in stmts.iter().enumerate() {
            debug!(index, sql = %stmt.sql, "Executing statement in transaction");
            match self.bounded(pool, "statement execution", run(&mut *tx, stmt)).await {
                Ok(result) => results.push(result),
                Err(error) => {
                    if let Err(e) = self.bounded(pool, "rollback", tx.rollback()).await {
                        warn!(error = %e, "Rollback failed");
                    }
                    return Err(BatchFailure::new(index, error));
                }
            }
        }

        if commit {
            self.bounded(pool, "commit", tx.commit())
                .await
                .map_err(|e| BatchFailure::new(stmts.len(), e))?;
        } else {
            self.bounded(pool, "rollback", tx.rollback())
                .await
                .map_err(|e| BatchFailure::new(stmts.len(), e))?;
        }
        Ok(results)
    }

    async fn tds_transaction<T: TxWork>(
        &self,
        pool: &MssqlPool,
        stmts: &[Statement],
        commit: bool,
    ) -> Result<Vec<T>, BatchFailure> {
        let mut conn = self
            .bounded_tds("connection pool acquire", pool.acquire())
            .await
            .map_err(|e| BatchFailure::new(0, e))?;

        self.bounded_tds("begin transaction", mssql::simple(&mut conn, "BEGIN TRANSACTION"))
            .await
            .map_err(|e| BatchFailure::new(0, e))?;

        let mut results = Vec::with_capacity(stmts.len());
        for (index, stmt) in stmts.iter().enumerate() {
            debug!(index, sql = %stmt.sql, "Executing statement in transaction");
            let step = async {
                let client = conn.client()?;
                let result = T::mssql(client, stmt).await;
                mssql::settle(&mut conn, &result);
                result
            };
            match self.bounded_tds("statement execution", step).await {
                Ok(result) => results.push(result),
                Err(error) => {
                    if conn.is_in_flight() {
                        // Unusable connection; dropping it aborts the transaction
                        debug!(index, "Discarding SQL Server connection without rollback");
                    } else if let Err(e) = self
                        .bounded_tds("rollback", mssql::simple(&mut conn, "ROLLBACK TRANSACTION"))
                        .await
                    {
                        warn!(error = %e, "Rollback failed");
                    }
                    return Err(BatchFailure::new(index, error));
                }
            }
        }

        let finish = if commit {
            "COMMIT TRANSACTION"
        } else {
            "ROLLBACK TRANSACTION"
        };
        self.bounded_tds("commit", mssql::simple(&mut conn, finish))
            .await
            .map_err(|e| BatchFailure::new(stmts.len(), e))?;
        Ok(results)
    }

    /// Apply the statement deadline to a sqlx future.
    async fn bounded<T, F>(&self, pool: &DbPool, operation: &str, fut: F) -> DbResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match timeout(self.statement_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(pool.driver_error(e)),
            Err(_) => Err(timeout_error(operation, self.statement_timeout)),
        }
    }

    /// Apply the statement deadline to a SQL Server future.
    async fn bounded_tds<T, F>(&self, operation: &str, fut: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        match timeout(self.statement_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(operation, self.statement_timeout)),
        }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn timeout_error(operation: &str, limit: Duration) -> DbError {
    DbError::timeout(operation, limit.as_secs())
}

/// Work that can run on a connection inside a transaction.
trait TxWork: Sized + Send {
    fn mysql<'c>(
        conn: &'c mut sqlx::MySqlConnection,
        stmt: &'c Statement,
    ) -> BoxFuture<'c, Result<Self, sqlx::Error>>;

    fn postgres<'c>(
        conn: &'c mut sqlx::PgConnection,
        stmt: &'c Statement,
    ) -> BoxFuture<'c, Result<Self, sqlx::Error>>;

    fn sqlite<'c>(
        conn: &'c mut sqlx::SqliteConnection,
        stmt: &'c Statement,
    ) -> BoxFuture<'c, Result<Self, sqlx::Error>>;

    fn mssql<'c>(client: &'c mut MssqlClient, stmt: &'c Statement) -> BoxFuture<'c, DbResult<Self>>;
}

impl TxWork for ExecOutcome {
    fn mysql<'c>(
        conn: &'c mut sqlx::MySqlConnection,
        stmt: &'c Statement,
    ) -> BoxFuture<'c, Result<Self, sqlx::Error>> {
        Box::pin(mysql::execute(conn, stmt))
    }

    fn postgres<'c>(
        conn: &'c mut sqlx::PgConnection,
        stmt: &'c Statement,
    ) -> BoxFuture<'c, Result<Self, sqlx::Error>> {
        Box::pin(postgres::execute(conn, stmt))
    }

    fn sqlite<'c>(
        conn: &'c mut sqlx::SqliteConnection,
        stmt: &'c Statement,
    ) -> BoxFuture<'c, Result<Self, sqlx::Error>> {
        Box::pin(sqlite::execute(conn, stmt))
    }

    fn mssql<'c>(client: &'c mut MssqlClient, stmt: &'c Statement) -> BoxFuture<'c, DbResult<Self>> {
        Box::pin(tds::execute(client, stmt))
    }
}

impl TxWork for ResultSet {
    fn mysql<'c>(
        conn: &'c mut sqlx::MySqlConnection,
        stmt: &'c Statement,
    ) -> BoxFuture<'c, Result<Self, sqlx::Error>> {
        Box::pin(async move { Ok(rows_to_result_set(&mysql::fetch(conn, stmt).await?)) })
    }

    fn postgres<'c>(
        conn: &'c mut sqlx::PgConnection,
        stmt: &'c Statement,
    ) -> BoxFuture<'c, Result<Self, sqlx::Error>> {
        Box::pin(async move { Ok(rows_to_result_set(&postgres::fetch(conn, stmt).await?)) })
    }

    fn sqlite<'c>(
        conn: &'c mut sqlx::SqliteConnection,
        stmt: &'c Statement,
    ) -> BoxFuture<'c, Result<Self, sqlx::Error>> {
        Box::pin(async move { Ok(rows_to_result_set(&sqlite::fetch(conn, stmt).await?)) })
    }

    fn mssql<'c>(client: &'c mut MssqlClient, stmt: &'c Statement) -> BoxFuture<'c, DbResult<Self>> {
        Box::pin(tds::fetch(client, stmt))
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use sqlx::mysql::{MySqlArguments, MySqlQueryResult, MySqlRow};
    use sqlx::{Executor, MySql};

    pub async fn fetch<'c, E>(executor: E, stmt: &Statement) -> Result<Vec<MySqlRow>, sqlx::Error>
    where
        E: Executor<'c, Database = MySql>,
    {
        // Without params, run raw SQL to avoid prepared statement restrictions
        if stmt.params.is_empty() {
            return executor.fetch_all(stmt.sql.as_str()).await;
        }
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = bind_param(query, param);
        }
        query.fetch_all(executor).await
    }

    pub async fn execute<'c, E>(executor: E, stmt: &Statement) -> Result<ExecOutcome, sqlx::Error>
    where
        E: Executor<'c, Database = MySql>,
    {
        let result = if stmt.params.is_empty() {
            executor.execute(stmt.sql.as_str()).await?
        } else {
            let mut query = sqlx::query(&stmt.sql);
            for param in &stmt.params {
                query = bind_param(query, param);
            }
            query.execute(executor).await?
        };
        Ok(outcome(&result))
    }

    fn outcome(result: &MySqlQueryResult) -> ExecOutcome {
        ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(result.last_insert_id())
                .ok()
                .filter(|id| *id > 0),
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, MySql, MySqlArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) | QueryParam::Decimal(v) => query.bind(v.as_str()),
            QueryParam::Date(v) => query.bind(*v),
            QueryParam::DateTime(v) => query.bind(*v),
            QueryParam::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::postgres::{PgArguments, PgRow};
    use sqlx::{Executor, Postgres};

    pub async fn fetch<'c, E>(executor: E, stmt: &Statement) -> Result<Vec<PgRow>, sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        if stmt.params.is_empty() {
            return executor.fetch_all(stmt.sql.as_str()).await;
        }
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = bind_param(query, param);
        }
        query.fetch_all(executor).await
    }

    pub async fn execute<'c, E>(executor: E, stmt: &Statement) -> Result<ExecOutcome, sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let result = if stmt.params.is_empty() {
            executor.execute(stmt.sql.as_str()).await?
        } else {
            let mut query = sqlx::query(&stmt.sql);
            for param in &stmt.params {
                query = bind_param(query, param);
            }
            query.execute(executor).await?
        };
        // PostgreSQL reports generated keys only through RETURNING
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, Postgres, PgArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, Postgres, PgArguments> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            // Decimal placeholders are wrapped in CAST(... AS NUMERIC)
            QueryParam::String(v) | QueryParam::Decimal(v) => query.bind(v.as_str()),
            QueryParam::Date(v) => query.bind(*v),
            QueryParam::DateTime(v) => query.bind(*v),
            QueryParam::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}

mod sqlite {
    use super::*;
    use crate::dialect::{DATE_FORMAT, DATETIME_FORMAT};
    use sqlx::sqlite::{SqliteArguments, SqliteRow};
    use sqlx::{Executor, Sqlite};

    pub async fn fetch<'c, E>(executor: E, stmt: &Statement) -> Result<Vec<SqliteRow>, sqlx::Error>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        if stmt.params.is_empty() {
            return executor.fetch_all(stmt.sql.as_str()).await;
        }
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = bind_param(query, param);
        }
        query.fetch_all(executor).await
    }

    pub async fn execute<'c, E>(executor: E, stmt: &Statement) -> Result<ExecOutcome, sqlx::Error>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let result = if stmt.params.is_empty() {
            executor.execute(stmt.sql.as_str()).await?
        } else {
            let mut query = sqlx::query(&stmt.sql);
            for param in &stmt.params {
                query = bind_param(query, param);
            }
            query.execute(executor).await?
        };
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()).filter(|id| *id > 0),
        })
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) | QueryParam::Decimal(v) => query.bind(v.as_str()),
            // SQLite has no temporal storage class; keep the canonical text form
            QueryParam::Date(v) => query.bind(v.format(DATE_FORMAT).to_string()),
            QueryParam::DateTime(v) => query.bind(v.format(DATETIME_FORMAT).to_string()),
            QueryParam::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}

mod mssql {
    use super::*;

    /// Keep the connection for reuse unless the failure left it unusable.
    pub fn settle<T>(conn: &mut MssqlConnection, result: &DbResult<T>) {
        match result {
            Err(e) if e.is_connection_error() => {}
            _ => conn.finished(),
        }
    }

    pub async fn fetch(pool: &MssqlPool, stmt: &Statement) -> DbResult<ResultSet> {
        let mut conn = pool.acquire().await?;
        let result = tds::fetch(conn.client()?, stmt).await;
        settle(&mut conn, &result);
        result
    }

    pub async fn execute(pool: &MssqlPool, stmt: &Statement) -> DbResult<ExecOutcome> {
        let mut conn = pool.acquire().await?;
        let result = tds::execute(conn.client()?, stmt).await;
        settle(&mut conn, &result);
        result
    }

    pub async fn simple(conn: &mut MssqlConnection, sql: &str) -> DbResult<()> {
        let result = tds::simple(conn.client()?, sql).await;
        settle(conn, &result);
        result
    }
}
