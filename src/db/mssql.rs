//! SQL Server connection pool and value conversion.
//!
//! sqlx has no SQL Server driver, so connections come from tiberius and
//! are pooled here: a semaphore caps open connections at
//! `pool_size + max_overflow`, and up to `pool_size` idle connections are
//! kept for reuse. Connections older than `pool_recycle` are discarded
//! instead of being reused.

use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, ExecOutcome, QueryParam, ResultSet, Statement};
use serde_json::{Map, Value as JsonValue};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, Query};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

pub type MssqlClient = Client<Compat<TcpStream>>;

struct IdleConnection {
    client: MssqlClient,
    created: Instant,
}

struct Shared {
    config: Config,
    target: String,
    idle: Mutex<VecDeque<IdleConnection>>,
    semaphore: Arc<Semaphore>,
    max_idle: usize,
    acquire_timeout: Duration,
    max_lifetime: Duration,
}

/// Pool of SQL Server connections.
#[derive(Clone)]
pub struct MssqlPool {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MssqlPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlPool")
            .field("target", &self.shared.target)
            .field("available", &self.shared.semaphore.available_permits())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl MssqlPool {
    /// Build the pool and open its first connection.
    pub async fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        let host = config.host.clone().unwrap_or_default();
        let port = config
            .port
            .or(config.db_type.default_port())
            .unwrap_or(1433);

        let mut tds = Config::new();
        tds.host(&host);
        tds.port(port);
        tds.authentication(AuthMethod::sql_server(
            config.username.as_deref().unwrap_or_default(),
            config.password.as_deref().unwrap_or_default(),
        ));
        if !config.database.is_empty() {
            tds.database(&config.database);
        }
        tds.trust_cert();

        let pool = config.pool.clone();
        let shared = Shared {
            config: tds,
            target: format!("{}:{}", host, port),
            idle: Mutex::new(VecDeque::new()),
            semaphore: Arc::new(Semaphore::new(pool.max_connections().max(1) as usize)),
            max_idle: pool.pool_size_or_default() as usize,
            acquire_timeout: Duration::from_secs(pool.pool_timeout_or_default()),
            max_lifetime: Duration::from_secs(pool.pool_recycle_or_default()),
        };
        let pool = Self {
            shared: Arc::new(shared),
        };

        let client = pool.open_client().await?;
        pool.push_idle(IdleConnection {
            client,
            created: Instant::now(),
        });
        Ok(pool)
    }

    async fn open_client(&self) -> DbResult<MssqlClient> {
        let tcp = TcpStream::connect(self.shared.config.get_addr())
            .await
            .map_err(|e| {
                DbError::connection(
                    format!("Failed to reach SQL Server at {}: {}", self.shared.target, e),
                    "Check that the SQL Server instance is running and accessible",
                )
            })?;
        tcp.set_nodelay(true).map_err(|e| {
            DbError::connection(
                format!("Failed to configure socket: {}", e),
                "Check network connectivity and database server status",
            )
        })?;
        let client = Client::connect(self.shared.config.clone(), tcp.compat_write()).await?;
        debug!(target_addr = %self.shared.target, "Opened SQL Server connection");
        Ok(client)
    }

    fn push_idle(&self, conn: IdleConnection) {
        if let Ok(mut idle) = self.shared.idle.lock() {
            if idle.len() < self.shared.max_idle {
                idle.push_back(conn);
            }
        }
    }

    fn pop_idle(&self) -> Option<IdleConnection> {
        let mut idle = self.shared.idle.lock().ok()?;
        while let Some(conn) = idle.pop_front() {
            if conn.created.elapsed() < self.shared.max_lifetime {
                return Some(conn);
            }
        }
        None
    }

    /// Borrow a connection, waiting at most `pool_timeout` for a free slot.
    pub async fn acquire(&self) -> DbResult<MssqlConnection> {
        let permit = tokio::time::timeout(
            self.shared.acquire_timeout,
            Arc::clone(&self.shared.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| {
            DbError::timeout(
                "connection pool acquire",
                self.shared.acquire_timeout.as_secs(),
            )
        })?
        .map_err(|_| {
            DbError::connection(
                "Connection pool is closed",
                "Re-add the connection or reload configurations",
            )
        })?;

        let conn = match self.pop_idle() {
            Some(conn) => conn,
            None => IdleConnection {
                client: self.open_client().await?,
                created: Instant::now(),
            },
        };
        Ok(MssqlConnection {
            conn: Some(conn),
            pool: self.clone(),
            in_flight: false,
            _permit: permit,
        })
    }

    /// Time allowed for acquiring a connection.
    pub fn acquire_timeout(&self) -> Duration {
        self.shared.acquire_timeout
    }

    pub fn is_closed(&self) -> bool {
        self.shared.semaphore.is_closed()
    }

    /// Refuse new acquisitions and drop idle connections.
    pub async fn close(&self) {
        self.shared.semaphore.close();
        if let Ok(mut idle) = self.shared.idle.lock() {
            idle.clear();
        }
    }
}

/// A borrowed connection that returns to the pool on drop.
///
/// Handing out the client marks a statement as in flight; a connection
/// dropped before [`MssqlConnection::finished`] is called (for example
/// when a timeout cancels the statement) is closed rather than reused.
pub struct MssqlConnection {
    conn: Option<IdleConnection>,
    pool: MssqlPool,
    in_flight: bool,
    _permit: OwnedSemaphorePermit,
}

impl MssqlConnection {
    pub fn client(&mut self) -> DbResult<&mut MssqlClient> {
        self.in_flight = true;
        self.conn
            .as_mut()
            .map(|c| &mut c.client)
            .ok_or_else(|| DbError::internal("SQL Server connection already released"))
    }

    /// Whether a statement was started and never completed.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Mark the current statement as complete so the connection can be reused.
    pub fn finished(&mut self) {
        self.in_flight = false;
    }
}

impl Drop for MssqlConnection {
    fn drop(&mut self) {
        if self.in_flight {
            return;
        }
        if let Some(conn) = self.conn.take() {
            if !self.pool.is_closed() && conn.created.elapsed() < self.pool.shared.max_lifetime {
                self.pool.push_idle(conn);
            }
        }
    }
}

// =============================================================================
// Statement execution
// =============================================================================

fn bind_params<'a>(sql: &'a str, params: &[QueryParam]) -> Query<'a> {
    let mut query = Query::new(sql);
    for param in params {
        match param {
            QueryParam::Null => query.bind(Option::<String>::None),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) | QueryParam::Decimal(v) => query.bind(v.clone()),
            QueryParam::Date(v) => query.bind(*v),
            QueryParam::DateTime(v) => query.bind(*v),
            QueryParam::Bytes(v) => query.bind(v.clone()),
        }
    }
    query
}

/// Run a row-returning statement.
pub async fn fetch(client: &mut MssqlClient, stmt: &Statement) -> DbResult<ResultSet> {
    let mut stream = bind_params(&stmt.sql, &stmt.params).query(client).await?;
    let columns: Vec<String> = stream
        .columns()
        .await?
        .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows = stream.into_first_result().await?;

    let rows = rows
        .into_iter()
        .map(|row| {
            columns
                .iter()
                .cloned()
                .zip(row.into_iter().map(|data| column_to_json(&data)))
                .collect::<Map<String, JsonValue>>()
        })
        .collect();
    Ok(ResultSet::new(columns, rows))
}

/// Run a write statement and report affected rows.
pub async fn execute(client: &mut MssqlClient, stmt: &Statement) -> DbResult<ExecOutcome> {
    let result = bind_params(&stmt.sql, &stmt.params).execute(client).await?;
    Ok(ExecOutcome {
        rows_affected: result.total(),
        last_insert_id: None,
    })
}

/// Run a statement without bind values, discarding any results.
pub async fn simple(client: &mut MssqlClient, sql: &str) -> DbResult<()> {
    client.simple_query(sql).await?.into_results().await?;
    Ok(())
}

fn temporal<'a, T: FromSql<'a>>(data: &'a ColumnData<'static>, format: impl Fn(T) -> String) -> JsonValue {
    match T::from_sql(data) {
        Ok(Some(v)) => JsonValue::String(format(v)),
        _ => JsonValue::Null,
    }
}

/// Convert one TDS value to JSON.
fn column_to_json(data: &ColumnData<'static>) -> JsonValue {
    use crate::dialect::{DATE_FORMAT, DATETIME_FORMAT};
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

    match data {
        ColumnData::U8(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
        ColumnData::I16(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
        ColumnData::I32(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
        ColumnData::I64(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
        ColumnData::F32(v) => v
            .and_then(|f| serde_json::Number::from_f64(f as f64))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ColumnData::F64(v) => v
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ColumnData::Bit(v) => v.map(JsonValue::Bool).unwrap_or(JsonValue::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| JsonValue::String(s.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Guid(v) => v
            .map(|g| JsonValue::String(g.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| super::types::decode_binary_value(b))
            .unwrap_or(JsonValue::Null),
        ColumnData::Numeric(v) => v
            .map(|n| JsonValue::String(n.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal(data, |v: NaiveDateTime| v.format(DATETIME_FORMAT).to_string())
        }
        ColumnData::Date(_) => temporal(data, |v: NaiveDate| v.format(DATE_FORMAT).to_string()),
        ColumnData::Time(_) => temporal(data, |v: NaiveTime| v.format("%H:%M:%S").to_string()),
        ColumnData::DateTimeOffset(_) => temporal(data, |v: DateTime<FixedOffset>| {
            v.naive_utc().format(DATETIME_FORMAT).to_string()
        }),
        other => JsonValue::String(format!("{:?}", other)),
    }
}
