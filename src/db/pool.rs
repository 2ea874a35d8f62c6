//! Connection registry and pool management.
//!
//! Named connection configurations are registered up front; the pool behind
//! a name is created lazily on first use and cached until the connection is
//! closed or removed. MySQL, PostgreSQL and SQLite use database-specific sqlx
//! pools to keep full type support; SQL Server uses the tiberius pool in
//! [`crate::db::mssql`].

use crate::db::mssql::MssqlPool;
use crate::dialect::dialect_for;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType};
use serde::Serialize;
use sqlx::{
    Executor, MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions,
    mysql::MySqlPoolOptions, postgres::PgConnectOptions, postgres::PgPoolOptions,
    sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Idle sqlx connections are closed after this long without use.
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Registered connection as reported by `list_database_connections` (no secrets).
#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct ConnectionSummary {
    /// Connection name used by every other tool
    pub name: String,
    /// Database engine
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Database name, Oracle service name, or SQLite file path
    pub database: String,
    pub enabled: bool,
    /// Whether a live pool currently exists
    pub open: bool,
    pub pool_size: u32,
    pub max_overflow: u32,
}

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
    SqlServer(MssqlPool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
            DbPool::SqlServer(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
            DbPool::SqlServer(_) => DatabaseType::SqlServer,
        }
    }

    /// How long an operation waits for a free connection.
    pub fn acquire_timeout(&self) -> Duration {
        match self {
            DbPool::MySql(pool) => pool.options().get_acquire_timeout(),
            DbPool::Postgres(pool) => pool.options().get_acquire_timeout(),
            DbPool::SQLite(pool) => pool.options().get_acquire_timeout(),
            DbPool::SqlServer(pool) => pool.acquire_timeout(),
        }
    }

    /// Convert a driver error, reporting exhaustion with this pool's timeout.
    pub fn driver_error(&self, err: sqlx::Error) -> DbError {
        match err {
            sqlx::Error::PoolTimedOut => {
                DbError::timeout("connection pool acquire", self.acquire_timeout().as_secs())
            }
            other => DbError::from(other),
        }
    }

    /// Run a statement on one pooled connection, discarding any result.
    pub async fn ping(&self, sql: &str) -> DbResult<()> {
        match self {
            DbPool::MySql(pool) => {
                pool.execute(sql).await.map_err(|e| self.driver_error(e))?;
            }
            DbPool::Postgres(pool) => {
                pool.execute(sql).await.map_err(|e| self.driver_error(e))?;
            }
            DbPool::SQLite(pool) => {
                pool.execute(sql).await.map_err(|e| self.driver_error(e))?;
            }
            DbPool::SqlServer(pool) => {
                let mut conn = pool.acquire().await?;
                crate::db::mssql::simple(conn.client()?, sql).await?;
                conn.finished();
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Entry {
    config: ConnectionConfig,
    pool: Option<DbPool>,
}

/// Registry of named connections and their lazily created pools.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validate and store a connection configuration without connecting.
    pub async fn register(&self, config: ConnectionConfig) -> DbResult<()> {
        config.validate()?;
        let mut entries = self.entries.write().await;
        if entries.contains_key(&config.name) {
            return Err(DbError::configuration(format!(
                "connection '{}' already exists",
                config.name
            )));
        }
        info!(
            connection_name = %config.name,
            db_type = %config.db_type,
            "Registered connection"
        );
        entries.insert(config.name.clone(), Entry { config, pool: None });
        Ok(())
    }

    /// Return the live pool for `name`, creating it on first use.
    pub async fn open(&self, name: &str) -> DbResult<DbPool> {
        let config = {
            let entries = self.entries.read().await;
            let entry = entries
                .get(name)
                .ok_or_else(|| DbError::connection_not_found(name))?;
            if let Some(pool) = &entry.pool {
                return Ok(pool.clone());
            }
            entry.config.clone()
        };

        info!(
            connection_name = %name,
            db_type = %config.db_type,
            endpoint = %config.endpoint(),
            "Opening connection pool"
        );
        let pool = create_pool(&config).await?;

        // Re-check after async work: another caller may have opened or removed it
        enum Outcome {
            Inserted(DbPool),
            Existing(DbPool, DbPool),
            Gone(DbPool),
        }
        let outcome = {
            let mut entries = self.entries.write().await;
            match entries.get_mut(name) {
                None => Outcome::Gone(pool),
                Some(entry) => match &entry.pool {
                    Some(existing) => Outcome::Existing(existing.clone(), pool),
                    None => {
                        entry.pool = Some(pool.clone());
                        Outcome::Inserted(pool)
                    }
                },
            }
        }; // Lock released here

        match outcome {
            Outcome::Inserted(pool) => {
                info!(connection_name = %name, "Connection pool ready");
                Ok(pool)
            }
            Outcome::Existing(existing, ours) => {
                debug!(connection_name = %name, "Concurrent open detected, keeping first pool");
                ours.close().await;
                Ok(existing)
            }
            Outcome::Gone(ours) => {
                ours.close().await;
                Err(DbError::connection_not_found(name))
            }
        }
    }

    /// Dispose the pool for `name`; the configuration stays registered.
    pub async fn close(&self, name: &str) -> DbResult<()> {
        let pool = {
            let mut entries = self.entries.write().await;
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| DbError::connection_not_found(name))?;
            entry.pool.take()
        };
        if let Some(pool) = pool {
            pool.close().await;
            info!(connection_name = %name, "Closed connection pool");
        }
        Ok(())
    }

    /// Close and unregister `name`.
    pub async fn remove(&self, name: &str) -> DbResult<()> {
        let entry = {
            let mut entries = self.entries.write().await;
            entries
                .remove(name)
                .ok_or_else(|| DbError::connection_not_found(name))?
        };
        if let Some(pool) = entry.pool {
            pool.close().await;
        }
        info!(connection_name = %name, "Removed connection");
        Ok(())
    }

    /// Open the pool and run the engine's test query.
    pub async fn check(&self, name: &str) -> DbResult<()> {
        let pool = self.open(name).await?;
        pool.ping(dialect_for(pool.db_type()).test_query()).await
    }

    /// Like [`check`](Self::check), but any failure yields `false`.
    pub async fn test(&self, name: &str) -> bool {
        match self.check(name).await {
            Ok(()) => true,
            Err(e) => {
                warn!(connection_name = %name, error = %e, "Connection test failed");
                false
            }
        }
    }

    /// Names of connections with a live pool.
    pub async fn list(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut names: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.pool.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// All registered connections, sorted by name.
    pub async fn list_detail(&self) -> Vec<ConnectionSummary> {
        let entries = self.entries.read().await;
        let mut summaries: Vec<ConnectionSummary> = entries
            .values()
            .map(|entry| ConnectionSummary {
                name: entry.config.name.clone(),
                db_type: entry.config.db_type,
                host: entry.config.host.clone(),
                port: entry.config.port,
                database: entry.config.database.clone(),
                enabled: entry.config.enabled,
                open: entry.pool.is_some(),
                pool_size: entry.config.pool.pool_size_or_default(),
                max_overflow: entry.config.pool.max_overflow_or_default(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Get the configuration for a connection.
    pub async fn get_config(&self, name: &str) -> DbResult<ConnectionConfig> {
        let entries = self.entries.read().await;
        entries
            .get(name)
            .map(|e| e.config.clone())
            .ok_or_else(|| DbError::connection_not_found(name))
    }

    /// Check if a connection is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Register, open and test every enabled configuration.
    ///
    /// Existing entries with the same name are replaced; disabled entries
    /// are skipped.
    pub async fn initialize(&self, configs: Vec<ConnectionConfig>) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for config in configs {
            if !config.enabled {
                debug!(connection_name = %config.name, "Skipping disabled connection");
                continue;
            }
            let name = config.name.clone();
            if self.contains(&name).await {
                if let Err(e) = self.remove(&name).await {
                    warn!(connection_name = %name, error = %e, "Failed to replace connection");
                }
            }
            let ok = match self.register(config).await {
                Ok(()) => self.test(&name).await,
                Err(e) => {
                    warn!(connection_name = %name, error = %e, "Invalid connection configuration");
                    false
                }
            };
            info!(connection_name = %name, connected = ok, "Initialized connection");
            results.insert(name, ok);
        }
        results
    }

    /// Close all connections and clear the registry.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Entry)> = {
            let mut entries = self.entries.write().await;
            entries.drain().collect()
        };
        for (name, entry) in drained {
            if let Some(pool) = entry.pool {
                info!(connection_name = %name, "Closing connection");
                pool.close().await;
            }
        }
        info!("All connections closed");
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a connection pool for the given configuration.
async fn create_pool(config: &ConnectionConfig) -> DbResult<DbPool> {
    let db_type = config.db_type;
    let secret = config.password.as_deref();
    let max_connections = config.pool.max_connections();
    let acquire_timeout = Duration::from_secs(config.pool.pool_timeout_or_default());
    let max_lifetime = Some(Duration::from_secs(config.pool.pool_recycle_or_default()));
    let connect_failed = |e: sqlx::Error| {
        DbError::connection(
            format!(
                "Failed to connect to {} at {}: {}",
                db_type.display_name(),
                config.endpoint(),
                e
            ),
            connection_suggestion(db_type, &e.to_string()),
        )
        .redact(secret)
    };

    match db_type {
        DatabaseType::MySQL => {
            let url = dialect_for(db_type).connection_string(config)?;
            let options = MySqlConnectOptions::from_str(&url)
                .map_err(|e| {
                    DbError::configuration(format!(
                        "connection '{}': invalid MySQL connection settings: {}",
                        config.name, e
                    ))
                    .redact(secret)
                })?
                .charset("utf8mb4");

            let pool = MySqlPoolOptions::new()
                .min_connections(0)
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(Some(IDLE_TIMEOUT))
                .max_lifetime(max_lifetime)
                .connect_with(options)
                .await
                .map_err(connect_failed)?;
            Ok(DbPool::MySql(pool))
        }
        DatabaseType::PostgreSQL => {
            let url = dialect_for(db_type).connection_string(config)?;
            let options = PgConnectOptions::from_str(&url).map_err(|e| {
                DbError::configuration(format!(
                    "connection '{}': invalid PostgreSQL connection settings: {}",
                    config.name, e
                ))
                .redact(secret)
            })?;

            let pool = PgPoolOptions::new()
                .min_connections(0)
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(Some(IDLE_TIMEOUT))
                .max_lifetime(max_lifetime)
                .connect_with(options)
                .await
                .map_err(connect_failed)?;
            Ok(DbPool::Postgres(pool))
        }
        DatabaseType::SQLite => {
            let url = dialect_for(db_type).connection_string(config)?;
            let options = SqliteConnectOptions::from_str(&url)
                .map_err(|e| {
                    DbError::configuration(format!(
                        "connection '{}': invalid SQLite path: {}",
                        config.name, e
                    ))
                })?
                .create_if_missing(true);

            let pool = SqlitePoolOptions::new()
                .min_connections(0)
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(Some(IDLE_TIMEOUT))
                .max_lifetime(max_lifetime)
                .connect_with(options)
                .await
                .map_err(connect_failed)?;
            Ok(DbPool::SQLite(pool))
        }
        DatabaseType::SqlServer => {
            let pool = MssqlPool::connect(config).await.map_err(|e| {
                let err = match e {
                    DbError::Connection { message, suggestion } => DbError::connection(
                        format!(
                            "Failed to connect to {} at {}: {}",
                            db_type.display_name(),
                            config.endpoint(),
                            message
                        ),
                        suggestion,
                    ),
                    other => other,
                };
                err.redact(secret)
            })?;
            Ok(DbPool::SqlServer(pool))
        }
        DatabaseType::Oracle => Err(DbError::connection(
            format!(
                "Failed to connect to {} at {}: Oracle driver unavailable",
                db_type.display_name(),
                config.endpoint()
            ),
            "Oracle connections are not supported by this server; SQL generation is available only",
        )),
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &str) -> String {
    let error_str = error.to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type.display_name()
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the username and password of the connection".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration of the server".to_string();
    }

    match db_type {
        DatabaseType::SQLite => {
            "Verify the file path is writable and its directory exists".to_string()
        }
        _ => format!(
            "Verify host, port and database of the {} connection",
            db_type.display_name()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sqlite_config(dir: &TempDir, name: &str) -> ConnectionConfig {
        let path = dir.path().join(format!("{}.db", name));
        ConnectionConfig::sqlite(name, path.to_string_lossy().to_string())
    }

    #[tokio::test]
    async fn test_connection_not_found() {
        let manager = ConnectionManager::new();
        let result = manager.open("nonexistent").await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
        assert!(!manager.test("nonexistent").await);
    }

    #[tokio::test]
    async fn test_list_connections_empty() {
        let manager = ConnectionManager::new();
        assert!(manager.list().await.is_empty());
        assert!(manager.list_detail().await.is_empty());
    }

    #[tokio::test]
    async fn test_register_duplicate_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = ConnectionManager::new();
        manager.register(sqlite_config(&dir, "a")).await.unwrap();
        let err = manager.register(sqlite_config(&dir, "a")).await.unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_open_is_lazy_and_cached() {
        let dir = TempDir::new().unwrap();
        let manager = ConnectionManager::new();
        manager.register(sqlite_config(&dir, "lazy")).await.unwrap();
        assert!(manager.list().await.is_empty());

        manager.open("lazy").await.unwrap();
        manager.open("lazy").await.unwrap();
        assert_eq!(manager.list().await, vec!["lazy".to_string()]);
        assert!(manager.test("lazy").await);

        manager.close("lazy").await.unwrap();
        assert!(manager.list().await.is_empty());
        assert!(manager.contains("lazy").await);

        manager.remove("lazy").await.unwrap();
        assert!(!manager.contains("lazy").await);
    }

    #[tokio::test]
    async fn test_concurrent_open_yields_one_pool() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(ConnectionManager::new());
        manager.register(sqlite_config(&dir, "race")).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&manager);
                tokio::spawn(async move { m.open("race").await.is_ok() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(manager.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_oracle_open_reports_driver_unavailable() {
        let manager = ConnectionManager::new();
        let config = ConnectionConfig::networked(
            "ora",
            DatabaseType::Oracle,
            "db.internal",
            1521,
            "scott",
            "tiger",
            "ORCLPDB1",
        );
        manager.register(config).await.unwrap();
        let err = manager.open("ora").await.unwrap_err();
        let text = err.to_string();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(text.contains("Oracle"));
        assert!(text.contains("db.internal"));
        assert!(!text.contains("tiger"));
    }

    #[tokio::test]
    async fn test_initialize_skips_disabled() {
        let dir = TempDir::new().unwrap();
        let manager = ConnectionManager::new();
        let mut enabled = sqlite_config(&dir, "on");
        enabled.enabled = true;
        let disabled = sqlite_config(&dir, "off");

        let results = manager.initialize(vec![enabled.clone(), disabled]).await;
        assert_eq!(results.get("on"), Some(&true));
        assert!(!results.contains_key("off"));

        // Re-initializing replaces the existing entry
        let results = manager.initialize(vec![enabled]).await;
        assert_eq!(results.get("on"), Some(&true));
        assert_eq!(manager.list_detail().await.len(), 1);
    }

    #[test]
    fn test_connection_suggestion() {
        assert!(connection_suggestion(DatabaseType::MySQL, "Connection refused").contains("MySQL"));
        assert!(connection_suggestion(DatabaseType::PostgreSQL, "password authentication failed")
            .contains("password"));
    }
}
