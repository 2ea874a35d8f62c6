//! Connection-related data models.
//!
//! This module defines the supported engines and the configuration of a
//! named database connection.

use crate::config::PoolOptions;
use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// Includes MariaDB
    MySQL,
    Oracle,
    #[serde(alias = "postgres")]
    PostgreSQL,
    SQLite,
    #[serde(alias = "mssql")]
    SqlServer,
}

impl DatabaseType {
    pub const ALL: [DatabaseType; 5] = [
        Self::MySQL,
        Self::Oracle,
        Self::PostgreSQL,
        Self::SQLite,
        Self::SqlServer,
    ];

    /// Name used in configuration files and tool arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySQL => "mysql",
            Self::Oracle => "oracle",
            Self::PostgreSQL => "postgresql",
            Self::SQLite => "sqlite",
            Self::SqlServer => "sqlserver",
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySQL => "MySQL",
            Self::Oracle => "Oracle",
            Self::PostgreSQL => "PostgreSQL",
            Self::SQLite => "SQLite",
            Self::SqlServer => "SQL Server",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MySQL => Some(3306),
            Self::Oracle => Some(1521),
            Self::PostgreSQL => Some(5432),
            Self::SQLite => None,
            Self::SqlServer => Some(1433),
        }
    }

    /// File-based engines need only a path.
    pub fn is_file_based(&self) -> bool {
        matches!(self, Self::SQLite)
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for DatabaseType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "oracle" => Ok(Self::Oracle),
            "postgresql" | "postgres" => Ok(Self::PostgreSQL),
            "sqlite" => Ok(Self::SQLite),
            "sqlserver" | "mssql" => Ok(Self::SqlServer),
            other => Err(DbError::configuration(format!(
                "unsupported database type '{}'; expected one of mysql, oracle, postgresql, sqlite, sqlserver",
                other
            ))),
        }
    }
}

/// Configuration for one named database connection.
///
/// `database` holds the database name, the Oracle service name, or the
/// SQLite file path.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub pool: PoolOptions,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("database", &self.database)
            .field("enabled", &self.enabled)
            .field("pool", &self.pool)
            .finish()
    }
}

impl ConnectionConfig {
    /// Configuration for a SQLite file.
    pub fn sqlite(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type: DatabaseType::SQLite,
            host: None,
            port: None,
            username: None,
            password: None,
            database: path.into(),
            enabled: true,
            pool: PoolOptions::default(),
        }
    }

    /// Configuration for a networked engine.
    pub fn networked(
        name: impl Into<String>,
        db_type: DatabaseType,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            db_type,
            host: Some(host.into()),
            port: Some(port),
            username: Some(username.into()),
            password: Some(password.into()),
            database: database.into(),
            enabled: true,
            pool: PoolOptions::default(),
        }
    }

    /// Parse one entry of the configuration file.
    pub fn from_json(value: serde_json::Value) -> DbResult<Self> {
        let label = value
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("<unnamed>")
            .to_string();
        let config: Self = serde_json::from_value(value).map_err(|e| {
            DbError::configuration(format!("connection '{}': {}", label, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every stored connection must satisfy.
    pub fn validate(&self) -> DbResult<()> {
        let fail = |msg: &str| {
            Err(DbError::configuration(format!(
                "connection '{}': {}",
                self.name, msg
            )))
        };

        if self.name.trim().is_empty() {
            return Err(DbError::configuration("connection name cannot be empty"));
        }
        if self.database.trim().is_empty() {
            return fail(if self.db_type.is_file_based() {
                "missing required field 'database' (SQLite file path)"
            } else {
                "missing required field 'database'"
            });
        }
        if !self.db_type.is_file_based() {
            if self.host.as_deref().is_none_or(|h| h.trim().is_empty()) {
                return fail("missing required field 'host'");
            }
            match self.port {
                None => return fail("missing required field 'port'"),
                Some(0) => return fail("port must be between 1 and 65535"),
                Some(_) => {}
            }
            if self.username.as_deref().is_none_or(str::is_empty) {
                return fail("missing required field 'username'");
            }
            if self.password.is_none() {
                return fail("missing required field 'password'");
            }
        }
        if let Err(msg) = self.pool.validate() {
            return fail(&msg);
        }
        Ok(())
    }

    /// Apply file-level pool defaults to unset pool fields.
    pub fn with_pool_defaults(mut self, defaults: &PoolOptions) -> Self {
        self.pool = self.pool.merged_with(defaults);
        self
    }

    /// Copy of this configuration with the password masked.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if copy.password.is_some() {
            copy.password = Some("****".to_string());
        }
        copy
    }

    /// Host and port (or file path) for messages; never includes credentials.
    pub fn endpoint(&self) -> String {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.clone(),
            _ => self.database.clone(),
        }
    }
}
