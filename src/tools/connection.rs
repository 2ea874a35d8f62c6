//! Connection lifecycle and configuration tools.
//!
//! Runtime connections live in the [`ConnectionManager`]; the
//! configuration file is only touched when a caller asks for it
//! (`save_to_config`, `remove_from_config`, enable/disable, reload).

use crate::config::{ConfigManager, PoolOptions};
use crate::db::{ConnectionManager, ConnectionSummary};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Input for the add_database_connection tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddConnectionInput {
    /// Unique connection name used by every other tool
    pub name: String,
    /// Database engine: mysql, oracle, postgresql, sqlite or sqlserver
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    /// Server host. Not used for SQLite
    #[serde(default)]
    pub host: Option<String>,
    /// Server port. Defaults to the engine's standard port
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Database name, Oracle service name, or SQLite file path
    pub database: String,
    /// Connections kept open while idle
    #[serde(default)]
    pub pool_size: Option<u32>,
    /// Extra connections allowed above pool_size
    #[serde(default)]
    pub max_overflow: Option<u32>,
    /// Seconds to wait for a free connection
    #[serde(default)]
    pub pool_timeout: Option<u64>,
    /// Seconds after which a connection is replaced
    #[serde(default)]
    pub pool_recycle: Option<u64>,
    /// Also persist the connection to the configuration file. Default: false
    #[serde(default)]
    pub save_to_config: bool,
}

impl AddConnectionInput {
    fn into_config(self) -> ConnectionConfig {
        let port = self.port.or_else(|| self.db_type.default_port());
        ConnectionConfig {
            name: self.name,
            db_type: self.db_type,
            host: self.host,
            port,
            username: self.username,
            password: self.password,
            database: self.database,
            enabled: true,
            pool: PoolOptions {
                pool_size: self.pool_size,
                max_overflow: self.max_overflow,
                pool_timeout: self.pool_timeout,
                pool_recycle: self.pool_recycle,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AddConnectionOutput {
    /// Whether the test query succeeded
    pub connected: bool,
    pub message: String,
    /// Whether the connection was written to the configuration file
    pub saved: bool,
}

/// Input for the remove_database_connection tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RemoveConnectionInput {
    /// Connection name from list_database_connections
    pub name: String,
    /// Also delete the entry from the configuration file. Default: false
    #[serde(default)]
    pub remove_from_config: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RemoveConnectionOutput {
    pub removed: bool,
    /// Whether an entry was deleted from the configuration file
    pub removed_from_config: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListConnectionsOutput {
    pub connections: Vec<ConnectionSummary>,
    pub count: usize,
}

/// Configured connection with its password masked.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ConfiguredConnection {
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Always "****" when a password is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub database: String,
    pub enabled: bool,
    #[serde(flatten)]
    pub pool: PoolOptions,
}

impl From<ConnectionConfig> for ConfiguredConnection {
    fn from(config: ConnectionConfig) -> Self {
        let config = config.masked();
        Self {
            name: config.name,
            db_type: config.db_type,
            host: config.host,
            port: config.port,
            username: config.username,
            password: config.password,
            database: config.database,
            enabled: config.enabled,
            pool: config.pool,
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListConfiguredOutput {
    /// Path of the configuration file
    pub path: String,
    pub connections: Vec<ConfiguredConnection>,
    pub count: usize,
}

/// Input for enable_configured_connection and disable_configured_connection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfiguredConnectionInput {
    /// Connection name from list_configured_connections
    pub name: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ToggleConnectionOutput {
    /// False when no configured connection has this name
    pub success: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ReloadOutput {
    /// Connection name to whether it connected
    pub results: BTreeMap<String, bool>,
}

pub struct ConnectionToolHandler {
    connections: Arc<ConnectionManager>,
    config: Arc<ConfigManager>,
}

impl ConnectionToolHandler {
    pub fn new(connections: Arc<ConnectionManager>, config: Arc<ConfigManager>) -> Self {
        Self {
            connections,
            config,
        }
    }

    /// Register, open and test a connection; optionally persist it.
    ///
    /// A connection that fails its test is unregistered again and reported
    /// with `connected: false`.
    pub async fn add_connection(&self, input: AddConnectionInput) -> DbResult<AddConnectionOutput> {
        let save = input.save_to_config;
        let config = input
            .into_config()
            .with_pool_defaults(&self.config.default_settings().await);
        config.validate()?;
        let name = config.name.clone();

        self.connections.register(config.clone()).await?;
        if let Err(e) = self.connections.check(&name).await {
            warn!(connection_name = %name, error = %e, "New connection failed its test");
            self.connections.remove(&name).await?;
            return Ok(AddConnectionOutput {
                connected: false,
                message: e.to_string(),
                saved: false,
            });
        }

        let saved = if save {
            match self.config.get(&name).await {
                Some(_) => self.config.update(&name, config).await?,
                None => self.config.add(config).await?,
            }
            true
        } else {
            false
        };
        info!(connection_name = %name, saved, "Connection added");
        Ok(AddConnectionOutput {
            connected: true,
            message: format!("Connected to '{}'", name),
            saved,
        })
    }

    pub async fn remove_connection(
        &self,
        input: RemoveConnectionInput,
    ) -> DbResult<RemoveConnectionOutput> {
        let registered = self.connections.contains(&input.name).await;
        if registered {
            self.connections.remove(&input.name).await?;
        }
        let removed_from_config = if input.remove_from_config {
            self.config.remove(&input.name).await?
        } else {
            false
        };
        if !registered && !removed_from_config {
            return Err(DbError::connection_not_found(&input.name));
        }
        Ok(RemoveConnectionOutput {
            removed: registered,
            removed_from_config,
        })
    }

    pub async fn list_connections(&self) -> ListConnectionsOutput {
        let connections = self.connections.list_detail().await;
        let count = connections.len();
        ListConnectionsOutput { connections, count }
    }

    pub async fn list_configured(&self) -> ListConfiguredOutput {
        let connections: Vec<ConfiguredConnection> = self
            .config
            .connections()
            .await
            .into_iter()
            .map(Into::into)
            .collect();
        ListConfiguredOutput {
            path: self.config.path().display().to_string(),
            count: connections.len(),
            connections,
        }
    }

    pub async fn enable(&self, input: ConfiguredConnectionInput) -> DbResult<ToggleConnectionOutput> {
        let success = self.config.enable(&input.name).await?;
        Ok(ToggleConnectionOutput {
            success,
            enabled: success,
        })
    }

    /// Disable a configured connection; repeating the call is harmless.
    pub async fn disable(&self, input: ConfiguredConnectionInput) -> DbResult<ToggleConnectionOutput> {
        let success = self.config.disable(&input.name).await?;
        Ok(ToggleConnectionOutput {
            success,
            enabled: false,
        })
    }

    /// Re-read the configuration file and reconnect every enabled entry.
    pub async fn reload(&self) -> DbResult<ReloadOutput> {
        self.config.reload().await?;
        let results = self
            .connections
            .initialize(self.config.enabled_connections().await)
            .await;
        info!(connections = results.len(), "Configurations reloaded");
        Ok(ReloadOutput { results })
    }
}
