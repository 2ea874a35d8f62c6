//! Persistent connection configuration.
//!
//! The configuration file is JSON:
//!
//! ```json
//! {
//!   "connections": [
//!     {"name": "t1", "type": "sqlite", "database": "./t.db", "enabled": true}
//!   ],
//!   "default_settings": {"pool_size": 10, "max_overflow": 20}
//! }
//! ```
//!
//! Every mutation is written back to disk immediately.

use super::PoolOptions;
use crate::error::{DbError, DbResult};
use crate::models::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory form of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigFile {
    pub connections: Vec<ConnectionConfig>,
    pub default_settings: PoolOptions,
}

#[derive(Deserialize)]
struct RawConfigFile {
    #[serde(default)]
    connections: Vec<serde_json::Value>,
    #[serde(default)]
    default_settings: Option<PoolOptions>,
}

impl ConfigFile {
    /// A fresh file: no connections, built-in pool defaults.
    pub fn empty() -> Self {
        Self {
            connections: Vec::new(),
            default_settings: PoolOptions::builtin(),
        }
    }

    /// Parse and validate configuration text.
    pub fn parse(text: &str) -> DbResult<Self> {
        let raw: RawConfigFile = serde_json::from_str(text)
            .map_err(|e| DbError::configuration(format!("malformed configuration file: {}", e)))?;

        let default_settings = raw.default_settings.unwrap_or_else(PoolOptions::builtin);
        default_settings
            .validate()
            .map_err(|msg| DbError::configuration(format!("default_settings: {}", msg)))?;

        let mut connections: Vec<ConnectionConfig> = Vec::with_capacity(raw.connections.len());
        for entry in raw.connections {
            let config = ConnectionConfig::from_json(entry)?;
            if connections.iter().any(|c| c.name == config.name) {
                return Err(DbError::configuration(format!(
                    "duplicate connection name '{}'",
                    config.name
                )));
            }
            connections.push(config);
        }

        Ok(Self {
            connections,
            default_settings,
        })
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.connections.iter().position(|c| c.name == name)
    }
}

/// Loads, queries and persists the connection configuration file.
#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    state: RwLock<ConfigFile>,
}

impl ConfigManager {
    /// Load the file at `path`, creating it with defaults when missing.
    pub async fn load(path: impl Into<PathBuf>) -> DbResult<Self> {
        let path = path.into();
        let file = read_or_create(&path).await?;
        info!(
            path = %path.display(),
            connections = file.connections.len(),
            "Configuration loaded"
        );
        Ok(Self {
            path,
            state: RwLock::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, replacing the in-memory state.
    pub async fn reload(&self) -> DbResult<()> {
        let file = read_or_create(&self.path).await?;
        *self.state.write().await = file;
        info!(path = %self.path.display(), "Configuration reloaded");
        Ok(())
    }

    /// All configured connections as stored (pool defaults not applied).
    pub async fn connections(&self) -> Vec<ConnectionConfig> {
        self.state.read().await.connections.clone()
    }

    /// Enabled connections with `default_settings` applied.
    pub async fn enabled_connections(&self) -> Vec<ConnectionConfig> {
        let state = self.state.read().await;
        state
            .connections
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.clone().with_pool_defaults(&state.default_settings))
            .collect()
    }

    /// One connection with `default_settings` applied.
    pub async fn get(&self, name: &str) -> Option<ConnectionConfig> {
        let state = self.state.read().await;
        state
            .find(name)
            .map(|i| state.connections[i].clone().with_pool_defaults(&state.default_settings))
    }

    pub async fn default_settings(&self) -> PoolOptions {
        self.state.read().await.default_settings.clone()
    }

    /// Add a new connection; the name must be unused.
    pub async fn add(&self, config: ConnectionConfig) -> DbResult<()> {
        config.validate()?;
        let mut state = self.state.write().await;
        if state.find(&config.name).is_some() {
            return Err(DbError::configuration(format!(
                "connection '{}' already exists in the configuration file",
                config.name
            )));
        }
        let mut next = state.clone();
        next.connections.push(config);
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    /// Replace the connection called `name`.
    pub async fn update(&self, name: &str, config: ConnectionConfig) -> DbResult<()> {
        config.validate()?;
        let mut state = self.state.write().await;
        let index = state
            .find(name)
            .ok_or_else(|| DbError::connection_not_found(name))?;
        if config.name != name && state.find(&config.name).is_some() {
            return Err(DbError::configuration(format!(
                "connection '{}' already exists in the configuration file",
                config.name
            )));
        }
        let mut next = state.clone();
        next.connections[index] = config;
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    /// Remove a connection; returns false when it was not configured.
    pub async fn remove(&self, name: &str) -> DbResult<bool> {
        let mut state = self.state.write().await;
        let Some(index) = state.find(name) else {
            return Ok(false);
        };
        let mut next = state.clone();
        next.connections.remove(index);
        self.persist(&next).await?;
        *state = next;
        Ok(true)
    }

    /// Mark a connection enabled; returns false for an unknown name.
    pub async fn enable(&self, name: &str) -> DbResult<bool> {
        self.set_enabled(name, true).await
    }

    /// Mark a connection disabled; returns false for an unknown name.
    pub async fn disable(&self, name: &str) -> DbResult<bool> {
        self.set_enabled(name, false).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> DbResult<bool> {
        let mut state = self.state.write().await;
        let Some(index) = state.find(name) else {
            return Ok(false);
        };
        if state.connections[index].enabled == enabled {
            return Ok(true);
        }
        let mut next = state.clone();
        next.connections[index].enabled = enabled;
        self.persist(&next).await?;
        *state = next;
        info!(connection_name = %name, enabled, "Connection configuration updated");
        Ok(true)
    }

    /// Write the current state to disk.
    pub async fn save(&self) -> DbResult<()> {
        let state = self.state.read().await;
        self.persist(&state).await
    }

    async fn persist(&self, file: &ConfigFile) -> DbResult<()> {
        write_file(&self.path, file).await
    }
}

async fn read_or_create(path: &Path) -> DbResult<ConfigFile> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => ConfigFile::parse(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let file = ConfigFile::empty();
            write_file(path, &file).await?;
            info!(path = %path.display(), "Created default configuration file");
            Ok(file)
        }
        Err(e) => Err(DbError::configuration(format!(
            "cannot read configuration file '{}': {}",
            path.display(),
            e
        ))),
    }
}

async fn write_file(path: &Path, file: &ConfigFile) -> DbResult<()> {
    let io_err = |e: std::io::Error| {
        DbError::configuration(format!(
            "cannot write configuration file '{}': {}",
            path.display(),
            e
        ))
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let text = serde_json::to_string_pretty(file)
        .map_err(|e| DbError::internal(format!("failed to serialize configuration: {}", e)))?;
    tokio::fs::write(path, text).await.map_err(io_err)?;
    debug!(path = %path.display(), "Configuration file written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_path(dir: &TempDir) -> PathBuf {
        dir.path().join("nested").join("database_config.json")
    }

    #[tokio::test]
    async fn test_missing_file_is_created() {
        let dir = TempDir::new().unwrap();
        let path = config_path(&dir);
        let manager = ConfigManager::load(&path).await.unwrap();
        assert!(path.exists());
        assert!(manager.connections().await.is_empty());
        assert_eq!(manager.default_settings().await, PoolOptions::builtin());
    }

    #[tokio::test]
    async fn test_malformed_file_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let err = ConfigManager::load(&path).await.err().unwrap();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_add_persists_and_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = config_path(&dir);
        let manager = ConfigManager::load(&path).await.unwrap();
        manager
            .add(ConnectionConfig::sqlite("t1", "./t.db"))
            .await
            .unwrap();
        assert!(manager.add(ConnectionConfig::sqlite("t1", "./u.db")).await.is_err());

        let reloaded = ConfigManager::load(&path).await.unwrap();
        let names: Vec<_> = reloaded.connections().await.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["t1"]);
    }

    #[tokio::test]
    async fn test_enable_disable_idempotent() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::load(config_path(&dir)).await.unwrap();
        manager.add(ConnectionConfig::sqlite("t1", "./t.db")).await.unwrap();

        assert!(manager.disable("t1").await.unwrap());
        assert!(manager.disable("t1").await.unwrap());
        assert!(!manager.get("t1").await.unwrap().enabled);
        assert!(manager.enabled_connections().await.is_empty());

        assert!(manager.enable("t1").await.unwrap());
        assert_eq!(manager.enabled_connections().await.len(), 1);
        assert!(!manager.enable("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_defaults_applied_to_enabled_connections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.json");
        tokio::fs::write(
            &path,
            r#"{"connections": [{"name": "t1", "type": "sqlite", "database": "./t.db",
                "enabled": true, "pool_size": 3}],
                "default_settings": {"pool_size": 5, "max_overflow": 1}}"#,
        )
        .await
        .unwrap();
        let manager = ConfigManager::load(&path).await.unwrap();
        let enabled = manager.enabled_connections().await;
        assert_eq!(enabled[0].pool.pool_size, Some(3));
        assert_eq!(enabled[0].pool.max_overflow, Some(1));
        // stored form keeps only explicit values
        assert_eq!(manager.connections().await[0].pool.max_overflow, None);
    }

    #[tokio::test]
    async fn test_remove_and_update() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::load(config_path(&dir)).await.unwrap();
        manager.add(ConnectionConfig::sqlite("t1", "./t.db")).await.unwrap();

        let mut updated = ConnectionConfig::sqlite("t1", "./other.db");
        updated.enabled = false;
        manager.update("t1", updated).await.unwrap();
        assert_eq!(manager.get("t1").await.unwrap().database, "./other.db");
        assert!(manager.update("nope", ConnectionConfig::sqlite("nope", "x")).await.is_err());

        assert!(manager.remove("t1").await.unwrap());
        assert!(!manager.remove("t1").await.unwrap());
    }

    #[test]
    fn test_parse_rejects_duplicate_names() {
        let text = r#"{"connections": [
            {"name": "a", "type": "sqlite", "database": "x"},
            {"name": "a", "type": "sqlite", "database": "y"}
        ]}"#;
        assert!(ConfigFile::parse(text).is_err());
    }

    #[test]
    fn test_parse_names_invalid_connection() {
        let text = r#"{"connections": [{"name": "pg", "type": "postgresql", "database": "d"}]}"#;
        let err = ConfigFile::parse(text).unwrap_err();
        assert!(err.to_string().contains("pg"));
        assert!(err.to_string().contains("host"));
    }
}
